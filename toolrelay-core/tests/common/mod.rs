#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Map, Value, json};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::broadcast;

use toolrelay_core::cache::{CapabilityCache, DestinationCache, ToolDefinition};
use toolrelay_core::decision::{
    Decision, DecisionError, DecisionExecutor, DecisionPrompt, DecisionSource,
};
use toolrelay_core::gateway::{
    ConnectionError, InvocationGateway, SubmitOutcome, ToolConnection, ToolNotification,
};
use toolrelay_core::limits::{LimitPolicy, RateLimiter};
use toolrelay_core::ChatBridge;

pub const RESULT_METHOD: &str = "notifications/tools/result";

/// How the fake broker answers the next submission.
#[derive(Debug, Clone)]
pub enum Script {
    Inline(Value),
    Pending(String),
    /// Publish the result before acknowledging with its id.
    PendingWithEarlyResult { correlation_id: String, payload: Value },
    Fail(ConnectionError),
    /// Never answer.
    Hang,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub target: String,
    pub tool: String,
    pub input: Map<String, Value>,
}

pub struct ScriptedConnection {
    live: AtomicBool,
    script: Mutex<VecDeque<Script>>,
    submissions: Mutex<Vec<Submission>>,
    tool_list: Mutex<Result<Value, ConnectionError>>,
    notifications: broadcast::Sender<ToolNotification>,
}

impl ScriptedConnection {
    pub fn new(script: impl IntoIterator<Item = Script>) -> Arc<Self> {
        let (notifications, _) = broadcast::channel(64);
        Arc::new(Self {
            live: AtomicBool::new(true),
            script: Mutex::new(script.into_iter().collect()),
            submissions: Mutex::new(Vec::new()),
            tool_list: Mutex::new(Ok(json!({"tools": []}))),
            notifications,
        })
    }

    pub fn set_live(&self, live: bool) {
        self.live.store(live, Ordering::SeqCst);
    }

    pub fn push(&self, step: Script) {
        self.script.lock().push_back(step);
    }

    pub fn set_tool_list(&self, list: Result<Value, ConnectionError>) {
        *self.tool_list.lock() = list;
    }

    pub fn submissions(&self) -> Vec<Submission> {
        self.submissions.lock().clone()
    }

    /// Publish a tool-result notification on the shared stream.
    pub fn emit_result(&self, correlation_id: &str, payload: Value) {
        self.emit(ToolNotification::new(RESULT_METHOD, correlation_id, payload));
    }

    pub fn emit(&self, notification: ToolNotification) {
        self.notifications
            .send(notification)
            .expect("gateway dispatcher is subscribed");
    }

    /// Yield until `count` submissions were made.
    pub async fn wait_for_submissions(&self, count: usize) {
        for _ in 0..1_000 {
            if self.submissions.lock().len() >= count {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("expected {count} submissions, saw {}", self.submissions.lock().len());
    }
}

#[async_trait]
impl ToolConnection for ScriptedConnection {
    fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    async fn submit(
        &self,
        target: &str,
        tool: &str,
        input: &Map<String, Value>,
    ) -> Result<SubmitOutcome, ConnectionError> {
        self.submissions.lock().push(Submission {
            target: target.to_string(),
            tool: tool.to_string(),
            input: input.clone(),
        });
        let step = self.script.lock().pop_front();

        match step {
            Some(Script::Inline(value)) => Ok(SubmitOutcome::Inline(value)),
            Some(Script::Pending(correlation_id)) => Ok(SubmitOutcome::Pending { correlation_id }),
            Some(Script::PendingWithEarlyResult {
                correlation_id,
                payload,
            }) => {
                self.emit_result(&correlation_id, payload);
                // Let the dispatcher see the result before the ack returns.
                for _ in 0..5 {
                    tokio::task::yield_now().await;
                }
                Ok(SubmitOutcome::Pending { correlation_id })
            }
            Some(Script::Fail(error)) => Err(error),
            Some(Script::Hang) => std::future::pending().await,
            None => Err(ConnectionError::Protocol("no scripted response".to_string())),
        }
    }

    async fn list_tools(&self, _target: &str) -> Result<Value, ConnectionError> {
        self.tool_list.lock().clone()
    }

    fn subscribe(&self) -> broadcast::Receiver<ToolNotification> {
        self.notifications.subscribe()
    }
}

/// Decision source answering from queues and recording what it was asked.
#[derive(Default)]
pub struct ScriptedDecisions {
    decisions: Mutex<VecDeque<Result<Decision, DecisionError>>>,
    summaries: Mutex<VecDeque<Result<String, DecisionError>>>,
    prompts: Mutex<Vec<DecisionPrompt>>,
    summary_requests: Mutex<Vec<(String, String)>>,
}

impl ScriptedDecisions {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_decision(&self, decision: Result<Decision, DecisionError>) {
        self.decisions.lock().push_back(decision);
    }

    pub fn push_summary(&self, summary: Result<String, DecisionError>) {
        self.summaries.lock().push_back(summary);
    }

    pub fn prompts(&self) -> Vec<DecisionPrompt> {
        self.prompts.lock().clone()
    }

    pub fn summary_requests(&self) -> Vec<(String, String)> {
        self.summary_requests.lock().clone()
    }
}

#[async_trait]
impl DecisionSource for ScriptedDecisions {
    async fn decide(&self, prompt: &DecisionPrompt) -> Result<Decision, DecisionError> {
        self.prompts.lock().push(prompt.clone());
        self.decisions
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(DecisionError::Backend("no scripted decision".to_string())))
    }

    async fn summarize(&self, request: &str, raw: &str) -> Result<String, DecisionError> {
        self.summary_requests
            .lock()
            .push((request.to_string(), raw.to_string()));
        self.summaries
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(DecisionError::Backend("no scripted summary".to_string())))
    }
}

pub fn gateway(timeout: Duration) -> Arc<InvocationGateway> {
    Arc::new(InvocationGateway::new("slack", RESULT_METHOD, timeout))
}

pub fn attached_gateway(
    connection: &Arc<ScriptedConnection>,
    timeout: Duration,
) -> Arc<InvocationGateway> {
    let gateway = gateway(timeout);
    gateway.attach(Arc::clone(connection) as Arc<dyn ToolConnection>);
    gateway
}

/// Text result in the MCP content shape.
pub fn text_result(text: &str) -> Value {
    json!({"content": [{"type": "text", "text": text}]})
}

/// A bridge wired to scripted collaborators.
pub struct Harness {
    pub connection: Arc<ScriptedConnection>,
    pub decisions: Arc<ScriptedDecisions>,
    pub limiter: Arc<RateLimiter>,
    pub gateway: Arc<InvocationGateway>,
    pub bridge: ChatBridge,
}

impl Harness {
    pub fn new(tools: &[&str], policy: LimitPolicy) -> Self {
        let connection = ScriptedConnection::new([]);
        let decisions = ScriptedDecisions::new();
        let limiter = Arc::new(RateLimiter::new(policy));
        let gateway = attached_gateway(&connection, Duration::from_secs(5));
        let capabilities = Arc::new(CapabilityCache::new(
            tools.iter().map(|name| ToolDefinition::new(*name)).collect(),
        ));
        let destinations = Arc::new(DestinationCache::new("ID,"));
        destinations.apply_payload("ID,Name\nC1,general\nC2,random");

        let executor = DecisionExecutor::new(
            Arc::clone(&capabilities),
            Arc::clone(&limiter),
            Arc::clone(&gateway),
            Arc::clone(&decisions) as Arc<dyn DecisionSource>,
        );
        let bridge = ChatBridge::new(
            Arc::clone(&limiter),
            capabilities,
            destinations,
            Arc::clone(&decisions) as Arc<dyn DecisionSource>,
            executor,
        );

        Self {
            connection,
            decisions,
            limiter,
            gateway,
            bridge,
        }
    }
}
