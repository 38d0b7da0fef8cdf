//! Asynchronous tool-invocation gateway.
//!
//! [`InvocationGateway::invoke`] hides whether the broker answered inline or
//! acknowledged first and delivered the result later as a notification.
//! Each call resolves exactly once: with the result, with a timeout, or with
//! the submission error.

pub mod connection;
pub mod http;
pub mod jsonrpc;
pub mod registry;

pub use connection::{ConnectionError, SubmitOutcome, ToolConnection, ToolNotification};
pub use http::{HttpBrokerConnection, HttpBrokerConnectionBuilder};
pub use registry::{DispatchOutcome, PendingRegistry};

use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tokio::time::{Instant, timeout_at};
use toolrelay_config::BrokerConfig;
use tracing::{debug, info, warn};

use crate::errors::ErrorCode;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    #[error("no live connection to the tool broker")]
    ConnectionUnavailable,
    #[error("tool call timed out after {}s", .0.as_secs())]
    Timeout(Duration),
    #[error("tool call failed: {0}")]
    Remote(#[from] ConnectionError),
}

impl GatewayError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::ConnectionUnavailable => ErrorCode::ConnectionUnavailable,
            Self::Timeout(_) => ErrorCode::Timeout,
            Self::Remote(_) => ErrorCode::RemoteError,
        }
    }
}

struct AttachedConnection {
    connection: Arc<dyn ToolConnection>,
    dispatcher: JoinHandle<()>,
}

impl Drop for AttachedConnection {
    fn drop(&mut self) {
        self.dispatcher.abort();
    }
}

pub struct InvocationGateway {
    target: String,
    timeout: Duration,
    registry: Arc<PendingRegistry>,
    connection: RwLock<Option<AttachedConnection>>,
}

impl InvocationGateway {
    pub fn new(
        target: impl Into<String>,
        result_method: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            target: target.into(),
            timeout,
            registry: Arc::new(PendingRegistry::new(result_method)),
            connection: RwLock::new(None),
        }
    }

    pub fn from_config(config: &BrokerConfig) -> Self {
        Self::new(
            config.target.clone(),
            config.result_method.clone(),
            config.invocation_timeout(),
        )
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Use `connection` for subsequent calls and start routing its
    /// notifications. Replaces any previously attached connection.
    ///
    /// Must be called from within a tokio runtime.
    pub fn attach(&self, connection: Arc<dyn ToolConnection>) {
        let notifications = connection.subscribe();
        let dispatcher = tokio::spawn(dispatch_notifications(
            Arc::clone(&self.registry),
            notifications,
        ));
        let previous = self.connection.write().replace(AttachedConnection {
            connection,
            dispatcher,
        });
        if previous.is_some() {
            info!(target_server = %self.target, "replaced broker connection");
        }
    }

    /// Stop using the current connection. Calls already waiting keep their
    /// deadlines.
    pub fn detach(&self) {
        if self.connection.write().take().is_some() {
            debug!(target_server = %self.target, "detached broker connection");
        }
    }

    pub fn is_connected(&self) -> bool {
        self.live_connection().is_some()
    }

    /// Calls registered and not yet resolved.
    pub fn outstanding(&self) -> usize {
        self.registry.outstanding()
    }

    fn live_connection(&self) -> Option<Arc<dyn ToolConnection>> {
        self.connection
            .read()
            .as_ref()
            .filter(|attached| attached.connection.is_live())
            .map(|attached| Arc::clone(&attached.connection))
    }

    /// Invoke `tool` with `input` and wait for its result.
    pub async fn invoke(&self, tool: &str, input: Map<String, Value>) -> Result<Value, GatewayError> {
        let connection = self
            .live_connection()
            .ok_or(GatewayError::ConnectionUnavailable)?;

        let (mut pending, receiver) = self.registry.register();
        let deadline = Instant::now() + self.timeout;
        debug!(tool, ticket = pending.ticket(), "submitting tool call");

        let outcome = match timeout_at(deadline, connection.submit(&self.target, tool, &input)).await
        {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(error)) => {
                warn!(tool, %error, "tool submission failed");
                return Err(GatewayError::Remote(error));
            }
            Err(_) => {
                warn!(tool, timeout_secs = self.timeout.as_secs(), "tool submission timed out");
                return Err(GatewayError::Timeout(self.timeout));
            }
        };

        let correlation_id = match outcome {
            SubmitOutcome::Inline(result) => {
                debug!(tool, "tool answered inline");
                return Ok(result);
            }
            SubmitOutcome::Pending { correlation_id } => correlation_id,
        };

        pending.bind(&correlation_id);
        debug!(tool, correlation_id = %correlation_id, "waiting for tool result");

        match timeout_at(deadline, receiver).await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(_)) => Err(GatewayError::Remote(ConnectionError::Closed)),
            Err(_) => {
                warn!(
                    tool,
                    correlation_id = %correlation_id,
                    timeout_secs = self.timeout.as_secs(),
                    "tool result did not arrive before the deadline"
                );
                Err(GatewayError::Timeout(self.timeout))
            }
        }
    }

    /// Ask the broker which tools the target offers.
    pub async fn list_tools(&self) -> Result<Value, GatewayError> {
        let connection = self
            .live_connection()
            .ok_or(GatewayError::ConnectionUnavailable)?;
        match tokio::time::timeout(self.timeout, connection.list_tools(&self.target)).await {
            Ok(result) => result.map_err(GatewayError::from),
            Err(_) => Err(GatewayError::Timeout(self.timeout)),
        }
    }
}

async fn dispatch_notifications(
    registry: Arc<PendingRegistry>,
    mut notifications: broadcast::Receiver<ToolNotification>,
) {
    loop {
        match notifications.recv().await {
            Ok(notification) => {
                registry.dispatch(notification);
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "notification stream lagged; some tool results were lost");
            }
            Err(RecvError::Closed) => {
                debug!("notification stream closed");
                break;
            }
        }
    }
}
