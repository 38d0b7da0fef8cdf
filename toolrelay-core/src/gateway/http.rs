//! Broker connection over HTTP.
//!
//! - JSON-RPC 2.0 requests are POSTed to `{endpoint}/rpc`
//! - notifications stream as Server-Sent Events from `{endpoint}/events`
//!
//! The connection counts as live only while the event stream is open. A
//! background task keeps reconnecting with exponential backoff until the
//! connection is dropped.

use async_trait::async_trait;
use futures_util::StreamExt as _;
use reqwest::{Client as HttpClient, StatusCode};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use toolrelay_config::BrokerConfig;
use tracing::{debug, info, trace, warn};

use super::connection::{ConnectionError, SubmitOutcome, ToolConnection, ToolNotification};
use super::jsonrpc::{
    JsonRpcRequest, JsonRpcResponse, METHOD_TOOLS_CALL, METHOD_TOOLS_LIST, ToolCallParams,
    ToolListParams,
};

const INITIAL_BACKOFF: Duration = Duration::from_millis(500);
const MAX_BACKOFF: Duration = Duration::from_secs(30);
const DEFAULT_CHANNEL_CAPACITY: usize = 256;
const MAX_SSE_FRAME_BYTES: usize = 1024 * 1024;

/// One decoded Server-Sent Event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    pub event: Option<String>,
    pub data: String,
}

/// Incremental Server-Sent Events frame decoder.
///
/// Bytes are buffered until a blank line closes the frame, so multi-byte
/// characters split across chunks decode correctly. Scanning resumes where
/// the previous chunk stopped, and a partial frame larger than the limit is
/// a protocol error.
#[derive(Debug)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    scanned: usize,
    max_frame_bytes: usize,
}

impl Default for SseDecoder {
    fn default() -> Self {
        Self::with_max_frame_bytes(MAX_SSE_FRAME_BYTES)
    }
}

impl SseDecoder {
    pub fn with_max_frame_bytes(max_frame_bytes: usize) -> Self {
        Self {
            buffer: Vec::new(),
            scanned: 0,
            max_frame_bytes,
        }
    }

    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<SseEvent>, ConnectionError> {
        self.buffer
            .extend(chunk.iter().copied().filter(|byte| *byte != b'\r'));

        let mut events = Vec::new();
        loop {
            // Step back one byte so a terminator split across chunks is found.
            let start = self.scanned.saturating_sub(1);
            let terminator = self
                .buffer
                .get(start..)
                .and_then(|tail| tail.windows(2).position(|pair| pair == b"\n\n"))
                .map(|offset| start + offset);
            let Some(end) = terminator else {
                self.scanned = self.buffer.len();
                break;
            };

            let frame: Vec<u8> = self.buffer.drain(..end + 2).collect();
            self.scanned = 0;
            if let Some(event) = Self::parse_frame(&String::from_utf8_lossy(&frame)) {
                events.push(event);
            }
        }

        if self.buffer.len() > self.max_frame_bytes {
            let pending = self.buffer.len();
            self.buffer.clear();
            self.scanned = 0;
            return Err(ConnectionError::Protocol(format!(
                "event frame exceeds {} bytes ({pending} buffered)",
                self.max_frame_bytes
            )));
        }
        Ok(events)
    }

    fn parse_frame(frame: &str) -> Option<SseEvent> {
        let mut event = None;
        let mut data_lines = Vec::new();

        for line in frame.lines() {
            if let Some(data) = line.strip_prefix("data:") {
                data_lines.push(data.trim());
            } else if let Some(name) = line.strip_prefix("event:") {
                event = Some(name.trim().to_string());
            }
            // id:, retry: and comments are not used
        }

        if data_lines.is_empty() {
            return None;
        }
        Some(SseEvent {
            event,
            data: data_lines.join("\n"),
        })
    }
}

/// Builder for [`HttpBrokerConnection`].
pub struct HttpBrokerConnectionBuilder {
    endpoint: String,
    timeout: Duration,
    api_key: Option<String>,
    channel_capacity: usize,
}

impl HttpBrokerConnectionBuilder {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            timeout: Duration::from_secs(30),
            api_key: None,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }

    /// Endpoint and request timeout from `config`; the bearer token is read
    /// from the environment variable it names, if any.
    pub fn from_config(config: &BrokerConfig) -> Self {
        let api_key = config
            .api_key_env
            .as_deref()
            .and_then(|name| std::env::var(name).ok())
            .filter(|key| !key.trim().is_empty());
        Self::new(config.endpoint.clone())
            .with_timeout(config.request_timeout())
            .with_api_key(api_key)
    }

    /// Timeout for one JSON-RPC round-trip. Does not apply to the event
    /// stream.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key;
        self
    }

    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }

    pub fn build(self) -> Result<HttpBrokerConnection, ConnectionError> {
        let rpc_client = HttpClient::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| ConnectionError::Network(format!("failed to create HTTP client: {e}")))?;
        let event_client = HttpClient::builder()
            .connect_timeout(self.timeout)
            .build()
            .map_err(|e| ConnectionError::Network(format!("failed to create HTTP client: {e}")))?;

        let base = self.endpoint.trim_end_matches('/').to_string();
        let (notifications, _) = broadcast::channel(self.channel_capacity);

        Ok(HttpBrokerConnection {
            rpc_client,
            event_client,
            rpc_url: format!("{base}/rpc"),
            events_url: format!("{base}/events"),
            api_key: self.api_key,
            request_counter: AtomicU64::new(1),
            notifications,
            live: Arc::new(AtomicBool::new(false)),
            shutdown: CancellationToken::new(),
        })
    }
}

/// [`ToolConnection`] backed by an HTTP broker.
pub struct HttpBrokerConnection {
    rpc_client: HttpClient,
    event_client: HttpClient,
    rpc_url: String,
    events_url: String,
    api_key: Option<String>,
    request_counter: AtomicU64,
    notifications: broadcast::Sender<ToolNotification>,
    live: Arc<AtomicBool>,
    shutdown: CancellationToken,
}

impl HttpBrokerConnection {
    pub fn builder(endpoint: impl Into<String>) -> HttpBrokerConnectionBuilder {
        HttpBrokerConnectionBuilder::new(endpoint)
    }

    /// Start the event-stream task. It runs until [`Self::close`] or drop.
    pub fn start(&self) {
        let listener = EventListener {
            client: self.event_client.clone(),
            url: self.events_url.clone(),
            api_key: self.api_key.clone(),
            sender: self.notifications.clone(),
            live: Arc::clone(&self.live),
        };
        let shutdown = self.shutdown.child_token();
        tokio::spawn(async move { listener.run(shutdown).await });
    }

    pub fn close(&self) {
        self.shutdown.cancel();
        self.live.store(false, Ordering::SeqCst);
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, ConnectionError> {
        let id = self.request_counter.fetch_add(1, Ordering::Relaxed);
        let request = JsonRpcRequest::new(method, Some(params), id);
        debug!(method, id, "sending JSON-RPC request");

        let mut builder = self.rpc_client.post(&self.rpc_url).json(&request);
        if let Some(token) = &self.api_key {
            builder = builder.bearer_auth(token);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| ConnectionError::Network(format!("request failed: {e}")))?;

        let status = response.status();
        match status {
            StatusCode::OK => {
                let body = response
                    .text()
                    .await
                    .map_err(|e| ConnectionError::Network(e.to_string()))?;
                trace!(body_len = body.len(), "received JSON-RPC response");

                let rpc_response: JsonRpcResponse = serde_json::from_str(&body)
                    .map_err(|e| ConnectionError::Protocol(format!("invalid response: {e}")))?;
                if let Some(error) = rpc_response.error {
                    return Err(ConnectionError::Rpc {
                        code: error.code,
                        message: error.message,
                    });
                }
                Ok(rpc_response.result.unwrap_or(Value::Null))
            }
            StatusCode::UNAUTHORIZED => Err(ConnectionError::Rpc {
                code: 401,
                message: "authentication required".to_string(),
            }),
            _ => {
                let body = response.text().await.unwrap_or_default();
                Err(ConnectionError::Rpc {
                    code: i64::from(status.as_u16()),
                    message: format!("HTTP {}: {}", status.as_u16(), body),
                })
            }
        }
    }
}

impl Drop for HttpBrokerConnection {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[async_trait]
impl ToolConnection for HttpBrokerConnection {
    fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    async fn submit(
        &self,
        target: &str,
        tool: &str,
        input: &Map<String, Value>,
    ) -> Result<SubmitOutcome, ConnectionError> {
        let params = serde_json::to_value(ToolCallParams {
            target,
            name: tool,
            arguments: input,
        })
        .map_err(|e| ConnectionError::Protocol(e.to_string()))?;
        let result = self.call(METHOD_TOOLS_CALL, params).await?;
        SubmitOutcome::from_result(result)
    }

    async fn list_tools(&self, target: &str) -> Result<Value, ConnectionError> {
        let params = serde_json::to_value(ToolListParams { target })
            .map_err(|e| ConnectionError::Protocol(e.to_string()))?;
        self.call(METHOD_TOOLS_LIST, params).await
    }

    fn subscribe(&self) -> broadcast::Receiver<ToolNotification> {
        self.notifications.subscribe()
    }
}

struct EventListener {
    client: HttpClient,
    url: String,
    api_key: Option<String>,
    sender: broadcast::Sender<ToolNotification>,
    live: Arc<AtomicBool>,
}

impl EventListener {
    async fn run(self, shutdown: CancellationToken) {
        let mut backoff = INITIAL_BACKOFF;
        loop {
            let result = tokio::select! {
                _ = shutdown.cancelled() => break,
                result = self.stream() => result,
            };
            self.live.store(false, Ordering::SeqCst);

            match result {
                Ok(()) => {
                    info!(url = %self.url, "event stream ended; reconnecting");
                    backoff = INITIAL_BACKOFF;
                }
                Err(error) => {
                    warn!(url = %self.url, %error, retry_in = ?backoff, "event stream failed");
                }
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(backoff) => {}
            }
            backoff = backoff.saturating_mul(2).min(MAX_BACKOFF);
        }
        self.live.store(false, Ordering::SeqCst);
        debug!(url = %self.url, "event listener stopped");
    }

    async fn stream(&self) -> Result<(), ConnectionError> {
        let mut request = self.client.get(&self.url);
        if let Some(token) = &self.api_key {
            request = request.bearer_auth(token);
        }

        let response = request
            .header("Accept", "text/event-stream")
            .send()
            .await
            .map_err(|e| ConnectionError::Network(e.to_string()))?;
        if !response.status().is_success() {
            return Err(ConnectionError::Network(format!(
                "event stream rejected: {}",
                response.status()
            )));
        }

        self.live.store(true, Ordering::SeqCst);
        info!(url = %self.url, "event stream connected");

        let mut stream = response.bytes_stream();
        let mut decoder = SseDecoder::default();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| ConnectionError::Network(e.to_string()))?;
            for event in decoder.push(&chunk)? {
                self.forward(event);
            }
        }
        Ok(())
    }

    fn forward(&self, event: SseEvent) {
        match serde_json::from_str::<ToolNotification>(&event.data) {
            Ok(notification) => {
                if self.sender.send(notification).is_err() {
                    trace!("no subscribers for broker notification");
                }
            }
            Err(error) => {
                debug!(event = ?event.event, %error, "skipping undecodable event");
            }
        }
    }
}
