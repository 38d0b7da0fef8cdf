use pretty_assertions::assert_eq;
use serde_json::{Map, Value, json};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt as _, AsyncWriteExt as _};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use toolrelay_core::gateway::{
    ConnectionError, HttpBrokerConnection, InvocationGateway, SubmitOutcome, ToolConnection,
    ToolNotification,
};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const RESULT_METHOD: &str = "notifications/tools/result";
const WAIT: Duration = Duration::from_secs(10);

fn connection(server: &MockServer) -> HttpBrokerConnection {
    HttpBrokerConnection::builder(server.uri())
        .with_timeout(Duration::from_secs(5))
        .build()
        .expect("connection builds")
}

async fn rpc_responds(server: &MockServer, response: ResponseTemplate) {
    Mock::given(method("POST"))
        .and(path("/rpc"))
        .respond_with(response)
        .mount(server)
        .await;
}

async fn submit(connection: &HttpBrokerConnection) -> Result<SubmitOutcome, ConnectionError> {
    let mut input = Map::new();
    input.insert("channel_id".to_string(), json!("C1"));
    connection.submit("slack", "conversations_history", &input).await
}

async fn next_notification(
    receiver: &mut broadcast::Receiver<ToolNotification>,
) -> ToolNotification {
    tokio::time::timeout(WAIT, receiver.recv())
        .await
        .expect("notification before the deadline")
        .expect("notification channel open")
}

async fn wait_until_live(connection: &HttpBrokerConnection) {
    tokio::time::timeout(WAIT, async {
        while !connection.is_live() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("event stream connects");
}

#[tokio::test]
async fn inline_result_is_returned() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rpc"))
        .and(body_partial_json(json!({
            "jsonrpc": "2.0",
            "method": "tools/call",
            "params": {
                "target": "slack",
                "name": "conversations_history",
                "arguments": {"channel_id": "C1"}
            }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "result": {"content": [{"type": "text", "text": "hi"}]}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = submit(&connection(&server)).await.expect("submission succeeds");

    assert_eq!(
        outcome,
        SubmitOutcome::Inline(json!({"content": [{"type": "text", "text": "hi"}]}))
    );
}

#[tokio::test]
async fn numeric_acknowledgment_is_pending() {
    let server = MockServer::start().await;
    rpc_responds(
        &server,
        ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "result": {"correlationId": 7, "status": "pending"}
        })),
    )
    .await;

    let outcome = submit(&connection(&server)).await.expect("submission succeeds");

    assert_eq!(
        outcome,
        SubmitOutcome::Pending {
            correlation_id: "7".to_string()
        }
    );
}

#[tokio::test]
async fn error_body_maps_to_rpc_error() {
    let server = MockServer::start().await;
    rpc_responds(
        &server,
        ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": {"code": -32601, "message": "unknown tool"}
        })),
    )
    .await;

    let error = submit(&connection(&server)).await.expect_err("rpc error");

    assert_eq!(
        error,
        ConnectionError::Rpc {
            code: -32601,
            message: "unknown tool".to_string()
        }
    );
}

#[tokio::test]
async fn unauthorized_maps_to_rpc_401() {
    let server = MockServer::start().await;
    rpc_responds(&server, ResponseTemplate::new(401)).await;

    let error = submit(&connection(&server)).await.expect_err("auth error");

    assert!(
        matches!(error, ConnectionError::Rpc { code: 401, .. }),
        "{error:?}"
    );
}

#[tokio::test]
async fn server_error_keeps_status_and_body() {
    let server = MockServer::start().await;
    rpc_responds(&server, ResponseTemplate::new(503).set_body_string("broker overloaded")).await;

    let error = submit(&connection(&server)).await.expect_err("server error");

    let ConnectionError::Rpc { code, message } = error else {
        panic!("expected an rpc error, got {error:?}");
    };
    assert_eq!(code, 503);
    assert!(message.contains("broker overloaded"), "{message}");
}

#[tokio::test]
async fn undecodable_body_is_a_protocol_error() {
    let server = MockServer::start().await;
    rpc_responds(&server, ResponseTemplate::new(200).set_body_string("<html>")).await;

    let error = submit(&connection(&server)).await.expect_err("protocol error");

    assert!(matches!(error, ConnectionError::Protocol(_)), "{error:?}");
}

#[tokio::test]
async fn tool_list_request_names_the_target_and_sends_the_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rpc"))
        .and(header("authorization", "Bearer broker-key"))
        .and(body_partial_json(json!({
            "method": "tools/list",
            "params": {"target": "github"}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "result": {"tools": [{"name": "search_issues"}]}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let connection = HttpBrokerConnection::builder(format!("{}/", server.uri()))
        .with_api_key(Some("broker-key".to_string()))
        .build()
        .expect("connection builds");

    let tools = connection.list_tools("github").await.expect("tool list");
    assert_eq!(tools, json!({"tools": [{"name": "search_issues"}]}));
}

#[tokio::test]
async fn event_stream_reconnects_after_it_ends() {
    let server = MockServer::start().await;
    let frame = "event: message\ndata: {\"method\":\"notifications/tools/result\",\"correlationId\":7,\"payload\":\"done\"}\n\n";
    Mock::given(method("GET"))
        .and(path("/events"))
        .and(header("accept", "text/event-stream"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(frame, "text/event-stream"))
        .mount(&server)
        .await;

    let connection = connection(&server);
    let mut notifications = connection.subscribe();
    assert!(!connection.is_live());
    connection.start();

    let first = next_notification(&mut notifications).await;
    assert_eq!(first, ToolNotification::new(RESULT_METHOD, "7", json!("done")));
    // The body ends after one frame, so a second copy needs a new connection.
    let second = next_notification(&mut notifications).await;
    assert_eq!(second, first);

    let streams = server
        .received_requests()
        .await
        .unwrap_or_default()
        .into_iter()
        .filter(|request| request.url.path() == "/events")
        .count();
    assert!(streams >= 2, "only {streams} event stream requests");
    connection.close();
}

#[tokio::test]
async fn rejected_event_stream_is_not_live() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/events"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let connection = connection(&server);
    connection.start();
    tokio::time::timeout(WAIT, async {
        while server.received_requests().await.unwrap_or_default().is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("listener contacts the broker");
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(!connection.is_live());
    connection.close();
}

/// Broker on a raw socket: answers every POST with `rpc_reply` and keeps
/// each event stream open after writing `frames`.
async fn spawn_held_open_broker(frames: Vec<Value>, rpc_reply: Value) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let address = listener.local_addr().expect("local address");
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            tokio::spawn(serve(socket, frames.clone(), rpc_reply.to_string()));
        }
    });
    format!("http://{address}")
}

async fn serve(mut socket: TcpStream, frames: Vec<Value>, rpc_reply: String) {
    let request = read_request(&mut socket).await;
    if request.starts_with("GET /events") {
        let mut response = String::from(
            "HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\ntransfer-encoding: chunked\r\n\r\n",
        );
        for frame in frames {
            let chunk = format!("data: {frame}\n\n");
            response.push_str(&format!("{:x}\r\n{chunk}\r\n", chunk.len()));
        }
        socket
            .write_all(response.as_bytes())
            .await
            .expect("write event stream head");
        let mut sink = [0_u8; 64];
        while matches!(socket.read(&mut sink).await, Ok(read) if read > 0) {}
    } else {
        let response = format!(
            "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{rpc_reply}",
            rpc_reply.len()
        );
        socket
            .write_all(response.as_bytes())
            .await
            .expect("write rpc response");
    }
}

async fn read_request(socket: &mut TcpStream) -> String {
    let mut request = Vec::new();
    let mut buffer = [0_u8; 4096];
    loop {
        let read = socket.read(&mut buffer).await.unwrap_or(0);
        if read == 0 {
            break;
        }
        request.extend_from_slice(buffer.get(..read).unwrap_or_default());

        let text = String::from_utf8_lossy(&request);
        let Some(header_end) = text.find("\r\n\r\n") else {
            continue;
        };
        let body_length = text
            .get(..header_end)
            .unwrap_or_default()
            .lines()
            .filter_map(|line| line.split_once(':'))
            .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
            .and_then(|(_, value)| value.trim().parse::<usize>().ok())
            .unwrap_or(0);
        if request.len() >= header_end + 4 + body_length {
            break;
        }
    }
    String::from_utf8_lossy(&request).into_owned()
}

#[tokio::test]
async fn open_stream_is_live_until_closed() {
    let endpoint = spawn_held_open_broker(Vec::new(), json!({"jsonrpc": "2.0", "id": 1})).await;
    let connection = HttpBrokerConnection::builder(endpoint)
        .build()
        .expect("connection builds");

    connection.start();
    wait_until_live(&connection).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(connection.is_live());

    connection.close();
    assert!(!connection.is_live());
}

#[tokio::test]
async fn pending_call_resolves_from_the_event_stream() {
    let endpoint = spawn_held_open_broker(
        vec![json!({
            "method": RESULT_METHOD,
            "correlationId": 7,
            "payload": {"content": [{"type": "text", "text": "history"}]}
        })],
        json!({"jsonrpc": "2.0", "id": 1, "result": {"correlationId": 7}}),
    )
    .await;
    let connection = Arc::new(
        HttpBrokerConnection::builder(endpoint)
            .build()
            .expect("connection builds"),
    );
    let gateway = InvocationGateway::new("slack", RESULT_METHOD, WAIT);
    gateway.attach(Arc::clone(&connection) as Arc<dyn ToolConnection>);
    connection.start();
    wait_until_live(&connection).await;

    let result = gateway
        .invoke("conversations_history", Map::new())
        .await
        .expect("result arrives over the event stream");

    assert_eq!(
        result,
        json!({"content": [{"type": "text", "text": "history"}]})
    );
    assert_eq!(gateway.outstanding(), 0);
    connection.close();
}
