use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use wiremock::matchers::{header, method, path};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};
use zchat_core::llm::{ChatClient, ChatOpts, Message};
use zchat_core::{ChatError, Failure};
use zchat_providers::zai::{ZaiClient, ZaiConfig};

fn config(server: &MockServer) -> ZaiConfig {
    config_for(server.uri())
}

fn config_for(base_url: String) -> ZaiConfig {
    let mut cfg = ZaiConfig::new("test-token").unwrap();
    cfg.base_url = base_url;
    cfg.retry_delay = Duration::from_millis(10);
    cfg.max_retry_delay = Duration::from_millis(50);
    cfg
}

fn sse(lines: &[&str]) -> ResponseTemplate {
    let mut body = String::new();
    for l in lines {
        body.push_str(l);
        body.push('\n');
    }
    ResponseTemplate::new(200).set_body_raw(body, "text/event-stream")
}

fn hello_world() -> ResponseTemplate {
    sse(&[
        r#"data: {"delta_content":"Hello "}"#,
        r#"data: {"delta_content":"world"}"#,
        "data: [DONE]",
    ])
}

async fn mount_session(server: &MockServer, id: &str) {
    Mock::given(method("POST"))
        .and(path("/v1/chats/new"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": id })))
        .mount(server)
        .await;
}

/// Serve raw TCP on a local port, handing each accepted connection to
/// `handle`. Returns the base URL and the number of connections accepted.
async fn raw_server<F, Fut>(handle: F) -> (String, Arc<AtomicUsize>)
where
    F: Fn(TcpStream) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accepted = Arc::new(AtomicUsize::new(0));
    let counter = accepted.clone();
    tokio::spawn(async move {
        while let Ok((sock, _)) = listener.accept().await {
            counter.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(handle(sock));
        }
    });
    (format!("http://{addr}"), accepted)
}

async fn read_request_head(sock: &mut TcpStream) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        match sock.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    }
}

async fn requests_to(server: &MockServer, p: &str) -> Vec<Request> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .into_iter()
        .filter(|r| r.url.path() == p)
        .collect()
}

#[tokio::test]
async fn streams_and_assembles_answer() {
    let server = MockServer::start().await;
    mount_session(&server, "chat-1").await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer test-token"))
        .and(header("x-fe-version", "prod-fe-1.0.57"))
        .and(header("referer", "https://chat.z.ai/c/chat-1"))
        .and(header("origin", "https://chat.z.ai"))
        .respond_with(hello_world())
        .expect(1)
        .mount(&server)
        .await;

    let client = ZaiClient::new(config(&server)).unwrap();
    let resp = client
        .chat(
            vec![Message::user("hi")],
            ChatOpts::default().user_context("Ann", ""),
        )
        .await
        .unwrap();
    assert_eq!(resp.content(), "Hello world");
    assert_eq!(resp.id, "chat-1");
    assert_eq!(resp.choice.finish_reason, "stop");

    let sent = requests_to(&server, "/chat/completions").await;
    let body: Value = sent[0].body_json().unwrap();
    assert_eq!(body["chat_id"], "chat-1");
    assert_eq!(body["stream"], true);
    assert_eq!(body["messages"], json!([{"role": "user", "content": "hi"}]));
    assert_eq!(body["variables"]["{{USER_NAME}}"], "Ann");
    assert_eq!(body["variables"]["{{USER_LOCATION}}"], "Russia");
    assert_eq!(body["variables"]["{{CURRENT_TIMEZONE}}"], "Europe/Moscow");
}

#[tokio::test]
async fn quick_chat_returns_text_and_usage_flows() {
    let server = MockServer::start().await;
    mount_session(&server, "chat-q").await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(sse(&[
            r#"data: {"type":"chat:completion","data":{"delta_content":"42","phase":"answer"}}"#,
            r#"data: {"type":"chat:completion","data":{"delta_content":"","usage":{"prompt_tokens":7,"completion_tokens":1,"total_tokens":8},"done":true}}"#,
        ]))
        .mount(&server)
        .await;

    let client = ZaiClient::new(config(&server)).unwrap();
    let text = client
        .quick_chat("meaning of life?", ChatOpts::default())
        .await
        .unwrap();
    assert_eq!(text, "42");

    let resp = client
        .chat(vec![Message::user("again")], ChatOpts::default())
        .await
        .unwrap();
    assert_eq!(resp.usage.total_tokens, 8);
}

#[tokio::test]
async fn session_500s_are_retried_until_success() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chats/new"))
        .respond_with(ResponseTemplate::new(500).set_body_string("overloaded"))
        .up_to_n_times(2)
        .with_priority(1)
        .mount(&server)
        .await;
    mount_session(&server, "chat-3").await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(hello_world())
        .expect(1)
        .mount(&server)
        .await;

    let client = ZaiClient::new(config(&server)).unwrap();
    let resp = client
        .chat(vec![Message::user("hi")], ChatOpts::default())
        .await
        .unwrap();
    assert_eq!(resp.id, "chat-3");
    assert_eq!(requests_to(&server, "/v1/chats/new").await.len(), 3);
}

#[tokio::test]
async fn decode_error_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chats/new"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
        .expect(1)
        .mount(&server)
        .await;

    let client = ZaiClient::new(config(&server)).unwrap();
    let err = client
        .chat(vec![Message::user("hi")], ChatOpts::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ChatError::SessionCreate(Failure::Decode(_))), "{err}");
    assert!(!err.is_retryable());
    assert!(requests_to(&server, "/chat/completions").await.is_empty());
}

#[tokio::test]
async fn empty_session_id_is_terminal() {
    let server = MockServer::start().await;
    mount_session(&server, "").await;

    let client = ZaiClient::new(config(&server)).unwrap();
    let err = client.open_session("hi").await.unwrap_err();
    assert!(matches!(err, ChatError::SessionCreate(Failure::EmptySessionId)));
}

#[tokio::test]
async fn every_open_creates_a_new_session() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chats/new"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "fixed"})))
        .expect(2)
        .mount(&server)
        .await;

    let client = ZaiClient::new(config(&server)).unwrap();
    let a = client.open_session("same").await.unwrap();
    let b = client.open_session("same").await.unwrap();
    assert_eq!(a.id, "fixed");
    assert_eq!(b.id, "fixed");

    let sent = requests_to(&server, "/v1/chats/new").await;
    let ids: Vec<Value> = sent
        .iter()
        .map(|r| r.body_json::<Value>().unwrap()["chat"]["history"]["currentId"].clone())
        .collect();
    assert_ne!(ids[0], ids[1]);
}

#[tokio::test]
async fn silent_provider_exhausts_retries_with_no_content_timeout() {
    let server = MockServer::start().await;
    mount_session(&server, "chat-slow").await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(hello_world().set_delay(Duration::from_millis(600)))
        .mount(&server)
        .await;

    let mut cfg = config(&server);
    cfg.first_content_timeout = Duration::from_millis(200);
    cfg.max_retries = 1;
    let client = ZaiClient::new(cfg).unwrap();
    let err = client
        .chat(vec![Message::user("hi")], ChatOpts::default())
        .await
        .unwrap_err();
    match err {
        ChatError::RetriesExhausted { attempts, source } => {
            assert_eq!(attempts, 2);
            assert!(matches!(*source, ChatError::NoContentTimeout(_)));
        }
        other => panic!("unexpected {other}"),
    }
    // one fresh session per attempt
    assert_eq!(requests_to(&server, "/v1/chats/new").await.len(), 2);
}

#[tokio::test]
async fn completion_401_surfaces_immediately() {
    let server = MockServer::start().await;
    mount_session(&server, "chat-x").await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_string("bad token"))
        .expect(1)
        .mount(&server)
        .await;

    let client = ZaiClient::new(config(&server)).unwrap();
    let err = client
        .chat(vec![Message::user("hi")], ChatOpts::default())
        .await
        .unwrap_err();
    match err {
        ChatError::StreamRead(Failure::Status { status, body }) => {
            assert_eq!(status, 401);
            assert_eq!(body, "bad token");
        }
        other => panic!("unexpected {other}"),
    }
}

#[tokio::test]
async fn missing_session_id_is_terminal() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chats/new"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"title": "x"})))
        .expect(1)
        .mount(&server)
        .await;

    let client = ZaiClient::new(config(&server)).unwrap();
    let err = client.open_session("hi").await.unwrap_err();
    assert!(matches!(err, ChatError::SessionCreate(Failure::EmptySessionId)), "{err}");
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn stalled_session_call_times_out_and_is_retried() {
    let (base, accepted) = raw_server(|mut sock| async move {
        read_request_head(&mut sock).await;
        // hold the connection open without answering
        tokio::time::sleep(Duration::from_secs(30)).await;
        drop(sock);
    })
    .await;

    let mut cfg = config_for(base);
    cfg.session_timeout = Duration::from_millis(200);
    cfg.max_retries = 1;
    let client = ZaiClient::new(cfg).unwrap();
    let err = tokio::time::timeout(
        Duration::from_secs(5),
        client.chat(vec![Message::user("hi")], ChatOpts::default()),
    )
    .await
    .expect("session call must be bounded")
    .unwrap_err();
    match err {
        ChatError::RetriesExhausted { attempts, source } => {
            assert_eq!(attempts, 2);
            assert!(
                matches!(*source, ChatError::SessionCreate(Failure::Timeout(_))),
                "{source}"
            );
        }
        other => panic!("unexpected {other}"),
    }
    assert!(accepted.load(Ordering::SeqCst) >= 2);
}

#[tokio::test]
async fn truncated_session_body_is_eof_and_retried() {
    let (base, accepted) = raw_server(|mut sock| async move {
        read_request_head(&mut sock).await;
        let _ = sock
            .write_all(
                b"HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: 100\r\n\r\n{\"id\":",
            )
            .await;
        let _ = sock.shutdown().await;
    })
    .await;

    let mut cfg = config_for(base);
    cfg.max_retries = 1;
    let client = ZaiClient::new(cfg).unwrap();

    let err = client.open_session("hi").await.unwrap_err();
    assert!(matches!(err, ChatError::SessionCreate(Failure::Eof)), "{err}");
    assert!(err.is_retryable());

    let err = client
        .chat(vec![Message::user("hi")], ChatOpts::default())
        .await
        .unwrap_err();
    match err {
        ChatError::RetriesExhausted { attempts, source } => {
            assert_eq!(attempts, 2);
            assert!(matches!(*source, ChatError::SessionCreate(Failure::Eof)), "{source}");
        }
        other => panic!("unexpected {other}"),
    }
    // one direct open plus one per retry attempt
    assert!(accepted.load(Ordering::SeqCst) >= 3);
}
