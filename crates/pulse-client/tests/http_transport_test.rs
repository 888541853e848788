//! HTTP transport tests against a local one-shot server
//!
//! CHARACTERIZATION: These tests run the real reqwest client against a raw
//! TCP listener that replays canned HTTP responses piece by piece.
//!
//! What these tests protect:
//! - The request body is the JSON GenerateRequest, including the thread id
//! - A body written in arbitrary pieces decodes into a completed session
//! - Multi-byte characters split across writes survive
//! - Non-success statuses become TransportError::Http
//! - Conversation list/delete round trips
//!
//! What these tests intentionally do NOT assert:
//! - How the body is chunked on the client side
//! - Request headers other than the method and path

use std::time::Duration;

use pulse_client::{ConversationsClient, HttpTransport};
use pulse_core::{
    BackendConfig, GenerateRequest, SessionConfig, SessionController, SessionOutcome, Transport,
    TransportError,
};
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Serve one connection: capture the request, then write `pieces` with a
/// short pause between them and close.
async fn serve_once(pieces: Vec<Vec<u8>>) -> (BackendConfig, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let request = read_request(&mut socket).await;
        for piece in pieces {
            socket.write_all(&piece).await.unwrap();
            socket.flush().await.unwrap();
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        socket.shutdown().await.ok();
        request
    });

    let config = BackendConfig {
        base_url: format!("http://{}/api", addr),
        generate_path: "/chat".to_string(),
        request_timeout_secs: 5,
    };
    (config, server)
}

async fn read_request(socket: &mut tokio::net::TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = socket.read(&mut chunk).await.unwrap();
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        let text = String::from_utf8_lossy(&buf);
        if let Some(header_end) = text.find("\r\n\r\n") {
            let length = text[..header_end]
                .lines()
                .find_map(|line| {
                    let (name, value) = line.split_once(':')?;
                    name.eq_ignore_ascii_case("content-length")
                        .then(|| value.trim().parse::<usize>().ok())
                        .flatten()
                })
                .unwrap_or(0);
            if buf.len() >= header_end + 4 + length {
                break;
            }
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

fn streaming_head() -> Vec<u8> {
    b"HTTP/1.1 200 OK\r\nContent-Type: text/plain; charset=utf-8\r\nConnection: close\r\n\r\n".to_vec()
}

fn json_response(status: &str, body: &str) -> Vec<u8> {
    format!(
        "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        body.len(),
        body
    )
    .into_bytes()
}

fn request_body(raw: &str) -> Value {
    let body = raw.split_once("\r\n\r\n").map(|(_, b)| b).unwrap_or("");
    serde_json::from_str(body).unwrap()
}

// =============================================================================
// Generate stream
// =============================================================================

mod generate {
    use super::*;

    /// A body written in pieces (splitting a marker and a character) completes
    #[tokio::test]
    async fn streamed_body_completes_session() {
        let body = concat!(
            "Draft for caf\u{e9} owners. ",
            r#"__TOOL_EVENT__{"type":"tool_event","tool":"web_search","status":"completed","timestamp":"2025-01-01T00:00:00Z"}__END_TOOL_EVENT__"#,
            "Second line.",
            r#"{"type":"done","thread_id":"thread-1"}"#,
        )
        .as_bytes()
        .to_vec();
        // Split inside 'é' and inside the tool marker.
        let split_char = "Draft for caf".len() + 1;
        let split_marker = "Draft for caf\u{e9} owners. __TOOL_EV".len();
        let pieces = vec![
            streaming_head(),
            body[..split_char].to_vec(),
            body[split_char..split_marker].to_vec(),
            body[split_marker..].to_vec(),
        ];
        let (config, server) = serve_once(pieces).await;

        let transport = HttpTransport::new(&config).unwrap();
        let mut controller = SessionController::new(transport, SessionConfig::default());
        let request = GenerateRequest::new("Coffee trends").with_thread_id("thread-0");
        let handle = controller.submit(request).unwrap();

        let view = tokio::time::timeout(Duration::from_secs(10), handle.finished())
            .await
            .unwrap();
        assert_eq!(view.outcome, SessionOutcome::Completed);
        assert_eq!(view.text, "Draft for caf\u{e9} owners. Second line.");
        assert_eq!(view.tools.len(), 1);
        assert_eq!(view.thread_id.as_deref(), Some("thread-1"));

        let raw = server.await.unwrap();
        assert!(raw.starts_with("POST /api/chat "), "request line: {}", raw);
        let sent = request_body(&raw);
        assert_eq!(sent["message"], "Coffee trends");
        assert_eq!(sent["thread_id"], "thread-0");
        assert_eq!(sent["platforms"][0], "linkedin");
    }

    /// Non-success status is reported with its body
    #[tokio::test]
    async fn server_error_status() {
        let (config, _server) =
            serve_once(vec![json_response("500 Internal Server Error", r#"{"detail":"boom"}"#)])
                .await;
        let transport = HttpTransport::new(&config).unwrap();

        match transport.open(&GenerateRequest::new("x")).await {
            Err(TransportError::Http { status, body }) => {
                assert_eq!(status, 500);
                assert!(body.contains("boom"));
            }
            Ok(_) => panic!("expected HTTP error"),
            Err(other) => panic!("expected HTTP error, got {:?}", other),
        }
    }

    /// Nothing listening is a network failure
    #[tokio::test]
    async fn connection_refused_is_network_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let config = BackendConfig {
            base_url: format!("http://{}/api", addr),
            ..BackendConfig::default()
        };
        let transport = HttpTransport::new(&config).unwrap();

        match transport.open(&GenerateRequest::new("x")).await {
            Err(TransportError::Network(_)) => {}
            Ok(_) => panic!("expected network error"),
            Err(other) => panic!("expected network error, got {:?}", other),
        }
    }
}

// =============================================================================
// Conversations API
// =============================================================================

mod conversations {
    use super::*;

    /// List decodes camelCase summaries
    #[tokio::test]
    async fn list_conversations() {
        let body = r#"[{"id":"c1","title":"Launch","createdAt":"2025-01-01T00:00:00Z","updatedAt":"2025-01-02T00:00:00Z"}]"#;
        let (config, server) = serve_once(vec![json_response("200 OK", body)]).await;

        let client = ConversationsClient::new(&config).unwrap();
        let list = client.list().await.unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].title, "Launch");

        let raw = server.await.unwrap();
        assert!(raw.starts_with("GET /api/conversations "), "request line: {}", raw);
    }

    /// Delete targets the conversation path
    #[tokio::test]
    async fn delete_conversation() {
        let (config, server) = serve_once(vec![json_response("200 OK", "{}")]).await;

        let client = ConversationsClient::new(&config).unwrap();
        client.delete("c1").await.unwrap();

        let raw = server.await.unwrap();
        assert!(raw.starts_with("DELETE /api/conversations/c1 "), "request line: {}", raw);
    }

    /// Deleting an unknown conversation surfaces the status
    #[tokio::test]
    async fn delete_missing_conversation() {
        let (config, _server) =
            serve_once(vec![json_response("404 Not Found", r#"{"detail":"not found"}"#)]).await;

        let client = ConversationsClient::new(&config).unwrap();
        match client.delete("nope").await {
            Err(TransportError::Http { status, .. }) => assert_eq!(status, 404),
            other => panic!("expected 404, got {:?}", other),
        }
    }
}
