// API Tests - HttpApi paths, bearer auth and envelope handling against a local responder

use super::support::test_settings;
use crate::api::{HttpApi, SnapshotApi};
use crate::config::{Credential, Settings};
use crate::model::{ConversationId, Direction, RequestAction};
use crate::Error;
use serde_json::{Value, json};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn content_length(head: &str) -> usize {
    head.lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            name.eq_ignore_ascii_case("content-length")
                .then(|| value.trim().parse().ok())
                .flatten()
        })
        .unwrap_or(0)
}

/// Answer exactly one HTTP request; the handle yields the raw request text
async fn serve_once(status: &str, body: Value) -> (Settings, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind listener");
    let addr = listener.local_addr().expect("Failed to get local addr");
    let status = status.to_string();
    let body = body.to_string();

    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.expect("Failed to accept");
        let mut request = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = socket.read(&mut chunk).await.expect("Failed to read request");
            if n == 0 {
                break;
            }
            request.extend_from_slice(&chunk[..n]);
            if let Some(end) = find(&request, b"\r\n\r\n") {
                let head = String::from_utf8_lossy(&request[..end]).to_string();
                if request.len() >= end + 4 + content_length(&head) {
                    break;
                }
            }
        }

        let response = format!(
            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            body.len(),
            body
        );
        socket
            .write_all(response.as_bytes())
            .await
            .expect("Failed to write response");
        String::from_utf8_lossy(&request).to_string()
    });

    let settings = Settings {
        api_base_url: format!("http://{}/api", addr),
        ..test_settings()
    };
    (settings, handle)
}

fn client(settings: &Settings) -> HttpApi {
    HttpApi::new(settings, Some(Credential::new("tok-123"))).expect("Failed to build client")
}

#[tokio::test]
async fn test_list_chats_sends_bearer_and_unwraps_envelope() {
    let (settings, server) = serve_once(
        "200 OK",
        json!({"success": true, "data": [{"id": 1, "participants": [], "unreadCount": 3}]}),
    )
    .await;

    let chats = client(&settings)
        .list_chats()
        .await
        .expect("Failed to list chats");
    let request = server.await.expect("Server task panicked");

    assert_eq!(chats.len(), 1);
    assert_eq!(chats[0].id, "1");
    assert_eq!(chats[0].unread_count, 3);
    assert!(request.starts_with("GET /api/chats HTTP/1.1"));
    assert!(request.to_lowercase().contains("authorization: bearer tok-123"));
}

#[tokio::test]
async fn test_list_messages_passes_pagination() {
    let (settings, server) = serve_once("200 OK", json!({"success": true, "data": []})).await;

    client(&settings)
        .list_messages(&ConversationId::Direct("c1".to_string()), 20, 40)
        .await
        .expect("Failed to list messages");
    let request = server.await.expect("Server task panicked");

    assert!(request.starts_with("GET /api/chats/c1/messages?limit=20&offset=40 "));
}

#[tokio::test]
async fn test_send_team_message_posts_content() {
    let (settings, server) = serve_once(
        "201 Created",
        json!({"success": true, "data": {"id": "tm1", "content": "gg", "sentAt": "2024-01-01T00:00:00Z", "senderId": "me"}}),
    )
    .await;

    let ack = client(&settings)
        .send_message(&ConversationId::Team("t1".to_string()), "gg")
        .await
        .expect("Failed to send");
    let request = server.await.expect("Server task panicked");

    assert_eq!(ack.id, "tm1");
    assert_eq!(ack.sender_id.as_deref(), Some("me"));
    assert!(request.starts_with("POST /api/teams/t1/messages HTTP/1.1"));
    assert!(request.ends_with(r#"{"content":"gg"}"#));
}

#[tokio::test]
async fn test_mark_read_paths() {
    let (settings, server) = serve_once("200 OK", json!({"success": true})).await;
    client(&settings)
        .mark_read(&ConversationId::Team("t1".to_string()))
        .await
        .expect("Failed to mark read");
    let request = server.await.expect("Server task panicked");
    assert!(request.starts_with("PATCH /api/teams/t1/messages/read "));

    let (settings, server) = serve_once("200 OK", json!({"success": true})).await;
    client(&settings)
        .mark_read(&ConversationId::Direct("c1".to_string()))
        .await
        .expect("Failed to mark read");
    let request = server.await.expect("Server task panicked");
    assert!(request.starts_with("PATCH /api/chats/c1/read "));
}

#[tokio::test]
async fn test_request_box_queries() {
    let (settings, server) = serve_once("200 OK", json!({"success": true, "data": []})).await;
    client(&settings)
        .list_friend_requests(Direction::Outgoing)
        .await
        .expect("Failed to list requests");
    let request = server.await.expect("Server task panicked");
    assert!(request.starts_with("GET /api/friends/requests?box=outgoing "));

    let (settings, server) = serve_once("200 OK", json!({"success": true, "data": []})).await;
    client(&settings)
        .list_team_invitations(Direction::Incoming)
        .await
        .expect("Failed to list invitations");
    let request = server.await.expect("Server task panicked");
    assert!(request.starts_with("GET /api/teams/invitations?type=received "));
}

#[tokio::test]
async fn test_respond_paths() {
    let (settings, server) = serve_once("200 OK", json!({"success": true})).await;
    client(&settings)
        .respond_friend_request("r1", RequestAction::Decline)
        .await
        .expect("Failed to respond");
    let request = server.await.expect("Server task panicked");
    assert!(request.starts_with("POST /api/friends/requests/r1/respond "));
    assert!(request.ends_with(r#"{"action":"decline"}"#));

    let (settings, server) = serve_once("200 OK", json!({"success": true})).await;
    client(&settings)
        .respond_team_invitation("j1", RequestAction::Approve)
        .await
        .expect("Failed to respond");
    let request = server.await.expect("Server task panicked");
    assert!(request.starts_with("POST /api/teams/invitations/j1/approve "));
}

#[tokio::test]
async fn test_envelope_failure_is_api_error() {
    let (settings, server) = serve_once(
        "200 OK",
        json!({"success": false, "message": "Not a participant"}),
    )
    .await;

    let err = client(&settings).list_teams().await.unwrap_err();
    server.await.expect("Server task panicked");

    match err {
        Error::Api { message } => assert_eq!(message, "Not a participant"),
        other => panic!("unexpected error {:?}", other),
    }
}

#[tokio::test]
async fn test_server_error_is_retryable_http_error() {
    let (settings, server) = serve_once(
        "503 Service Unavailable",
        json!({"success": false}),
    )
    .await;

    let err = client(&settings).list_notifications().await.unwrap_err();
    server.await.expect("Server task panicked");

    assert!(matches!(err, Error::Http { status: 503 }));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_client_error_is_not_retryable() {
    let (settings, server) = serve_once("403 Forbidden", json!({"success": false})).await;

    let err = client(&settings).list_friends().await.unwrap_err();
    server.await.expect("Server task panicked");

    assert!(matches!(err, Error::Http { status: 403 }));
    assert!(!err.is_retryable());
}

#[test]
fn test_unreachable_server_is_network_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("Failed to bind listener");
    let addr = listener.local_addr().expect("Failed to get local addr");
    drop(listener);

    let settings = Settings {
        api_base_url: format!("http://{}/api", addr),
        request_timeout_ms: 2_000,
        ..test_settings()
    };
    let err = tokio_test::block_on(client(&settings).list_chats()).unwrap_err();

    assert!(matches!(err, Error::Network(_)));
    assert!(err.is_retryable());
}

#[test]
fn test_base_url_is_normalized() {
    let settings = Settings {
        api_base_url: "https://match.example/api/".to_string(),
        ..Settings::default()
    };
    let api = HttpApi::new(&settings, None).expect("Failed to build client");
    assert_eq!(api.base_url(), "https://match.example/api");
}
