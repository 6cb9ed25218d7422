//! WebSocket-level integration tests for the `/exec` gateway: a real
//! listener is bound and served with `axum::serve`, and a real client
//! connects with `tokio-tungstenite` — the same "run the server, connect
//! like any other client" approach the `axum` project uses for its own
//! `testing-websockets` example, rather than mocking the socket as a
//! generic `Sink`/`Stream` pair.
//!
//! Tickets are minted directly through `AppState::ticket_store` instead of
//! `POST /ws-ticket`, since these tests are about the WebSocket handshake
//! and pump, not the ticket-issuance endpoint (covered in `http_test.rs`).

use std::future::IntoFuture;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tty_agent_api::{router, AppState};
use tty_agent_core::config::Config;
use tty_agent_core::model::{ExecTarget, PeerMeta};

type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn spawn_server(config: Config) -> (SocketAddr, AppState) {
    let state = AppState::new(config);
    state.mark_ready();
    let listener = tokio::net::TcpListener::bind(SocketAddr::from((Ipv4Addr::LOCALHOST, 0)))
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local_addr");
    let app = router::build(state.clone());
    tokio::spawn(axum::serve(listener, app).into_future());
    (addr, state)
}

fn target() -> ExecTarget {
    ExecTarget {
        namespace: "default".into(),
        pod: "shell-pod".into(),
        container: None,
        command: None,
    }
}

async fn connect(addr: SocketAddr, path_and_query: &str) -> Ws {
    let url = format!("ws://{addr}{path_and_query}");
    let (socket, _response) = tokio_tungstenite::connect_async(url).await.expect("ws connect");
    socket
}

/// Reads messages until a `Text` frame arrives, skipping `Ping`/`Pong`
/// control frames (auto-answered by `tokio-tungstenite` already).
async fn next_text_frame(socket: &mut Ws) -> Value {
    loop {
        match socket.next().await.expect("stream ended").expect("ws error") {
            WsMessage::Text(text) => return serde_json::from_str(text.as_str()).expect("valid json frame"),
            WsMessage::Ping(_) | WsMessage::Pong(_) => continue,
            other => panic!("expected a text frame, got {other:?}"),
        }
    }
}

/// Reads messages until the peer closes the connection, returning the close
/// code/reason if one was sent.
async fn next_close(socket: &mut Ws) -> Option<(u16, String)> {
    loop {
        match socket.next().await {
            None => return None,
            Some(Ok(WsMessage::Close(frame))) => {
                return frame.map(|f| (f.code.into(), f.reason.as_str().to_string()));
            }
            Some(Ok(WsMessage::Ping(_) | WsMessage::Pong(_))) => continue,
            Some(Ok(other)) => panic!("expected close, got {other:?}"),
            Some(Err(_)) => return None,
        }
    }
}

#[tokio::test]
async fn ticket_reuse_mid_flight_is_rejected_for_the_second_connection() {
    let (addr, state) = spawn_server(Config::default()).await;
    let (ticket, _expires_at) = state.ticket_store.issue(
        "apiVersion: v1".into(),
        target(),
        PeerMeta::default(),
    );

    // First connection consumes the ticket via the query-string path and
    // then sits waiting for a resize frame it never sends — simulating a
    // session that is still mid-flight when the ticket is replayed.
    let mut first = connect(addr, &format!("/exec?ticket={ticket}")).await;
    assert_eq!(next_text_frame(&mut first).await, serde_json::json!({"type": "ready"}));
    assert_eq!(next_text_frame(&mut first).await, serde_json::json!({"type": "authed"}));

    // A second connection replaying the same ticket must be rejected, not
    // silently re-authenticated — `TicketStore::consume` only ever succeeds
    // once per ticket id.
    let mut second = connect(addr, &format!("/exec?ticket={ticket}")).await;
    assert_eq!(next_text_frame(&mut second).await, serde_json::json!({"type": "ready"}));
    let error = next_text_frame(&mut second).await;
    assert_eq!(error["type"], serde_json::json!("error"));
    assert_eq!(error["message"], serde_json::json!("Ticket already used."));

    let (code, reason) = next_close(&mut second).await.expect("close frame");
    assert_eq!(code, 1008);
    assert_eq!(reason, "auth rejected");
}

#[tokio::test]
async fn expired_ticket_is_rejected_with_a_distinct_message() {
    let mut config = Config::default();
    config.ws.ticket_ttl_ms = 0;
    let (addr, state) = spawn_server(config).await;
    let (ticket, _) = state.ticket_store.issue("apiVersion: v1".into(), target(), PeerMeta::default());
    tokio::time::sleep(Duration::from_millis(5)).await;

    let mut socket = connect(addr, &format!("/exec?ticket={ticket}")).await;
    assert_eq!(next_text_frame(&mut socket).await, serde_json::json!({"type": "ready"}));
    let error = next_text_frame(&mut socket).await;
    assert_eq!(error["type"], serde_json::json!("error"));
    assert_eq!(error["message"], serde_json::json!("Ticket expired."));

    let (code, reason) = next_close(&mut socket).await.expect("close frame");
    assert_eq!(code, 1008);
    assert_eq!(reason, "auth rejected");
}

#[tokio::test]
async fn auth_timeout_closes_the_connection_with_policy_violation() {
    let mut config = Config::default();
    config.ws.auth_timeout_ms = 50;
    let (addr, _state) = spawn_server(config).await;

    // No ticket in the query string and no `auth` frame ever sent.
    let mut socket = connect(addr, "/exec").await;
    assert_eq!(next_text_frame(&mut socket).await, serde_json::json!({"type": "ready"}));

    let error = next_text_frame(&mut socket).await;
    assert_eq!(error["type"], serde_json::json!("error"));
    assert!(error["message"]
        .as_str()
        .is_some_and(|m| m.starts_with("Auth timeout")));

    let (code, reason) = next_close(&mut socket).await.expect("close frame");
    assert_eq!(code, 1008);
    assert_eq!(reason, "auth timeout");
}

#[tokio::test]
async fn stdin_before_auth_is_rejected_without_reaching_the_exec_session() {
    let (addr, _state) = spawn_server(Config::default()).await;
    let mut socket = connect(addr, "/exec").await;
    assert_eq!(next_text_frame(&mut socket).await, serde_json::json!({"type": "ready"}));

    socket.send(WsMessage::binary(b"ls\n".to_vec())).await.expect("send binary");

    let error = next_text_frame(&mut socket).await;
    assert_eq!(error["type"], serde_json::json!("error"));
    assert_eq!(error["message"], serde_json::json!("stdin is not permitted before authentication"));

    let (code, reason) = next_close(&mut socket).await.expect("close frame");
    assert_eq!(code, 1008);
    assert_eq!(reason, "auth rejected");
}

#[tokio::test]
async fn invalid_kubeconfig_fails_exec_setup_after_a_valid_resize() {
    let (addr, state) = spawn_server(Config::default()).await;
    let (ticket, _) = state
        .ticket_store
        .issue("not a valid kubeconfig".into(), target(), PeerMeta::default());

    let mut socket = connect(addr, &format!("/exec?ticket={ticket}")).await;
    assert_eq!(next_text_frame(&mut socket).await, serde_json::json!({"type": "ready"}));
    assert_eq!(next_text_frame(&mut socket).await, serde_json::json!({"type": "authed"}));

    socket
        .send(WsMessage::text(r#"{"type":"resize","cols":80,"rows":24}"#))
        .await
        .expect("send resize");

    // `exec::client_from_kubeconfig` fails to parse the bogus kubeconfig
    // before any shell-candidate attach is attempted, so this closes with
    // the "exec setup failed" reason rather than "exec attach failed".
    let error = next_text_frame(&mut socket).await;
    assert_eq!(error["type"], serde_json::json!("error"));

    let (code, reason) = next_close(&mut socket).await.expect("close frame");
    assert_eq!(code, 1011);
    assert_eq!(reason, "exec setup failed");
}
