use chatbot_postman::config::Config;
use chatbot_postman::services::body::{BodyNode, Property};
use chatbot_postman::services::chat::ChatError;
use chatbot_postman::services::session_manager::{Message, MessageRole, Protocol, SessionConfig};
use chatbot_postman::services::store::MemoryStore;
use chatbot_postman::services::ws_manager::{ConnectionState, WsError};
use chatbot_postman::state::AppState;

use axum::Router;
use axum::extract::ws::{Message as WsFrame, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use axum::routing::get;
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::sleep;

/// Greets with a plain text frame, then answers every JSON frame.
async fn upstream_socket(mut socket: WebSocket) {
    if socket.send(WsFrame::Text("welcome".to_string().into())).await.is_err() {
        return;
    }
    while let Some(Ok(frame)) = socket.recv().await {
        let WsFrame::Text(text) = frame else { continue };
        let body: Value = serde_json::from_str(text.as_str()).unwrap_or(Value::Null);
        if body["text"] == "bye" {
            let _ = socket.send(WsFrame::Close(None)).await;
            return;
        }
        let reply = json!({"data": {"reply": format!("you said {}", body["text"].as_str().unwrap_or(""))}});
        if socket.send(WsFrame::Text(reply.to_string().into())).await.is_err() {
            return;
        }
    }
}

async fn ws_handler(ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(upstream_socket)
}

/// Pushes a "tick" frame every few milliseconds until the peer goes away.
async fn ticker_handler(ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(|mut socket: WebSocket| async move {
        while socket.send(WsFrame::Text("tick".to_string().into())).await.is_ok() {
            sleep(Duration::from_millis(5)).await;
        }
    })
}

async fn spawn_upstream() -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = Router::new().route("/ws", get(ws_handler)).route("/ticker", get(ticker_handler));
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

async fn state() -> AppState {
    AppState::new(&Config::default(), Arc::new(MemoryStore::new())).await.unwrap()
}

fn ws_config(url: String) -> SessionConfig {
    SessionConfig {
        url,
        protocol: Protocol::Websocket,
        request_body: BodyNode::object(vec![Property::new("text", BodyNode::carrier())]),
        response_body_mapping: BodyNode::object(vec![Property::new(
            "data",
            BodyNode::object(vec![Property::new("reply", BodyNode::carrier())]),
        )]),
        ..SessionConfig::default()
    }
}

async fn wait_for_state(state: &AppState, id: &str, expected: ConnectionState) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while state.ws.state(id).await != expected {
        assert!(Instant::now() < deadline, "socket never reached {expected:?}");
        sleep(Duration::from_millis(20)).await;
    }
}

async fn wait_for_history(state: &AppState, id: &str, len: usize) -> Vec<Message> {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let history = state.sessions.get_history(id).await.unwrap();
        if history.len() >= len {
            return history;
        }
        assert!(Instant::now() < deadline, "history stuck at {} messages", history.len());
        sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn test_inbound_frames_become_bot_messages() {
    let addr = spawn_upstream().await;
    let state = state().await;
    let session = state.sessions.create_session(Some(ws_config(format!("ws://{addr}/ws")))).await.unwrap();

    state.ws.connect(&session).await.unwrap();
    wait_for_state(&state, &session.id, ConnectionState::Connected).await;

    // The greeting is not JSON, so the raw text is kept and passed through.
    let history = wait_for_history(&state, &session.id, 1).await;
    assert_eq!(history[0].role, MessageRole::Bot);
    assert_eq!(history[0].content, "welcome");
    assert_eq!(history[0].raw_response, Some(json!("welcome")));

    let outcome = state.chat.send_message(&session.id, "hello").await.unwrap();
    assert!(outcome.bot_message.is_none());
    assert_eq!(outcome.user_message.raw_request, Some(json!({"text": "hello"})));

    let history = wait_for_history(&state, &session.id, 3).await;
    assert_eq!(history[1].role, MessageRole::User);
    assert_eq!(history[2].role, MessageRole::Bot);
    assert_eq!(history[2].content, "you said hello");
}

#[tokio::test]
async fn test_remote_close_disconnects() {
    let addr = spawn_upstream().await;
    let state = state().await;
    let session = state.sessions.create_session(Some(ws_config(format!("ws://{addr}/ws")))).await.unwrap();

    state.ws.connect(&session).await.unwrap();
    wait_for_state(&state, &session.id, ConnectionState::Connected).await;

    wait_for_history(&state, &session.id, 1).await;
    state.chat.send_message(&session.id, "bye").await.unwrap();
    wait_for_state(&state, &session.id, ConnectionState::Disconnected).await;

    let history = state.sessions.get_history(&session.id).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[1].content, "bye");

    let err = state.chat.send_message(&session.id, "anyone?").await.unwrap_err();
    assert!(matches!(err, ChatError::Socket(WsError::NotConnected)));
    assert_eq!(state.sessions.get_history(&session.id).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_replaced_socket_stops_delivering() {
    let addr = spawn_upstream().await;
    let state = state().await;
    let session = state.sessions.create_session(Some(ws_config(format!("ws://{addr}/ticker")))).await.unwrap();

    state.ws.connect(&session).await.unwrap();
    wait_for_state(&state, &session.id, ConnectionState::Connected).await;
    wait_for_history(&state, &session.id, 3).await;

    let updated = state.sessions.update_session(&session.id, ws_config(format!("ws://{addr}/ws"))).await.unwrap();
    state.ws.connect(&updated).await.unwrap();
    wait_for_state(&state, &session.id, ConnectionState::Connected).await;
    sleep(Duration::from_millis(100)).await;

    let count_ticks = |history: &[Message]| history.iter().filter(|m| m.content == "tick").count();
    let ticks = count_ticks(&state.sessions.get_history(&session.id).await.unwrap());
    sleep(Duration::from_millis(200)).await;
    let history = state.sessions.get_history(&session.id).await.unwrap();
    assert_eq!(count_ticks(&history), ticks);
    assert!(history.iter().any(|m| m.content == "welcome"));
}

#[tokio::test]
async fn test_connect_failure_is_reported() {
    // Grab a free port and release it so nothing is listening there.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let state = state().await;
    let session = state.sessions.create_session(Some(ws_config(format!("ws://{addr}/ws")))).await.unwrap();

    assert_eq!(state.ws.connect(&session).await.unwrap(), ConnectionState::Connecting);
    wait_for_state(&state, &session.id, ConnectionState::Disconnected).await;

    let logs = state.logs.entries().await;
    assert!(logs.iter().any(|l| l.message.starts_with("WebSocket connection error")));
}

#[tokio::test]
async fn test_manual_disconnect() {
    let addr = spawn_upstream().await;
    let state = state().await;
    let session = state.sessions.create_session(Some(ws_config(format!("ws://{addr}/ws")))).await.unwrap();

    state.ws.connect(&session).await.unwrap();
    wait_for_state(&state, &session.id, ConnectionState::Connected).await;
    assert_eq!(state.ws.connect(&session).await.unwrap(), ConnectionState::Connected);

    assert!(state.ws.disconnect(&session.id).await);
    assert_eq!(state.ws.state(&session.id).await, ConnectionState::Disconnected);
    assert!(!state.ws.disconnect(&session.id).await);
}

#[tokio::test]
async fn test_missing_url_is_rejected() {
    let state = state().await;
    let session = state.sessions.create_session(Some(ws_config(String::new()))).await.unwrap();
    assert!(matches!(state.ws.connect(&session).await, Err(WsError::MissingUrl)));
}
