// src/services/ws_manager.rs
//! One long-lived WebSocket per session. Reconnection is always explicit.

use std::{collections::HashMap, sync::Arc};

use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{RwLock, mpsc};
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};
use uuid::Uuid;

use super::log_manager::{LogKind, LogManager};
use super::session_manager::{ChatSession, Message, MessageRole, SessionManager};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug, thiserror::Error)]
pub enum WsError {
    #[error("WebSocket is not connected")]
    NotConnected,
    #[error("session has no WebSocket url")]
    MissingUrl,
    #[error("could not encode frame: {0}")]
    Encode(#[from] serde_json::Error),
}

/// A queued frame and the user message it records once written.
#[derive(Debug)]
struct Outbound {
    frame: String,
    message: Message,
}

#[derive(Debug)]
struct Connection {
    connection_id: Uuid,
    url: String,
    state: ConnectionState,
    outbound: mpsc::UnboundedSender<Outbound>,
}

#[derive(Clone, Debug)]
pub struct WsManager {
    connections: Arc<RwLock<HashMap<String, Connection>>>,
    sessions: SessionManager,
    logs: LogManager,
}

impl WsManager {
    pub fn new(sessions: SessionManager, logs: LogManager) -> Self {
        Self { connections: Arc::new(RwLock::new(HashMap::new())), sessions, logs }
    }

    /// Opens a socket for the session, replacing any previous one.
    ///
    /// A live connection to the same url is left untouched.
    pub async fn connect(&self, session: &ChatSession) -> Result<ConnectionState, WsError> {
        let url = session.config.url.trim().to_string();
        if url.is_empty() {
            return Err(WsError::MissingUrl);
        }

        let mut connections = self.connections.write().await;
        if let Some(existing) = connections.get(&session.id) {
            if existing.url == url && existing.state != ConnectionState::Disconnected {
                return Ok(existing.state);
            }
        }

        let (outbound, rx) = mpsc::unbounded_channel();
        let connection_id = Uuid::new_v4();
        // Replacing the entry drops the old sender, which closes the old socket.
        connections.insert(
            session.id.clone(),
            Connection { connection_id, url: url.clone(), state: ConnectionState::Connecting, outbound },
        );
        tokio::spawn(self.clone().run(session.id.clone(), connection_id, url, rx));

        Ok(ConnectionState::Connecting)
    }

    /// Closes the session's socket. Returns whether one existed.
    pub async fn disconnect(&self, session_id: &str) -> bool {
        self.connections.write().await.remove(session_id).is_some()
    }

    pub async fn state(&self, session_id: &str) -> ConnectionState {
        self.connections.read().await.get(session_id).map(|c| c.state).unwrap_or_default()
    }

    /// Materializes the request body and queues it as a JSON text frame.
    ///
    /// The returned user message is appended to history by the socket task
    /// after the frame is written, so it always precedes the reply and is
    /// never recorded for a frame that did not go out.
    pub async fn send(&self, session: &ChatSession, text: &str) -> Result<Message, WsError> {
        let connections = self.connections.read().await;
        let connection = connections
            .get(&session.id)
            .filter(|c| c.state == ConnectionState::Connected)
            .ok_or(WsError::NotConnected)?;

        let body = session.config.request_body.materialize(text);
        let frame = serde_json::to_string(&body)?;
        let message = Message::new(MessageRole::User, text).with_raw_request(body);
        connection
            .outbound
            .send(Outbound { frame, message: message.clone() })
            .map_err(|_| WsError::NotConnected)?;
        Ok(message)
    }

    async fn is_current(&self, session_id: &str, connection_id: Uuid) -> bool {
        self.connections.read().await.get(session_id).is_some_and(|c| c.connection_id == connection_id)
    }

    async fn set_state(&self, session_id: &str, connection_id: Uuid, state: ConnectionState) {
        let mut connections = self.connections.write().await;
        if let Some(conn) = connections.get_mut(session_id).filter(|c| c.connection_id == connection_id) {
            conn.state = state;
        }
    }

    async fn run(self, session_id: String, connection_id: Uuid, url: String, mut outbound: mpsc::UnboundedReceiver<Outbound>) {
        let socket = match connect_async(url.as_str()).await {
            Ok((socket, _)) => socket,
            Err(e) => {
                tracing::warn!(session_id = %session_id, url = %url, error = %e, "WebSocket connect failed");
                self.logs
                    .record(LogKind::Error, Some(&session_id), format!("WebSocket connection error: {e}"), None)
                    .await;
                self.set_state(&session_id, connection_id, ConnectionState::Disconnected).await;
                return;
            }
        };

        self.set_state(&session_id, connection_id, ConnectionState::Connected).await;
        self.logs.record(LogKind::Info, Some(&session_id), format!("WebSocket connected to {url}"), None).await;
        tracing::info!(session_id = %session_id, url = %url, "WebSocket connected");

        let (mut sink, mut stream) = socket.split();
        loop {
            // A replaced connection drops its sender; see that before reading more frames.
            tokio::select! {
                biased;
                queued = outbound.recv() => match queued {
                    Some(Outbound { frame, message }) => {
                        if let Err(e) = sink.send(WsMessage::Text(frame.into())).await {
                            self.report_failure(&session_id, format!("WebSocket send failed: {e}")).await;
                            break;
                        }
                        self.record_sent(&session_id, message).await;
                    }
                    None => {
                        let _ = sink.close().await;
                        break;
                    }
                },
                inbound = stream.next() => match inbound {
                    Some(Ok(WsMessage::Text(text))) => self.handle_inbound(&session_id, connection_id, text.as_str()).await,
                    Some(Ok(WsMessage::Binary(bytes))) => match std::str::from_utf8(&bytes) {
                        Ok(text) => self.handle_inbound(&session_id, connection_id, text).await,
                        Err(_) => tracing::debug!(session_id = %session_id, "ignoring non UTF-8 binary frame"),
                    },
                    Some(Ok(WsMessage::Close(_))) | None => {
                        self.logs.record(LogKind::Info, Some(&session_id), "WebSocket closed", None).await;
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        self.report_failure(&session_id, format!("WebSocket error: {e}")).await;
                        break;
                    }
                },
            }
        }

        self.set_state(&session_id, connection_id, ConnectionState::Disconnected).await;
        tracing::info!(session_id = %session_id, "WebSocket disconnected");
    }

    async fn report_failure(&self, session_id: &str, message: String) {
        tracing::warn!(session_id = %session_id, "{message}");
        self.logs.record(LogKind::Error, Some(session_id), message, None).await;
    }

    async fn record_sent(&self, session_id: &str, message: Message) {
        self.logs
            .record(LogKind::Request, Some(session_id), "WebSocket frame sent", message.raw_request.clone())
            .await;
        if let Err(e) = self.sessions.append_message(session_id, message).await {
            tracing::error!(session_id = %session_id, error = %e, "failed to store sent message");
        }
    }

    // Decode, extract with the session's current mapping, append as a bot message.
    async fn handle_inbound(&self, session_id: &str, connection_id: Uuid, text: &str) {
        if !self.is_current(session_id, connection_id).await {
            tracing::debug!(session_id = %session_id, "dropping frame from replaced socket");
            return;
        }
        let data = serde_json::from_str::<Value>(text).unwrap_or_else(|_| Value::String(text.to_string()));

        let Some(session) = self.sessions.get_session(session_id).await else {
            return;
        };
        let content = session.config.response_body_mapping.extract(&data);
        self.logs.record(LogKind::Response, Some(session_id), "WebSocket frame received", Some(data.clone())).await;

        let message = Message::new(MessageRole::Bot, content).with_raw_response(data);
        if let Err(e) = self.sessions.append_message(session_id, message).await {
            tracing::error!(session_id = %session_id, error = %e, "failed to store inbound message");
        }
    }
}
