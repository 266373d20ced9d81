// src/services/chat.rs
use std::{collections::HashMap, sync::Arc};

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio::task::JoinError;

use super::http_transport::{HttpExchange, HttpTransport, TransportError};
use super::log_manager::{LogKind, LogManager};
use super::session_manager::{ChatSession, Message, MessageRole, Protocol, SessionError, SessionManager};
use super::ws_manager::{ConnectionState, WsError, WsManager};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExchangeState {
    #[default]
    Idle,
    Sending,
}

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("Message cannot be empty")]
    EmptyMessage,
    #[error("session has no endpoint url")]
    MissingUrl,
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Socket(#[from] WsError),
    #[error("exchange task failed: {0}")]
    Task(#[from] JoinError),
}

#[derive(Debug, Clone, Serialize)]
pub struct SendOutcome {
    pub user_message: Message,
    /// Only set for HTTP sessions; socket replies arrive on their own.
    pub bot_message: Option<Message>,
    pub exchange: Option<HttpExchange>,
}

/// Drives one user send through the session's transport.
#[derive(Debug, Clone)]
pub struct ChatService {
    sessions: SessionManager,
    http: HttpTransport,
    ws: WsManager,
    logs: LogManager,
    // In-flight HTTP requests per session.
    in_flight: Arc<RwLock<HashMap<String, usize>>>,
}

impl ChatService {
    pub fn new(sessions: SessionManager, http: HttpTransport, ws: WsManager, logs: LogManager) -> Self {
        Self { sessions, http, ws, logs, in_flight: Arc::new(RwLock::new(HashMap::new())) }
    }

    pub async fn exchange_state(&self, session_id: &str) -> ExchangeState {
        match self.in_flight.read().await.get(session_id) {
            Some(_) => ExchangeState::Sending,
            None => ExchangeState::Idle,
        }
    }

    async fn begin_exchange(&self, session_id: &str) {
        *self.in_flight.write().await.entry(session_id.to_string()).or_default() += 1;
    }

    async fn end_exchange(&self, session_id: &str) {
        let mut guard = self.in_flight.write().await;
        if let Some(count) = guard.get_mut(session_id) {
            *count -= 1;
            if *count == 0 {
                guard.remove(session_id);
            }
        }
    }

    pub async fn send_message(&self, session_id: &str, text: &str) -> Result<SendOutcome, ChatError> {
        if text.trim().is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        let session = self
            .sessions
            .get_session(session_id)
            .await
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))?;
        if session.config.url.trim().is_empty() {
            return Err(ChatError::MissingUrl);
        }

        match session.config.protocol {
            Protocol::Websocket => {
                if self.ws.state(session_id).await != ConnectionState::Connected {
                    return Err(WsError::NotConnected.into());
                }
                let user_message = self.ws.send(&session, text).await?;
                Ok(SendOutcome { user_message, bot_message: None, exchange: None })
            }
            Protocol::Http => {
                let raw_request = session.config.request_body.materialize(text);
                let user_message = Message::new(MessageRole::User, text).with_raw_request(raw_request.clone());
                self.sessions.append_message(session_id, user_message.clone()).await?;
                self.logs
                    .record(
                        LogKind::Request,
                        Some(session_id),
                        format!("{} {}", session.config.method.as_str(), session.config.url),
                        Some(raw_request),
                    )
                    .await;

                // Runs detached: a caller that goes away does not cancel the
                // request, and the reply still lands in history.
                self.begin_exchange(session_id).await;
                let task = tokio::spawn(self.clone().complete_exchange(session, text.to_string()));
                let (exchange, bot_message) = task.await??;

                Ok(SendOutcome { user_message, bot_message: Some(bot_message), exchange: Some(exchange) })
            }
        }
    }

    async fn complete_exchange(self, session: ChatSession, text: String) -> Result<(HttpExchange, Message), ChatError> {
        let session_id = session.id.as_str();
        let result = self.http.send(&session, &text).await;
        self.end_exchange(session_id).await;

        let exchange = match result {
            Ok(exchange) => exchange,
            Err(e) => {
                tracing::warn!(session_id = %session_id, error = %e, "request failed");
                self.logs
                    .record(LogKind::Error, Some(session_id), format!("Request failed: {e}"), None)
                    .await;
                return Err(e.into());
            }
        };
        self.logs
            .record(LogKind::Response, Some(session_id), "Response received", Some(exchange.response.clone()))
            .await;

        let bot_message = Message::new(MessageRole::Bot, exchange.extracted.clone())
            .with_raw_request(serde_json::to_value(&exchange.request).unwrap_or_default())
            .with_raw_response(exchange.response.clone());
        self.sessions.append_message(session_id, bot_message.clone()).await?;

        Ok((exchange, bot_message))
    }
}
