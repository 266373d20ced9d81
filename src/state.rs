// src/state.rs
use std::sync::Arc;

use crate::config::Config;
use crate::services::chat::ChatService;
use crate::services::http_transport::{HttpTransport, TransportError};
use crate::services::log_manager::LogManager;
use crate::services::session_manager::SessionManager;
use crate::services::store::{StateStore, StoreError};
use crate::services::ws_manager::WsManager;

pub type SharedState = Arc<AppState>;

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("could not build HTTP client: {0}")]
    Http(#[from] TransportError),
}

pub struct AppState {
    pub sessions: SessionManager,
    pub logs: LogManager,
    pub ws: WsManager,
    pub chat: ChatService,
    pub api_key: Option<String>,
}

impl AppState {
    /// Hydrates sessions from `store` and wires the transports around them.
    pub async fn new(config: &Config, store: Arc<dyn StateStore>) -> Result<Self, StartupError> {
        let sessions = SessionManager::load(store).await?;
        let logs = LogManager::new(config.log_capacity);
        let ws = WsManager::new(sessions.clone(), logs.clone());
        let http = HttpTransport::new(config.request_timeout)?;
        let chat = ChatService::new(sessions.clone(), http, ws.clone(), logs.clone());

        Ok(Self { sessions, logs, ws, chat, api_key: config.api_key.clone() })
    }
}
