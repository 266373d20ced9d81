// src/message.rs
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::services::{
    chat::ExchangeState,
    session_manager::{ChatSession, SchemaKind},
    ws_manager::ConnectionState,
};

#[derive(Deserialize, Serialize)]
pub struct ChatRequest {
    pub message: String,
}

#[derive(Deserialize, Serialize)]
pub struct PinRequest {
    pub pinned: bool,
}

#[derive(Deserialize, Serialize)]
pub struct CarrierRequest {
    pub schema: SchemaKind,
    /// Node to designate. Unknown ids clear the carrier.
    pub node_id: String,
}

#[derive(Deserialize, Serialize)]
pub struct PreviewRequest {
    pub message: String,
}

#[derive(Deserialize, Serialize)]
pub struct ExtractRequest {
    pub data: Value,
}

#[derive(Deserialize, Serialize)]
pub struct ExtractResponse {
    pub content: String,
}

#[derive(Deserialize, Serialize, Default)]
pub struct ActiveSession {
    pub session_id: Option<String>,
}

#[derive(Serialize, Deserialize)]
pub struct SessionStatus {
    pub session_id: String,
    pub exchange: ExchangeState,
    pub connection: ConnectionState,
}

/// Session summary for listings; history is fetched separately.
#[derive(Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: String,
    pub name: String,
    pub url: String,
    pub protocol: crate::services::session_manager::Protocol,
    pub is_pinned: bool,
    pub message_count: usize,
}

impl From<&ChatSession> for SessionSummary {
    fn from(s: &ChatSession) -> Self {
        Self {
            id: s.id.clone(),
            name: s.config.name.clone(),
            url: s.config.url.clone(),
            protocol: s.config.protocol,
            is_pinned: s.config.is_pinned,
            message_count: s.history.len(),
        }
    }
}
