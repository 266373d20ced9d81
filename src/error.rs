// src/error.rs
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::services::{
    chat::ChatError, http_transport::TransportError, session_manager::SessionError, store::StoreError,
    ws_manager::WsError,
};

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    NotConnected(String),
    #[error("{0}")]
    Upstream(String),
    #[error("storage failure: {0}")]
    Storage(#[from] StoreError),
    #[error("{0}")]
    Internal(String),
}

impl From<SessionError> for AppError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::NotFound(_) => AppError::NotFound(e.to_string()),
            SessionError::Store(e) => AppError::Storage(e),
        }
    }
}

impl From<TransportError> for AppError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::InvalidHeader(_) => AppError::BadRequest(e.to_string()),
            _ => AppError::Upstream(format!("Request failed: {e}")),
        }
    }
}

impl From<WsError> for AppError {
    fn from(e: WsError) -> Self {
        match e {
            WsError::NotConnected => AppError::NotConnected(e.to_string()),
            WsError::MissingUrl | WsError::Encode(_) => AppError::BadRequest(e.to_string()),
        }
    }
}

impl From<ChatError> for AppError {
    fn from(e: ChatError) -> Self {
        match e {
            ChatError::EmptyMessage | ChatError::MissingUrl => AppError::BadRequest(e.to_string()),
            ChatError::Session(e) => e.into(),
            ChatError::Transport(e) => e.into(),
            ChatError::Socket(e) => e.into(),
            ChatError::Task(_) => AppError::Internal(e.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::NotConnected(_) => StatusCode::CONFLICT,
            AppError::Upstream(_) => StatusCode::BAD_GATEWAY,
            AppError::Storage(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
