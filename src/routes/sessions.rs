// src/routes/sessions.rs
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde_json::Value;

use crate::{
    error::AppError,
    message::{ActiveSession, CarrierRequest, ExtractRequest, ExtractResponse, PinRequest, PreviewRequest, SessionSummary},
    services::{
        body::BodyNode,
        session_manager::{AppearanceSettings, ChatSession, Protocol, SchemaKind, SessionConfig},
    },
    state::SharedState,
};

async fn find_session(state: &SharedState, id: &str) -> Result<ChatSession, AppError> {
    state
        .sessions
        .get_session(id)
        .await
        .ok_or_else(|| AppError::NotFound(format!("session {id} not found")))
}

pub async fn list_sessions(State(state): State<SharedState>) -> Json<Vec<SessionSummary>> {
    let sessions = state.sessions.list_sessions().await;
    Json(sessions.iter().map(SessionSummary::from).collect())
}

pub async fn create_session(
    State(state): State<SharedState>,
    Json(config): Json<SessionConfig>,
) -> Result<(StatusCode, Json<ChatSession>), AppError> {
    let session = state.sessions.create_session(Some(config)).await?;
    Ok((StatusCode::CREATED, Json(session)))
}

pub async fn get_session(State(state): State<SharedState>, Path(id): Path<String>) -> Result<Json<ChatSession>, AppError> {
    Ok(Json(find_session(&state, &id).await?))
}

/// Replace-on-save. A WebSocket session whose endpoint changed is reconnected.
pub async fn update_session(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(config): Json<SessionConfig>,
) -> Result<Json<ChatSession>, AppError> {
    let before = find_session(&state, &id).await?;
    let updated = state.sessions.update_session(&id, config).await?;

    let endpoint_changed =
        before.config.url != updated.config.url || before.config.protocol != updated.config.protocol;
    match updated.config.protocol {
        Protocol::Websocket if endpoint_changed && !updated.config.url.trim().is_empty() => {
            state.ws.connect(&updated).await?;
        }
        Protocol::Websocket => {}
        Protocol::Http => {
            state.ws.disconnect(&id).await;
        }
    }

    Ok(Json(updated))
}

pub async fn delete_session(State(state): State<SharedState>, Path(id): Path<String>) -> Result<StatusCode, AppError> {
    state.sessions.delete_session(&id).await?;
    state.ws.disconnect(&id).await;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn set_pinned(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(payload): Json<PinRequest>,
) -> Result<Json<ChatSession>, AppError> {
    Ok(Json(state.sessions.set_pinned(&id, payload.pinned).await?))
}

pub async fn set_carrier(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(payload): Json<CarrierRequest>,
) -> Result<Json<BodyNode>, AppError> {
    let tree = state.sessions.set_carrier(&id, payload.schema, &payload.node_id).await?;
    if tree.carrier_id().is_none() {
        tracing::warn!(session_id = %id, schema = ?payload.schema, "schema has no carrier");
    }
    Ok(Json(tree))
}

/// Shows the payload a message would be sent as, without sending it.
pub async fn preview_request(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(payload): Json<PreviewRequest>,
) -> Result<Json<Value>, AppError> {
    let session = find_session(&state, &id).await?;
    Ok(Json(session.schema(SchemaKind::Request).materialize(&payload.message)))
}

pub async fn preview_extract(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(payload): Json<ExtractRequest>,
) -> Result<Json<ExtractResponse>, AppError> {
    let session = find_session(&state, &id).await?;
    let content = session.schema(SchemaKind::Response).extract(&payload.data);
    Ok(Json(ExtractResponse { content }))
}

pub async fn get_active(State(state): State<SharedState>) -> Json<ActiveSession> {
    Json(ActiveSession { session_id: state.sessions.active_session_id().await })
}

/// Opening a WebSocket session (re)connects its socket.
pub async fn set_active(
    State(state): State<SharedState>,
    Json(payload): Json<ActiveSession>,
) -> Result<Json<ActiveSession>, AppError> {
    state.sessions.set_active_session(payload.session_id.as_deref()).await?;

    if let Some(id) = payload.session_id.as_deref() {
        let session = find_session(&state, id).await?;
        if session.config.protocol == Protocol::Websocket && !session.config.url.trim().is_empty() {
            state.ws.connect(&session).await?;
        }
    }
    Ok(Json(payload))
}

pub async fn get_settings(State(state): State<SharedState>) -> Json<AppearanceSettings> {
    Json(state.sessions.settings().await)
}

pub async fn update_settings(
    State(state): State<SharedState>,
    Json(settings): Json<AppearanceSettings>,
) -> Result<Json<AppearanceSettings>, AppError> {
    Ok(Json(state.sessions.update_settings(settings).await?))
}
