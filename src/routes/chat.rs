use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};

use crate::{
    error::AppError,
    message::{ChatRequest, SessionStatus},
    services::{chat::SendOutcome, session_manager::Message, ws_manager::ConnectionState},
    state::SharedState,
};

pub async fn chat_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(payload): Json<ChatRequest>,
) -> Result<Json<SendOutcome>, AppError> {
    let outcome = state.chat.send_message(&id, &payload.message).await?;
    Ok(Json(outcome))
}

pub async fn get_history(State(state): State<SharedState>, Path(id): Path<String>) -> Result<Json<Vec<Message>>, AppError> {
    state
        .sessions
        .get_history(&id)
        .await
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("session {id} not found")))
}

pub async fn clear_history(State(state): State<SharedState>, Path(id): Path<String>) -> Result<StatusCode, AppError> {
    state.sessions.clear_history(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn connect(State(state): State<SharedState>, Path(id): Path<String>) -> Result<Json<SessionStatus>, AppError> {
    let session = state
        .sessions
        .get_session(&id)
        .await
        .ok_or_else(|| AppError::NotFound(format!("session {id} not found")))?;
    let connection = state.ws.connect(&session).await?;
    let exchange = state.chat.exchange_state(&id).await;
    Ok(Json(SessionStatus { session_id: id, exchange, connection }))
}

pub async fn disconnect(State(state): State<SharedState>, Path(id): Path<String>) -> Json<SessionStatus> {
    state.ws.disconnect(&id).await;
    let exchange = state.chat.exchange_state(&id).await;
    Json(SessionStatus { session_id: id, exchange, connection: ConnectionState::Disconnected })
}

pub async fn status(State(state): State<SharedState>, Path(id): Path<String>) -> Result<Json<SessionStatus>, AppError> {
    if state.sessions.get_session(&id).await.is_none() {
        return Err(AppError::NotFound(format!("session {id} not found")));
    }
    Ok(Json(SessionStatus {
        exchange: state.chat.exchange_state(&id).await,
        connection: state.ws.state(&id).await,
        session_id: id,
    }))
}
