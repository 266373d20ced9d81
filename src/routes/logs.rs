use axum::{Json, extract::State, http::StatusCode};

use crate::{services::log_manager::LogEntry, state::SharedState};

pub async fn get_logs(State(state): State<SharedState>) -> Json<Vec<LogEntry>> {
    Json(state.logs.entries().await)
}

pub async fn clear_logs(State(state): State<SharedState>) -> StatusCode {
    state.logs.clear().await;
    StatusCode::NO_CONTENT
}
