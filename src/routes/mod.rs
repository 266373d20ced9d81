// src/routes/mod.rs
pub mod chat;
pub mod logs;
pub mod sessions;

use crate::state::SharedState;
use axum::{
    Router,
    extract::{Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::Response,
    routing::{get, post, put},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub fn create_router(state: SharedState) -> Router {
    let api_routes = Router::new()
        .route("/sessions", get(sessions::list_sessions).post(sessions::create_session))
        .route(
            "/sessions/{id}",
            get(sessions::get_session).put(sessions::update_session).delete(sessions::delete_session),
        )
        .route("/sessions/{id}/pin", put(sessions::set_pinned))
        .route("/sessions/{id}/carrier", put(sessions::set_carrier))
        .route("/sessions/{id}/preview", post(sessions::preview_request))
        .route("/sessions/{id}/extract", post(sessions::preview_extract))
        .route(
            "/sessions/{id}/messages",
            get(chat::get_history).post(chat::chat_handler).delete(chat::clear_history),
        )
        .route("/sessions/{id}/connect", post(chat::connect))
        .route("/sessions/{id}/disconnect", post(chat::disconnect))
        .route("/sessions/{id}/status", get(chat::status))
        .route("/active", get(sessions::get_active).put(sessions::set_active))
        .route("/settings", get(sessions::get_settings).put(sessions::update_settings))
        .route("/logs", get(logs::get_logs).delete(logs::clear_logs))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .merge(api_routes)
        .route("/health", get(|| async { "OK" }))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

async fn auth_middleware(State(state): State<SharedState>, req: Request, next: Next) -> Result<Response, StatusCode> {
    // API Key check, only when one is configured.
    let Some(expected) = state.api_key.as_deref() else {
        return Ok(next.run(req).await);
    };
    match req.headers().get("x-api-key") {
        Some(val) if val.as_bytes() == expected.as_bytes() => Ok(next.run(req).await),
        _ => Err(StatusCode::UNAUTHORIZED),
    }
}
