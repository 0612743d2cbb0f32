pub mod auth;
pub mod chat;
pub mod escalations;
pub mod sessions;

use crate::CoreState;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Thin HTTP adapter (§6): every handler maps a `CoreError` to an
/// `ApiError` via `?` and otherwise just (de)serializes JSON. All
/// orchestration happens below this layer in `ChatDriver`/`Graph`.
pub fn build_router(state: Arc<CoreState>) -> Router {
    Router::new()
        .route("/v1/chat", post(chat::post_chat))
        .route("/v1/sessions", post(sessions::create_session))
        .route("/v1/sessions", get(sessions::list_sessions))
        .route("/v1/sessions/:sid/messages", get(sessions::get_messages))
        .route("/v1/sessions/:sid/close", post(sessions::close_session))
        .route("/v1/escalations", get(escalations::list_escalations))
        .route("/v1/escalations/:sid/claim", post(escalations::claim))
        .route("/v1/escalations/:sid/messages", post(escalations::post_agent_message))
        .route("/v1/auth/login", post(auth::login))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}
