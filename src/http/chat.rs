use crate::domain::{Citation, SessionStatus};
use crate::error::ApiError;
use crate::CoreState;
use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub user_id: String,
    pub query: String,
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub session_id: String,
    pub answer: String,
    pub citations: Vec<Citation>,
    pub should_escalate: bool,
    pub trace_id: String,
    pub cache_hit: bool,
    pub session_status: SessionStatus,
}

pub async fn post_chat(
    State(state): State<Arc<CoreState>>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let result = state.driver.handle_turn(&req.user_id, &req.query, req.session_id).await?;
    Ok(Json(ChatResponse {
        session_id: result.session_id,
        answer: result.answer,
        citations: result.citations,
        should_escalate: result.should_escalate,
        trace_id: result.trace_id,
        cache_hit: result.cache_hit,
        session_status: result.session_status,
    }))
}
