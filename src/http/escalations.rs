use crate::domain::{Message, Role, SessionMeta, SessionStatus};
use crate::error::ApiError;
use crate::CoreState;
use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct ListEscalationsQuery {
    pub agent_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ListEscalationsResponse {
    pub sessions: Vec<SessionMeta>,
}

pub async fn list_escalations(
    State(state): State<Arc<CoreState>>,
    Query(q): Query<ListEscalationsQuery>,
) -> Result<Json<ListEscalationsResponse>, ApiError> {
    let mut sessions =
        state.session_store.list_escalations().await.map_err(|e| ApiError::internal(e.to_string()))?;

    if let Some(agent_id) = &q.agent_id {
        let claimed = state
            .session_store
            .list_agent_sessions(agent_id)
            .await
            .map_err(|e| ApiError::internal(e.to_string()))?;
        for meta in claimed {
            if !sessions.iter().any(|s| s.session_id == meta.session_id) {
                sessions.push(meta);
            }
        }
    }

    Ok(Json(ListEscalationsResponse { sessions }))
}

#[derive(Debug, Deserialize)]
pub struct ClaimRequest {
    pub agent_id: String,
}

pub async fn claim(
    State(state): State<Arc<CoreState>>,
    Path(sid): Path<String>,
    Json(req): Json<ClaimRequest>,
) -> Result<Json<SessionMeta>, ApiError> {
    let mut meta = state
        .session_store
        .read_meta(&sid)
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?
        .ok_or_else(|| ApiError::not_found("unknown session"))?;

    if !matches!(meta.status, SessionStatus::PendingHandoff | SessionStatus::LiveAgent) {
        return Err(ApiError::conflict("session is not awaiting an agent"));
    }
    if !meta.status.can_transition_to(SessionStatus::LiveAgent) {
        return Err(ApiError::conflict("illegal state transition"));
    }

    let now = Utc::now();
    meta.status = SessionStatus::LiveAgent;
    meta.agent_id = Some(req.agent_id.clone());
    meta.claimed_at = Some(now);
    meta.last_updated = now;

    state.session_store.write_meta(&meta).await.map_err(|e| ApiError::internal(e.to_string()))?;
    state
        .session_store
        .dequeue_escalation(&sid)
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?;
    state
        .session_store
        .assign_agent(&sid, &req.agent_id)
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?;

    Ok(Json(meta))
}

#[derive(Debug, Deserialize)]
pub struct AgentMessageRequest {
    pub agent_id: String,
    pub content: String,
}

pub async fn post_agent_message(
    State(state): State<Arc<CoreState>>,
    Path(sid): Path<String>,
    Json(req): Json<AgentMessageRequest>,
) -> Result<Json<SessionMeta>, ApiError> {
    let mut meta = state
        .session_store
        .read_meta(&sid)
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?
        .ok_or_else(|| ApiError::not_found("unknown session"))?;

    if let Some(owner) = &meta.agent_id {
        if owner != &req.agent_id {
            return Err(ApiError::unauthorized("another agent owns this session"));
        }
    }

    let now = Utc::now();
    state
        .session_store
        .append_message(&sid, &Message { role: Role::Agent, content: req.content, created_at: now })
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?;

    meta.message_count += 1;
    meta.last_agent_message_at = Some(now);
    meta.last_updated = now;
    state.session_store.write_meta(&meta).await.map_err(|e| ApiError::internal(e.to_string()))?;
    state.session_store.touch(&sid).await.map_err(|e| ApiError::internal(e.to_string()))?;

    Ok(Json(meta))
}
