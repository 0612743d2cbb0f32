use crate::domain::{Message, SessionMeta, SessionStatus};
use crate::error::ApiError;
use crate::CoreState;
use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    pub user_id: String,
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreateSessionResponse {
    pub session_id: String,
    pub status: SessionStatus,
    pub created_at: chrono::DateTime<Utc>,
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

pub async fn create_session(
    State(state): State<Arc<CoreState>>,
    Json(req): Json<CreateSessionRequest>,
) -> Result<(axum::http::StatusCode, Json<CreateSessionResponse>), ApiError> {
    if req.user_id.trim().is_empty() {
        return Err(ApiError::bad_request("user_id is required"));
    }

    let sid = req
        .session_id
        .unwrap_or_else(|| crate::ids::generate_readable_session_id(&req.user_id, Utc::now()));

    if let Some(existing) = state
        .session_store
        .read_meta(&sid)
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?
    {
        if existing.user_id != req.user_id {
            return Err(ApiError::conflict("session id already belongs to another user"));
        }
        return Ok((
            axum::http::StatusCode::CREATED,
            Json(CreateSessionResponse {
                session_id: existing.session_id,
                status: existing.status,
                created_at: existing.created_at,
                user_id: existing.user_id,
                summary: existing.summary,
            }),
        ));
    }

    let meta = SessionMeta::new(sid.clone(), req.user_id.clone(), Utc::now());
    state.session_store.write_meta(&meta).await.map_err(|e| ApiError::internal(e.to_string()))?;
    state
        .session_store
        .register(&req.user_id, &sid)
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?;

    Ok((
        axum::http::StatusCode::CREATED,
        Json(CreateSessionResponse {
            session_id: meta.session_id,
            status: meta.status,
            created_at: meta.created_at,
            user_id: meta.user_id,
            summary: meta.summary,
        }),
    ))
}

#[derive(Debug, Deserialize)]
pub struct ListSessionsQuery {
    pub user_id: String,
    pub limit: Option<i64>,
    pub include_closed: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct ListSessionsResponse {
    pub sessions: Vec<SessionMeta>,
}

pub async fn list_sessions(
    State(state): State<Arc<CoreState>>,
    Query(q): Query<ListSessionsQuery>,
) -> Result<Json<ListSessionsResponse>, ApiError> {
    if q.user_id.trim().is_empty() {
        return Err(ApiError::bad_request("user_id is required"));
    }

    let mut sessions = state
        .session_store
        .list_user_sessions(&q.user_id)
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?;

    if q.include_closed.unwrap_or(false) {
        if let Some(archival) = &state.archival_store {
            let closed = archival
                .list_closed_sessions(&q.user_id, q.limit)
                .await
                .map_err(|e| ApiError::internal(e.to_string()))?;
            sessions.extend(closed);
        }
    }

    sessions.sort_by(|a, b| b.last_updated.cmp(&a.last_updated));
    if let Some(limit) = q.limit {
        sessions.truncate(limit.max(0) as usize);
    }

    Ok(Json(ListSessionsResponse { sessions }))
}

#[derive(Debug, Deserialize)]
pub struct GetMessagesQuery {
    pub user_id: String,
    pub limit: Option<usize>,
    pub cursor: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct GetMessagesResponse {
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

pub async fn get_messages(
    State(state): State<Arc<CoreState>>,
    Path(sid): Path<String>,
    Query(q): Query<GetMessagesQuery>,
) -> Result<Json<GetMessagesResponse>, ApiError> {
    if let Some(meta) = state.session_store.read_meta(&sid).await.map_err(|e| ApiError::internal(e.to_string()))? {
        if meta.user_id != q.user_id {
            return Err(ApiError::unauthorized("session does not belong to this user"));
        }

        let all = state
            .session_store
            .all_messages(&sid, None)
            .await
            .map_err(|e| ApiError::internal(e.to_string()))?;

        let start = match &q.cursor {
            Some(c) => c.parse::<usize>().map_err(|_| ApiError::bad_request("malformed cursor"))?,
            None => 0,
        };
        let limit = q.limit.unwrap_or(all.len()).max(1);
        let end = (start + limit).min(all.len());
        let page = all.get(start..end).unwrap_or_default().to_vec();
        let next_cursor = if end < all.len() { Some(end.to_string()) } else { None };

        return Ok(Json(GetMessagesResponse { messages: page, next_cursor }));
    }

    let Some(archival) = &state.archival_store else {
        return Err(ApiError::not_found("unknown session"));
    };
    let closed = archival
        .get_closed_session(&sid)
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?
        .ok_or_else(|| ApiError::not_found("unknown session"))?;
    if closed.user_id != q.user_id {
        return Err(ApiError::unauthorized("session does not belong to this user"));
    }

    let cursor = match &q.cursor {
        Some(c) => Some(c.parse::<i64>().map_err(|_| ApiError::bad_request("malformed cursor"))?),
        None => None,
    };
    let (messages, next_cursor) = archival
        .get_archived_messages(&sid, q.limit.map(|l| l as i64), cursor)
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?;

    Ok(Json(GetMessagesResponse { messages, next_cursor: next_cursor.map(|c| c.to_string()) }))
}

#[derive(Debug, Deserialize)]
pub struct CloseSessionQuery {
    pub user_id: String,
}

#[derive(Debug, Deserialize)]
pub struct CloseSessionBody {
    pub summary: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

pub async fn close_session(
    State(state): State<Arc<CoreState>>,
    Path(sid): Path<String>,
    Query(q): Query<CloseSessionQuery>,
    body: Option<Json<CloseSessionBody>>,
) -> Result<axum::http::StatusCode, ApiError> {
    let body = body.map(|Json(b)| b).unwrap_or(CloseSessionBody { summary: None, metadata: None });
    state.driver.close_session(&sid, &q.user_id, body.summary, body.metadata).await?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}
