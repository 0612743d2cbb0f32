use crate::error::ApiError;
use crate::CoreState;
use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// **(supplement)** see `crate::auth` — agent login is additive, not part
/// of `spec.md`'s §6 HTTP surface.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub passcode: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub agent_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
}

pub async fn login(
    State(state): State<Arc<CoreState>>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let Some(agent_auth) = &state.agent_auth else {
        return Err(ApiError::not_found("agent authentication is not configured"));
    };

    let profile = agent_auth
        .verify(&req.email, &req.passcode)
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?
        .ok_or_else(|| ApiError::unauthorized("invalid credentials"))?;

    Ok(Json(LoginResponse {
        agent_id: profile.agent_id,
        first_name: profile.first_name,
        last_name: profile.last_name,
    }))
}
