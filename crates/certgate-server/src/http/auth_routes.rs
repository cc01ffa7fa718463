//! `/api/auth` handlers.

use axum::Json;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;

use super::AppState;
use super::error::ApiError;
use super::extract::{ApiJson, ClientIp};
use crate::auth::{LoginRequest, LoginResponse, LoginScope};

/// `POST /api/auth/login`
pub async fn login(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    ApiJson(req): ApiJson<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    Ok(Json(state.login.login(&ip, &req, LoginScope::Any).await?))
}

/// `POST /api/auth/login/tenant`
pub async fn login_tenant(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    ApiJson(req): ApiJson<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    Ok(Json(
        state.login.login(&ip, &req, LoginScope::TenantOnly).await?,
    ))
}

/// `POST /api/auth/logout`
pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    let token = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().strip_prefix("Bearer ").unwrap_or(v).trim())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::unauthorized("login required"))?;

    state.tokens.invalidate(token).await.map_err(|e| {
        tracing::debug!(error = %e, "Logout with unusable token");
        ApiError::unauthorized("Invalid or expired token")
    })?;
    tracing::info!("Token invalidated");
    Ok(Json(serde_json::json!({ "logged_out": true })))
}
