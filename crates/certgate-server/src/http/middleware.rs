//! Auth middleware: identity resolution plus role guards.

use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;

use super::AppState;
use super::error::ApiError;
use super::extract::CurrentUser;
use crate::auth::{AuthPolicy, require_admin, require_non_guest};

/// Resolve the caller and attach [`CurrentUser`] to the request.
pub async fn authenticate(
    State((state, policy)): State<(AppState, AuthPolicy)>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let header = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    let user = state.pipeline.resolve(header, policy).await?;

    req.extensions_mut().insert(CurrentUser(user));
    Ok(next.run(req).await)
}

fn current_user(req: &Request) -> Result<&CurrentUser, ApiError> {
    req.extensions()
        .get::<CurrentUser>()
        .ok_or_else(|| ApiError::unauthorized("login required"))
}

pub async fn non_guest(req: Request, next: Next) -> Result<Response, ApiError> {
    require_non_guest(&current_user(&req)?.0)?;
    Ok(next.run(req).await)
}

pub async fn admin_only(req: Request, next: Next) -> Result<Response, ApiError> {
    require_admin(&current_user(&req)?.0)?;
    Ok(next.run(req).await)
}
