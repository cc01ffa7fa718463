//! `/api/me` handlers.

use axum::Json;
use axum::extract::State;
use serde::{Deserialize, Serialize};

use super::AppState;
use super::error::ApiError;
use super::extract::{ApiJson, CurrentUser};
use crate::auth::accounts;
use crate::auth::otp::OtpEnrollment;
use crate::storage::User;

/// A user as shown to clients, with whether a second factor is set.
#[derive(Debug, Serialize)]
pub struct UserView {
    #[serde(flatten)]
    pub user: User,
    pub otp: bool,
}

impl From<User> for UserView {
    fn from(user: User) -> Self {
        let otp = user.has_otp();
        Self { user, otp }
    }
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordBody {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyOtpBody {
    pub secret: String,
    pub code: String,
}

/// `GET /api/me`
pub async fn me(CurrentUser(user): CurrentUser) -> Json<UserView> {
    Json(user.into())
}

/// `POST /api/me/password`
pub async fn change_password(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ApiJson(body): ApiJson<ChangePasswordBody>,
) -> Result<Json<User>, ApiError> {
    let updated = accounts::change_password(
        &state.db,
        &user,
        &body.current_password,
        &body.new_password,
    )
    .await?;
    Ok(Json(updated))
}

/// `POST /api/me/2fa/generate`: a fresh secret to load into an authenticator.
pub async fn generate_otp(
    CurrentUser(user): CurrentUser,
) -> Result<Json<OtpEnrollment>, ApiError> {
    Ok(Json(accounts::begin_otp_enrollment(&user)?))
}

/// `POST /api/me/2fa/verify`: enable 2FA once a code from `secret` checks out.
pub async fn verify_otp(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ApiJson(body): ApiJson<VerifyOtpBody>,
) -> Result<Json<UserView>, ApiError> {
    let updated = accounts::confirm_otp(&state.db, &user, &body.secret, &body.code).await?;
    Ok(Json(updated.into()))
}
