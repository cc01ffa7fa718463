//! `/api/admin` handlers: users, certificates, and certificate requests.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Response;
use certgate_core::{Page, PageRequest};
use serde::Deserialize;

use super::AppState;
use super::error::ApiError;
use super::extract::{ApiJson, ApiPath, ApiQuery, CurrentUser, parse_date};
use super::me_routes::UserView;
use super::tenant_routes::certificate_attachment;
use crate::auth::accounts::{self, NewUser, UserUpdate};
use crate::lifecycle::NewCertificateSpec;
use crate::storage::{Certificate, CertificateRequest, CertificateType, User};

// --- Users ---

/// `GET /api/admin/users`
pub async fn list_users(
    State(state): State<AppState>,
    ApiQuery(page): ApiQuery<PageRequest>,
) -> Result<Json<Page<User>>, ApiError> {
    let policy = state.engine.policy();
    let page = page.clamp(policy.default_page_size, policy.max_page_size);
    let (content, total) = state
        .db
        .list_users(page)
        .await
        .map_err(accounts::AccountError::Storage)?;
    Ok(Json(Page { content, total }))
}

/// `POST /api/admin/users`
pub async fn create_user(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<NewUser>,
) -> Result<(StatusCode, Json<User>), ApiError> {
    let user = accounts::create_user(&state.db, &body).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// `GET /api/admin/users/{id}`
pub async fn get_user(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<UserView>, ApiError> {
    Ok(Json(accounts::get_user(&state.db, id).await?.into()))
}

/// `DELETE /api/admin/users/{id}`: also removes the user's certificates and
/// requests.
pub async fn delete_user(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
) -> Result<StatusCode, ApiError> {
    accounts::delete_user(&state.db, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /api/admin/users/{id}/2fa/cancel`
pub async fn reset_user_otp(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<UserView>, ApiError> {
    Ok(Json(accounts::reset_otp(&state.db, id).await?.into()))
}

/// `PATCH /api/admin/users/{id}`
pub async fn update_user(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
    ApiJson(body): ApiJson<UserUpdate>,
) -> Result<Json<User>, ApiError> {
    Ok(Json(accounts::update_user(&state.db, id, &body).await?))
}

// --- Certificates ---

#[derive(Debug, Deserialize)]
pub struct CreateCertificateBody {
    pub name: String,
    #[serde(rename = "type")]
    pub cert_type: CertificateType,
    pub owner_id: i64,
    #[serde(default)]
    pub issued_date: Option<String>,
    pub expiration_date: String,
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateCertificateBody {
    pub name: String,
    pub expiration_date: String,
}

/// `GET /api/admin/certificates`
pub async fn list_certificates(
    State(state): State<AppState>,
    ApiQuery(page): ApiQuery<PageRequest>,
) -> Result<Json<Page<Certificate>>, ApiError> {
    Ok(Json(state.engine.list_certificates(page).await?))
}

/// `POST /api/admin/certificates`
pub async fn create_certificate(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<CreateCertificateBody>,
) -> Result<(StatusCode, Json<Certificate>), ApiError> {
    let issued_date = body
        .issued_date
        .as_deref()
        .map(|d| parse_date("issued_date", d))
        .transpose()?;
    let expiration_date = parse_date("expiration_date", &body.expiration_date)?;

    let cert = state
        .engine
        .create_certificate(NewCertificateSpec {
            owner_id: body.owner_id,
            name: body.name,
            cert_type: body.cert_type,
            issued_date,
            expiration_date,
            content: body.content,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(cert)))
}

/// `GET /api/admin/certificates/{id}`
pub async fn get_certificate(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<Certificate>, ApiError> {
    Ok(Json(state.engine.get_certificate(id).await?))
}

/// `GET /api/admin/certificates/{id}/download`: any status, for inspection.
pub async fn download_certificate(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
) -> Result<Response, ApiError> {
    let cert = state.engine.get_certificate(id).await?;
    Ok(certificate_attachment(cert))
}

/// `PATCH /api/admin/certificates/{id}`
pub async fn update_certificate(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
    ApiJson(body): ApiJson<UpdateCertificateBody>,
) -> Result<Json<Certificate>, ApiError> {
    let expiration_date = parse_date("expiration_date", &body.expiration_date)?;
    Ok(Json(
        state
            .engine
            .update_certificate_details(id, &body.name, expiration_date)
            .await?,
    ))
}

/// `DELETE /api/admin/certificates/{id}`
pub async fn delete_certificate(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
) -> Result<StatusCode, ApiError> {
    state.engine.delete_certificate(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /api/admin/certificates/{id}/revoke`
pub async fn revoke_certificate(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<Certificate>, ApiError> {
    Ok(Json(state.engine.revoke_certificate(id).await?))
}

// --- Certificate requests ---

#[derive(Debug, Default, Deserialize)]
pub struct RejectBody {
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, serde::Serialize)]
pub struct ApprovalResponse {
    pub request: CertificateRequest,
    pub certificate: Certificate,
}

/// `GET /api/admin/certificate-requests`
pub async fn list_certificate_requests(
    State(state): State<AppState>,
    ApiQuery(page): ApiQuery<PageRequest>,
) -> Result<Json<Page<CertificateRequest>>, ApiError> {
    Ok(Json(state.engine.list_certificate_requests(page).await?))
}

/// `POST /api/admin/certificate-requests/{id}/approve`
pub async fn approve_request(
    State(state): State<AppState>,
    CurrentUser(admin): CurrentUser,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<ApprovalResponse>, ApiError> {
    let (request, certificate) = state.engine.approve_request(id, &admin).await?;
    Ok(Json(ApprovalResponse {
        request,
        certificate,
    }))
}

/// `POST /api/admin/certificate-requests/{id}/reject`
pub async fn reject_request(
    State(state): State<AppState>,
    CurrentUser(admin): CurrentUser,
    ApiPath(id): ApiPath<i64>,
    ApiJson(body): ApiJson<RejectBody>,
) -> Result<Json<CertificateRequest>, ApiError> {
    Ok(Json(
        state.engine.reject_request(id, &admin, &body.reason).await?,
    ))
}
