//! `/api/tenant` handlers. Every operation acts on the caller's own records.

use axum::Json;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use super::AppState;
use super::error::ApiError;
use super::extract::{ApiJson, CurrentUser};
use crate::storage::{Certificate, CertificateRequest, CertificateType};

#[derive(Debug, Deserialize)]
pub struct NewRequestBody {
    #[serde(rename = "type")]
    pub cert_type: CertificateType,
    #[serde(default)]
    pub reason: String,
}

/// `GET /api/tenant/certificate`: the caller's usable certificate, or `null`.
pub async fn get_certificate(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<Option<Certificate>>, ApiError> {
    Ok(Json(state.engine.get_certificate_for_tenant(user.id).await?))
}

/// `GET /api/tenant/certificate/download`
pub async fn download_certificate(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Response, ApiError> {
    let cert = state.engine.download_certificate(user.id).await?;
    Ok(certificate_attachment(cert))
}

/// Certificate content as a `.crt` download named after the certificate.
pub(super) fn certificate_attachment(cert: Certificate) -> Response {
    let filename: String = cert
        .name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || "-_.".contains(c) { c } else { '_' })
        .collect();

    (
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}.crt\""),
            ),
        ],
        cert.content,
    )
        .into_response()
}

/// `GET /api/tenant/certificate-requests`
pub async fn list_requests(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<Vec<CertificateRequest>>, ApiError> {
    Ok(Json(state.engine.list_requests_for_user(user.id).await?))
}

/// `POST /api/tenant/certificate-requests`
pub async fn create_request(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ApiJson(body): ApiJson<NewRequestBody>,
) -> Result<(StatusCode, Json<CertificateRequest>), ApiError> {
    let req = state
        .engine
        .request_certificate(&user, body.cert_type, &body.reason)
        .await?;
    Ok((StatusCode::CREATED, Json(req)))
}
