//! Mapping from domain errors to HTTP responses.
//!
//! Every error body is `{"code": "...", "message": "..."}`.

use axum::Json;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tracing::error;

use crate::auth::accounts::AccountError;
use crate::auth::{AuthError, LoginError};
use crate::lifecycle::LifecycleError;

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    code: &'a str,
    message: &'a str,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "validation_error", message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "unauthorized", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, "forbidden", message)
    }

    /// Log the real cause and hand the client a generic message.
    fn internal(cause: &dyn std::fmt::Display) -> Self {
        error!(error = %cause, "Internal error");
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal",
            "internal server error",
        )
    }

    pub const fn status(&self) -> StatusCode {
        self.status
    }

    pub const fn code(&self) -> &'static str {
        self.code
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            code: self.code,
            message: &self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<LifecycleError> for ApiError {
    fn from(e: LifecycleError) -> Self {
        match &e {
            LifecycleError::CertificateAlreadyExists => {
                Self::new(StatusCode::CONFLICT, "certificate_already_exists", e.to_string())
            }
            LifecycleError::CertificateRequestPending => {
                Self::new(StatusCode::CONFLICT, "certificate_request_pending", e.to_string())
            }
            LifecycleError::CertificateRequestNotPending(_) => Self::new(
                StatusCode::CONFLICT,
                "certificate_request_not_pending",
                e.to_string(),
            ),
            LifecycleError::NotFound(_) => {
                Self::new(StatusCode::NOT_FOUND, "not_found", e.to_string())
            }
            LifecycleError::Forbidden(_) => Self::forbidden(e.to_string()),
            LifecycleError::Validation(_) => Self::validation(e.to_string()),
            LifecycleError::Timeout => {
                Self::new(StatusCode::GATEWAY_TIMEOUT, "timeout", e.to_string())
            }
            // The request id must reach the operator, so the message is kept.
            LifecycleError::IssueFailed { .. } => {
                error!(error = %e, "Certificate issuance failed");
                Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "issue_failed",
                    e.to_string(),
                )
            }
            LifecycleError::Storage(_) => Self::internal(&e),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        match &e {
            AuthError::Unauthorized(msg) => Self::unauthorized(*msg),
            AuthError::Forbidden(msg) => Self::forbidden(*msg),
            AuthError::SystemAccount { .. } => Self::internal(&e),
        }
    }
}

impl From<LoginError> for ApiError {
    fn from(e: LoginError) -> Self {
        match &e {
            LoginError::RateLimited => {
                Self::new(StatusCode::TOO_MANY_REQUESTS, "rate_limited", e.to_string())
            }
            LoginError::BadCredentials => {
                Self::new(StatusCode::BAD_REQUEST, "bad_credentials", e.to_string())
            }
            LoginError::InvalidOtp => {
                Self::new(StatusCode::PAYMENT_REQUIRED, "invalid_otp", e.to_string())
            }
            LoginError::Forbidden(msg) => Self::forbidden(*msg),
            LoginError::Internal(_) => Self::internal(&e),
        }
    }
}

impl From<AccountError> for ApiError {
    fn from(e: AccountError) -> Self {
        match &e {
            AccountError::Validation(_) => Self::validation(e.to_string()),
            AccountError::NotFound(_) => {
                Self::new(StatusCode::NOT_FOUND, "not_found", e.to_string())
            }
            AccountError::UsernameTaken => {
                Self::new(StatusCode::CONFLICT, "username_taken", e.to_string())
            }
            AccountError::WrongPassword => {
                Self::new(StatusCode::BAD_REQUEST, "wrong_password", e.to_string())
            }
            AccountError::Protected(_) => Self::forbidden(e.to_string()),
            AccountError::OtpAlreadyEnabled => {
                Self::new(StatusCode::BAD_REQUEST, "otp_already_enabled", e.to_string())
            }
            AccountError::InvalidOtpCode => {
                Self::new(StatusCode::BAD_REQUEST, "invalid_otp", e.to_string())
            }
            AccountError::Hash(_) | AccountError::Storage(_) => Self::internal(&e),
        }
    }
}

// Malformed input from axum's own extractors gets the regular error body.

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::validation(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::validation(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self::validation(rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{CertificateStatus, DatabaseError};

    #[test]
    fn lifecycle_errors_map_to_statuses() {
        let cases = [
            (LifecycleError::CertificateAlreadyExists, StatusCode::CONFLICT),
            (LifecycleError::CertificateRequestPending, StatusCode::CONFLICT),
            (
                LifecycleError::CertificateRequestNotPending(CertificateStatus::Rejected),
                StatusCode::CONFLICT,
            ),
            (LifecycleError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (LifecycleError::Forbidden("no"), StatusCode::FORBIDDEN),
            (LifecycleError::Validation("bad".into()), StatusCode::BAD_REQUEST),
            (LifecycleError::Timeout, StatusCode::GATEWAY_TIMEOUT),
            (
                LifecycleError::Storage(DatabaseError::Query("boom".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status(), status);
        }
    }

    #[test]
    fn issue_failure_names_the_request() {
        let err = ApiError::from(LifecycleError::IssueFailed {
            request_id: 17,
            source: DatabaseError::Query("disk full".into()),
        });
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(err.message.contains("17"));
    }

    #[test]
    fn storage_details_stay_out_of_responses() {
        let err = ApiError::from(LifecycleError::Storage(DatabaseError::Query(
            "SELECT secret".into(),
        )));
        assert!(!err.message.contains("SELECT"));
    }

    #[test]
    fn login_errors_map_to_statuses() {
        assert_eq!(
            ApiError::from(LoginError::RateLimited).status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            ApiError::from(LoginError::BadCredentials).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(LoginError::InvalidOtp).status(),
            StatusCode::PAYMENT_REQUIRED
        );
        assert_eq!(
            ApiError::from(LoginError::Forbidden("x")).status(),
            StatusCode::FORBIDDEN
        );
    }

    #[test]
    fn account_errors_map_to_statuses() {
        let cases = [
            (AccountError::Protected("admin".into()), StatusCode::FORBIDDEN),
            (AccountError::OtpAlreadyEnabled, StatusCode::BAD_REQUEST),
            (AccountError::InvalidOtpCode, StatusCode::BAD_REQUEST),
            (AccountError::NotFound(3), StatusCode::NOT_FOUND),
            (AccountError::UsernameTaken, StatusCode::CONFLICT),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status(), status);
        }
    }
}
