//! The certificate lifecycle engine.
//!
//! Every read-modify-write re-reads stored state inside one storage
//! transaction; the engine keeps nothing between calls. Each operation is
//! bounded by the configured timeout, and a timed-out operation drops its
//! transaction, which rolls it back.

use std::future::Future;
use std::time::Duration;

use certgate_core::config::{CertificateConfig, ServerConfig};
use certgate_core::db::unix_timestamp;
use certgate_core::{Page, PageRequest};
use chrono::{DateTime, Months, Utc};
use sha2::{Digest, Sha256};
use tracing::{error, info, instrument, warn};

use super::error::LifecycleError;
use crate::storage::{
    Certificate, CertificateRequest, CertificateType, Guarded, NewCertificate, ServerDatabase,
    User,
};

/// Issuance and listing policy.
#[derive(Debug, Clone)]
pub struct LifecyclePolicy {
    pub validity_months: u32,
    pub expiring_window_secs: i64,
    pub default_page_size: u32,
    pub max_page_size: u32,
    pub op_timeout: Duration,
}

impl LifecyclePolicy {
    pub fn from_config(server: &ServerConfig, certs: &CertificateConfig) -> Self {
        Self {
            validity_months: certs.validity_months,
            expiring_window_secs: certs.expiring_window_days.saturating_mul(86_400),
            default_page_size: certs.default_page_size,
            max_page_size: certs.max_page_size,
            op_timeout: Duration::from_secs(server.operation_timeout_secs),
        }
    }
}

impl Default for LifecyclePolicy {
    fn default() -> Self {
        Self::from_config(&ServerConfig::default(), &CertificateConfig::default())
    }
}

/// Admin-supplied fields for a certificate created outside the request flow.
#[derive(Debug, Clone)]
pub struct NewCertificateSpec {
    pub owner_id: i64,
    pub name: String,
    pub cert_type: CertificateType,
    /// Defaults to now.
    pub issued_date: Option<i64>,
    pub expiration_date: i64,
    /// Defaults to a generated placeholder.
    pub content: Option<String>,
}

#[derive(Clone)]
pub struct CertificateEngine {
    db: ServerDatabase,
    policy: LifecyclePolicy,
}

impl CertificateEngine {
    pub const fn new(db: ServerDatabase, policy: LifecyclePolicy) -> Self {
        Self { db, policy }
    }

    pub const fn policy(&self) -> &LifecyclePolicy {
        &self.policy
    }

    async fn bounded<T, F>(&self, op: &'static str, fut: F) -> Result<T, LifecycleError>
    where
        F: Future<Output = Result<T, LifecycleError>>,
    {
        tokio::time::timeout(self.policy.op_timeout, fut)
            .await
            .unwrap_or_else(|_| {
                warn!(op, timeout = ?self.policy.op_timeout, "Lifecycle operation timed out");
                Err(LifecycleError::Timeout)
            })
    }

    fn page(&self, page: PageRequest) -> PageRequest {
        page.clamp(self.policy.default_page_size, self.policy.max_page_size)
    }

    // --- Tenant operations ---

    /// File a new `pending` request for `user`.
    #[instrument(skip(self, user, reason), fields(user_id = user.id))]
    pub async fn request_certificate(
        &self,
        user: &User,
        cert_type: CertificateType,
        reason: &str,
    ) -> Result<CertificateRequest, LifecycleError> {
        self.bounded("request_certificate", async {
            match self
                .db
                .create_request_guarded(user.id, &user.username, cert_type, reason)
                .await?
            {
                Guarded::Applied(req) => {
                    info!(request_id = req.id, %cert_type, "Certificate requested");
                    Ok(req)
                }
                Guarded::ActiveCertificateExists => Err(LifecycleError::CertificateAlreadyExists),
                Guarded::PendingRequestExists => Err(LifecycleError::CertificateRequestPending),
                Guarded::Missing | Guarded::NotPending(_) => {
                    Err(LifecycleError::NotFound(format!("User {}", user.id)))
                }
            }
        })
        .await
    }

    /// The tenant's certificate if it is usable right now. Absence is a
    /// normal outcome.
    pub async fn get_certificate_for_tenant(
        &self,
        owner_id: i64,
    ) -> Result<Option<Certificate>, LifecycleError> {
        self.bounded("get_certificate_for_tenant", async {
            Ok(self
                .db
                .get_usable_certificate_for_owner(owner_id, unix_timestamp())
                .await?)
        })
        .await
    }

    /// Fetch the tenant's certificate for download.
    ///
    /// Status and expiry are checked against current state at call time.
    #[instrument(skip(self))]
    pub async fn download_certificate(&self, owner_id: i64) -> Result<Certificate, LifecycleError> {
        self.bounded("download_certificate", async {
            let cert = self
                .db
                .get_latest_certificate_for_owner(owner_id)
                .await?
                .ok_or_else(|| LifecycleError::NotFound("Certificate".into()))?;

            if !cert.is_usable_at(unix_timestamp()) {
                warn!(cert_id = cert.id, status = %cert.status, "Download of unusable certificate refused");
                return Err(LifecycleError::Forbidden(
                    "Certificate is revoked or expired and cannot be downloaded",
                ));
            }
            Ok(cert)
        })
        .await
    }

    pub async fn list_requests_for_user(
        &self,
        user_id: i64,
    ) -> Result<Vec<CertificateRequest>, LifecycleError> {
        self.bounded("list_requests_for_user", async {
            Ok(self.db.list_requests_for_user(user_id).await?)
        })
        .await
    }

    // --- Admin operations ---

    /// Approve a pending request and issue its certificate in one
    /// transaction.
    #[instrument(skip(self, approver), fields(approver = %approver.username))]
    pub async fn approve_request(
        &self,
        request_id: i64,
        approver: &User,
    ) -> Result<(CertificateRequest, Certificate), LifecycleError> {
        let validity = self.policy.validity_months;
        self.bounded("approve_request", async {
            let outcome = self
                .db
                .approve_request_guarded(request_id, &approver.username, |req| {
                    issue_from_request(req, Utc::now(), validity)
                })
                .await
                .map_err(|source| {
                    error!(request_id, error = %source, "Certificate issuance failed, request left pending");
                    LifecycleError::IssueFailed { request_id, source }
                })?;

            match outcome {
                Guarded::Applied((req, cert)) => {
                    info!(request_id, cert_id = cert.id, owner_id = cert.owner_id, "Request approved, certificate issued");
                    Ok((req, cert))
                }
                Guarded::Missing => Err(not_found_request(request_id)),
                Guarded::NotPending(status) => {
                    Err(LifecycleError::CertificateRequestNotPending(status))
                }
                Guarded::ActiveCertificateExists => Err(LifecycleError::CertificateAlreadyExists),
                Guarded::PendingRequestExists => Err(LifecycleError::CertificateRequestPending),
            }
        })
        .await
    }

    #[instrument(skip(self, rejecter, reason), fields(rejecter = %rejecter.username))]
    pub async fn reject_request(
        &self,
        request_id: i64,
        rejecter: &User,
        reason: &str,
    ) -> Result<CertificateRequest, LifecycleError> {
        self.bounded("reject_request", async {
            match self
                .db
                .reject_request_guarded(request_id, &rejecter.username, reason)
                .await?
            {
                Guarded::Applied(req) => {
                    info!(request_id, "Request rejected");
                    Ok(req)
                }
                Guarded::NotPending(status) => {
                    Err(LifecycleError::CertificateRequestNotPending(status))
                }
                Guarded::Missing
                | Guarded::ActiveCertificateExists
                | Guarded::PendingRequestExists => Err(not_found_request(request_id)),
            }
        })
        .await
    }

    /// Revoke a certificate whatever its current status.
    #[instrument(skip(self))]
    pub async fn revoke_certificate(&self, cert_id: i64) -> Result<Certificate, LifecycleError> {
        self.bounded("revoke_certificate", async {
            if !self.db.revoke_certificate(cert_id).await? {
                return Err(not_found_cert(cert_id));
            }
            info!(cert_id, "Certificate revoked");
            Ok(self.db.get_certificate(cert_id).await?)
        })
        .await
    }

    /// Change name and expiration date. Status is left untouched.
    #[instrument(skip(self, name))]
    pub async fn update_certificate_details(
        &self,
        cert_id: i64,
        name: &str,
        expiration_date: i64,
    ) -> Result<Certificate, LifecycleError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(LifecycleError::Validation("name must not be empty".into()));
        }
        self.bounded("update_certificate_details", async {
            let cert = self
                .db
                .update_certificate_details(cert_id, name, expiration_date)
                .await?;
            info!(cert_id, "Certificate details updated");
            Ok(cert)
        })
        .await
    }

    /// Create a certificate directly, bypassing the request flow.
    #[instrument(skip(self, spec), fields(owner_id = spec.owner_id))]
    pub async fn create_certificate(
        &self,
        spec: NewCertificateSpec,
    ) -> Result<Certificate, LifecycleError> {
        let name = spec.name.trim().to_string();
        if name.is_empty() {
            return Err(LifecycleError::Validation("name must not be empty".into()));
        }
        self.bounded("create_certificate", async {
            let owner = self.db.get_user(spec.owner_id).await?;
            let issued_date = spec.issued_date.unwrap_or_else(unix_timestamp);
            let content = spec.content.filter(|c| !c.is_empty()).unwrap_or_else(|| {
                placeholder_content(&owner.username, spec.cert_type, issued_date)
            });
            let new = NewCertificate {
                name,
                cert_type: spec.cert_type,
                owner: owner.username,
                owner_id: owner.id,
                content,
                issued_date,
                expiration_date: spec.expiration_date,
            };

            match self.db.create_certificate_guarded(&new).await? {
                Guarded::Applied(cert) => {
                    info!(cert_id = cert.id, "Certificate created by admin");
                    Ok(cert)
                }
                Guarded::ActiveCertificateExists => Err(LifecycleError::CertificateAlreadyExists),
                Guarded::Missing | Guarded::PendingRequestExists | Guarded::NotPending(_) => {
                    Err(LifecycleError::NotFound(format!("User {}", spec.owner_id)))
                }
            }
        })
        .await
    }

    pub async fn get_certificate(&self, cert_id: i64) -> Result<Certificate, LifecycleError> {
        self.bounded("get_certificate", async {
            Ok(self.db.get_certificate(cert_id).await?)
        })
        .await
    }

    #[instrument(skip(self))]
    pub async fn delete_certificate(&self, cert_id: i64) -> Result<(), LifecycleError> {
        self.bounded("delete_certificate", async {
            if !self.db.delete_certificate(cert_id).await? {
                return Err(not_found_cert(cert_id));
            }
            info!(cert_id, "Certificate deleted");
            Ok(())
        })
        .await
    }

    pub async fn list_certificates(
        &self,
        page: PageRequest,
    ) -> Result<Page<Certificate>, LifecycleError> {
        let page = self.page(page);
        self.bounded("list_certificates", async {
            let (content, total) = self.db.list_certificates(page).await?;
            Ok(Page { content, total })
        })
        .await
    }

    pub async fn list_certificate_requests(
        &self,
        page: PageRequest,
    ) -> Result<Page<CertificateRequest>, LifecycleError> {
        let page = self.page(page);
        self.bounded("list_certificate_requests", async {
            let (content, total) = self.db.list_certificate_requests(page).await?;
            Ok(Page { content, total })
        })
        .await
    }

    /// Move `valid` certificates that expire within the configured window to
    /// `expiring`.
    pub async fn mark_expiring(&self, now: i64) -> Result<u64, LifecycleError> {
        let horizon = now.saturating_add(self.policy.expiring_window_secs);
        self.bounded("mark_expiring", async {
            let marked = self.db.mark_expiring(horizon).await?;
            if marked > 0 {
                info!(marked, "Certificates marked expiring");
            }
            Ok(marked)
        })
        .await
    }
}

fn not_found_request(id: i64) -> LifecycleError {
    LifecycleError::NotFound(format!("Certificate request {id}"))
}

fn not_found_cert(id: i64) -> LifecycleError {
    LifecycleError::NotFound(format!("Certificate {id}"))
}

/// Build the certificate issued for an approved request.
///
/// Named `{owner}-{type}-{YYYYMMDD}`, valid from `now` for `validity_months`.
pub(crate) fn issue_from_request(
    req: &CertificateRequest,
    now: DateTime<Utc>,
    validity_months: u32,
) -> NewCertificate {
    let issued_date = now.timestamp();
    let expires = now
        .checked_add_months(Months::new(validity_months))
        .unwrap_or(DateTime::<Utc>::MAX_UTC);

    NewCertificate {
        name: format!("{}-{}-{}", req.user_name, req.cert_type, now.format("%Y%m%d")),
        cert_type: req.cert_type,
        owner: req.user_name.clone(),
        owner_id: req.user_id,
        content: placeholder_content(&req.user_name, req.cert_type, issued_date),
        issued_date,
        expiration_date: expires.timestamp(),
    }
}

/// Opaque stand-in for a signed credential: a PEM-armoured digest unique to
/// this issuance.
pub(crate) fn placeholder_content(owner: &str, cert_type: CertificateType, issued: i64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(owner.as_bytes());
    hasher.update(b"|");
    hasher.update(cert_type.as_str().as_bytes());
    hasher.update(b"|");
    hasher.update(issued.to_be_bytes());
    hasher.update(b"|");
    hasher.update(uuid::Uuid::new_v4().as_bytes());
    format!(
        "-----BEGIN CERTIFICATE-----\n{}\n-----END CERTIFICATE-----\n",
        hex::encode(hasher.finalize())
    )
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
#[path = "engine_tests.rs"]
mod tests;
