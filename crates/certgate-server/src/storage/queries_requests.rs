//! Certificate request queries for the `CertGate` server.
//!
//! Creation, approval, and rejection each run as one transaction. The
//! approval transaction covers both the request update and the certificate
//! insert, so either both land or neither does.

use certgate_core::PageRequest;
use certgate_core::db::unix_timestamp;
use sqlx::SqliteConnection;

use super::db::{DatabaseError, ServerDatabase, has_active_certificate, lock_user_row};
use super::models::{
    Certificate, CertificateRequest, CertificateStatus, CertificateType, Guarded, NewCertificate,
};
use super::queries_certs::insert_certificate;

async fn fetch_request(
    conn: &mut SqliteConnection,
    id: i64,
) -> Result<Option<CertificateRequest>, DatabaseError> {
    let req = sqlx::query_as::<_, CertificateRequest>(
        "SELECT * FROM certificate_requests WHERE id = ? AND deleted_at IS NULL",
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(req)
}

/// Row-lock the user who filed request `id`. Returns `false` if the request
/// does not exist.
async fn lock_request_owner(conn: &mut SqliteConnection, id: i64) -> Result<bool, DatabaseError> {
    let result = sqlx::query(
        "UPDATE users SET lock_version = lock_version + 1 WHERE id = (SELECT user_id FROM certificate_requests WHERE id = ? AND deleted_at IS NULL)",
    )
    .bind(id)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() > 0)
}

async fn has_pending_request(
    conn: &mut SqliteConnection,
    user_id: i64,
) -> Result<bool, DatabaseError> {
    let row: (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM certificate_requests WHERE user_id = ? AND status = 'pending' AND deleted_at IS NULL",
    )
    .bind(user_id)
    .fetch_one(&mut *conn)
    .await?;

    Ok(row.0 > 0)
}

impl ServerDatabase {
    /// Open a `pending` request for a user.
    ///
    /// Refused if the user already holds an active certificate or already
    /// has a pending request. Both checks and the insert share one
    /// transaction holding the user's row lock.
    pub async fn create_request_guarded(
        &self,
        user_id: i64,
        user_name: &str,
        cert_type: CertificateType,
        reason: &str,
    ) -> Result<Guarded<CertificateRequest>, DatabaseError> {
        let mut tx = self.pool().begin().await?;

        if !lock_user_row(&mut tx, user_id).await? {
            return Ok(Guarded::Missing);
        }
        if has_active_certificate(&mut tx, user_id).await? {
            return Ok(Guarded::ActiveCertificateExists);
        }
        if has_pending_request(&mut tx, user_id).await? {
            return Ok(Guarded::PendingRequestExists);
        }

        let now = unix_timestamp();
        let inserted = sqlx::query(
            "INSERT INTO certificate_requests (user_name, user_id, cert_type, status, reason, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(user_name)
        .bind(user_id)
        .bind(cert_type)
        .bind(CertificateStatus::Pending)
        .bind(reason)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await;

        let id = match inserted.map_err(DatabaseError::from) {
            Ok(result) => result.last_insert_rowid(),
            // The partial unique index caught a concurrent writer.
            Err(DatabaseError::Constraint(_)) => return Ok(Guarded::PendingRequestExists),
            Err(e) => return Err(e),
        };

        let created = fetch_request(&mut tx, id)
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Certificate request {id}")))?;
        tx.commit().await?;

        Ok(Guarded::Applied(created))
    }

    /// Approve a pending request and issue its certificate atomically.
    ///
    /// `build` turns the approved request into the certificate to insert; it
    /// runs inside the transaction after all checks have passed.
    pub async fn approve_request_guarded<F>(
        &self,
        id: i64,
        approver: &str,
        build: F,
    ) -> Result<Guarded<(CertificateRequest, Certificate)>, DatabaseError>
    where
        F: FnOnce(&CertificateRequest) -> NewCertificate + Send,
    {
        let mut tx = self.pool().begin().await?;

        // Lock the requester before reading anything, so the status check
        // sees state no other writer can change under us.
        if !lock_request_owner(&mut tx, id).await? {
            return Ok(Guarded::Missing);
        }
        let Some(req) = fetch_request(&mut tx, id).await? else {
            return Ok(Guarded::Missing);
        };
        if req.status != CertificateStatus::Pending {
            return Ok(Guarded::NotPending(req.status));
        }
        if has_active_certificate(&mut tx, req.user_id).await? {
            return Ok(Guarded::ActiveCertificateExists);
        }

        let now = unix_timestamp();
        let updated = sqlx::query(
            "UPDATE certificate_requests SET status = 'valid', approved_by = ?, approved_at = ?, updated_at = ? WHERE id = ? AND status = 'pending'",
        )
        .bind(approver)
        .bind(now)
        .bind(now)
        .bind(id)
        .execute(&mut *tx)
        .await?;
        if updated.rows_affected() == 0 {
            return Ok(Guarded::NotPending(req.status));
        }

        let approved = fetch_request(&mut tx, id)
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Certificate request {id}")))?;
        let cert = insert_certificate(&mut tx, &build(&approved)).await?;
        tx.commit().await?;

        Ok(Guarded::Applied((approved, cert)))
    }

    /// Reject a pending request. Rejection is terminal.
    pub async fn reject_request_guarded(
        &self,
        id: i64,
        rejecter: &str,
        reason: &str,
    ) -> Result<Guarded<CertificateRequest>, DatabaseError> {
        let mut tx = self.pool().begin().await?;

        if !lock_request_owner(&mut tx, id).await? {
            return Ok(Guarded::Missing);
        }
        let now = unix_timestamp();
        let updated = sqlx::query(
            "UPDATE certificate_requests SET status = 'rejected', rejected_by = ?, rejected_at = ?, rejected_reason = ?, updated_at = ? WHERE id = ? AND status = 'pending' AND deleted_at IS NULL",
        )
        .bind(rejecter)
        .bind(now)
        .bind(reason)
        .bind(now)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        let current = fetch_request(&mut tx, id).await?;
        let outcome = match (updated.rows_affected(), current) {
            (_, None) => Guarded::Missing,
            (0, Some(req)) => Guarded::NotPending(req.status),
            (_, Some(req)) => Guarded::Applied(req),
        };
        tx.commit().await?;

        Ok(outcome)
    }

    /// Get a certificate request by ID.
    pub async fn get_certificate_request(
        &self,
        id: i64,
    ) -> Result<CertificateRequest, DatabaseError> {
        sqlx::query_as::<_, CertificateRequest>(
            "SELECT * FROM certificate_requests WHERE id = ? AND deleted_at IS NULL",
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await?
        .ok_or_else(|| DatabaseError::NotFound(format!("Certificate request {id}")))
    }

    /// List certificate requests, newest first, with the total count.
    pub async fn list_certificate_requests(
        &self,
        page: PageRequest,
    ) -> Result<(Vec<CertificateRequest>, i64), DatabaseError> {
        let total: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM certificate_requests WHERE deleted_at IS NULL")
                .fetch_one(self.pool())
                .await?;

        let reqs = sqlx::query_as::<_, CertificateRequest>(
            "SELECT * FROM certificate_requests WHERE deleted_at IS NULL ORDER BY id DESC LIMIT ? OFFSET ?",
        )
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(self.pool())
        .await?;

        Ok((reqs, total.0))
    }

    /// All requests filed by one user, newest first.
    pub async fn list_requests_for_user(
        &self,
        user_id: i64,
    ) -> Result<Vec<CertificateRequest>, DatabaseError> {
        let reqs = sqlx::query_as::<_, CertificateRequest>(
            "SELECT * FROM certificate_requests WHERE user_id = ? AND deleted_at IS NULL ORDER BY id DESC",
        )
        .bind(user_id)
        .fetch_all(self.pool())
        .await?;

        Ok(reqs)
    }
}
