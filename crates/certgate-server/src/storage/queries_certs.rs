//! Certificate queries for the `CertGate` server.
//!
//! Soft-deleted rows (`deleted_at IS NOT NULL`) are invisible to every read.

use certgate_core::PageRequest;
use certgate_core::db::unix_timestamp;
use sqlx::SqliteConnection;

use super::db::{DatabaseError, ServerDatabase, has_active_certificate, lock_user_row};
use super::models::{Certificate, CertificateStatus, Guarded, NewCertificate};

/// Insert a `valid` certificate on an open connection and read it back.
pub(super) async fn insert_certificate(
    conn: &mut SqliteConnection,
    cert: &NewCertificate,
) -> Result<Certificate, DatabaseError> {
    let now = unix_timestamp();

    let result = sqlx::query(
        "INSERT INTO certificates (name, cert_type, status, owner, owner_id, content, issued_date, expiration_date, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&cert.name)
    .bind(cert.cert_type)
    .bind(CertificateStatus::Valid)
    .bind(&cert.owner)
    .bind(cert.owner_id)
    .bind(&cert.content)
    .bind(cert.issued_date)
    .bind(cert.expiration_date)
    .bind(now)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    let id = result.last_insert_rowid();
    sqlx::query_as::<_, Certificate>("SELECT * FROM certificates WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| DatabaseError::NotFound(format!("Certificate {id}")))
}

impl ServerDatabase {
    /// Create a certificate unless its owner already holds an active one.
    pub async fn create_certificate_guarded(
        &self,
        cert: &NewCertificate,
    ) -> Result<Guarded<Certificate>, DatabaseError> {
        let mut tx = self.pool().begin().await?;

        if !lock_user_row(&mut tx, cert.owner_id).await? {
            return Ok(Guarded::Missing);
        }
        if has_active_certificate(&mut tx, cert.owner_id).await? {
            return Ok(Guarded::ActiveCertificateExists);
        }

        let created = insert_certificate(&mut tx, cert).await?;
        tx.commit().await?;

        Ok(Guarded::Applied(created))
    }

    /// Get a certificate by ID.
    pub async fn get_certificate(&self, id: i64) -> Result<Certificate, DatabaseError> {
        sqlx::query_as::<_, Certificate>(
            "SELECT * FROM certificates WHERE id = ? AND deleted_at IS NULL",
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await?
        .ok_or_else(|| DatabaseError::NotFound(format!("Certificate {id}")))
    }

    /// List certificates, newest first, with the total count.
    pub async fn list_certificates(
        &self,
        page: PageRequest,
    ) -> Result<(Vec<Certificate>, i64), DatabaseError> {
        let total: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM certificates WHERE deleted_at IS NULL")
                .fetch_one(self.pool())
                .await?;

        let certs = sqlx::query_as::<_, Certificate>(
            "SELECT * FROM certificates WHERE deleted_at IS NULL ORDER BY id DESC LIMIT ? OFFSET ?",
        )
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(self.pool())
        .await?;

        Ok((certs, total.0))
    }

    /// The owner's certificate if it is active and not yet expired at `now`.
    pub async fn get_usable_certificate_for_owner(
        &self,
        owner_id: i64,
        now: i64,
    ) -> Result<Option<Certificate>, DatabaseError> {
        let cert = sqlx::query_as::<_, Certificate>(
            "SELECT * FROM certificates WHERE owner_id = ? AND status IN ('valid', 'expiring') AND expiration_date > ? AND deleted_at IS NULL ORDER BY id DESC LIMIT 1",
        )
        .bind(owner_id)
        .bind(now)
        .fetch_optional(self.pool())
        .await?;

        Ok(cert)
    }

    /// The owner's most relevant certificate regardless of status: an active
    /// one if any, otherwise the newest.
    pub async fn get_latest_certificate_for_owner(
        &self,
        owner_id: i64,
    ) -> Result<Option<Certificate>, DatabaseError> {
        let cert = sqlx::query_as::<_, Certificate>(
            "SELECT * FROM certificates WHERE owner_id = ? AND deleted_at IS NULL ORDER BY status IN ('valid', 'expiring') DESC, id DESC LIMIT 1",
        )
        .bind(owner_id)
        .fetch_optional(self.pool())
        .await?;

        Ok(cert)
    }

    /// Update the mutable details of a certificate. Status is untouched.
    pub async fn update_certificate_details(
        &self,
        id: i64,
        name: &str,
        expiration_date: i64,
    ) -> Result<Certificate, DatabaseError> {
        let result = sqlx::query(
            "UPDATE certificates SET name = ?, expiration_date = ?, updated_at = ? WHERE id = ? AND deleted_at IS NULL",
        )
        .bind(name)
        .bind(expiration_date)
        .bind(unix_timestamp())
        .bind(id)
        .execute(self.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("Certificate {id}")));
        }
        self.get_certificate(id).await
    }

    /// Revoke a certificate whatever its current status.
    pub async fn revoke_certificate(&self, id: i64) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            "UPDATE certificates SET status = 'revoked', updated_at = ? WHERE id = ? AND deleted_at IS NULL",
        )
        .bind(unix_timestamp())
        .bind(id)
        .execute(self.pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Soft-delete a certificate.
    pub async fn delete_certificate(&self, id: i64) -> Result<bool, DatabaseError> {
        let now = unix_timestamp();
        let result = sqlx::query(
            "UPDATE certificates SET deleted_at = ?, updated_at = ? WHERE id = ? AND deleted_at IS NULL",
        )
        .bind(now)
        .bind(now)
        .bind(id)
        .execute(self.pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Move `valid` certificates expiring before `horizon` to `expiring`.
    pub async fn mark_expiring(&self, horizon: i64) -> Result<u64, DatabaseError> {
        let result = sqlx::query(
            "UPDATE certificates SET status = 'expiring', updated_at = ? WHERE status = 'valid' AND expiration_date <= ? AND deleted_at IS NULL",
        )
        .bind(unix_timestamp())
        .bind(horizon)
        .execute(self.pool())
        .await?;

        Ok(result.rows_affected())
    }
}
