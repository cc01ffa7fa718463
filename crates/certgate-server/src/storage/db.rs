//! `SQLite` database for the `CertGate` server.

use sqlx::SqliteConnection;

pub use certgate_core::db::DatabaseError;

certgate_core::define_database!(ServerDatabase, "Server database migrations complete");

/// Take the write lock on a user's row for the rest of the transaction.
///
/// Issued as the first statement of a transaction so every check that
/// follows sees committed state and no other writer can interleave for the
/// same owner. Returns `false` if the user does not exist.
pub(super) async fn lock_user_row(
    conn: &mut SqliteConnection,
    user_id: i64,
) -> Result<bool, DatabaseError> {
    let result = sqlx::query("UPDATE users SET lock_version = lock_version + 1 WHERE id = ?")
        .bind(user_id)
        .execute(&mut *conn)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Whether the owner holds a certificate in `valid` or `expiring`.
pub(super) async fn has_active_certificate(
    conn: &mut SqliteConnection,
    owner_id: i64,
) -> Result<bool, DatabaseError> {
    let row: (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM certificates WHERE owner_id = ? AND status IN ('valid', 'expiring') AND deleted_at IS NULL",
    )
    .bind(owner_id)
    .fetch_one(&mut *conn)
    .await?;

    Ok(row.0 > 0)
}
