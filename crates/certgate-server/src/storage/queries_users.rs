//! User queries for the `CertGate` server.

use certgate_core::PageRequest;
use certgate_core::db::{unix_timestamp, unix_timestamp_millis};

use super::db::{DatabaseError, ServerDatabase, lock_user_row};
use super::models::{Role, User};

impl ServerDatabase {
    /// Create a new user.
    pub async fn create_user(
        &self,
        username: &str,
        password_hash: &str,
        role: Role,
        disabled: bool,
    ) -> Result<User, DatabaseError> {
        let now = unix_timestamp();

        let result = sqlx::query(
            "INSERT INTO users (username, password_hash, role, disabled, pwd_ts, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(username)
        .bind(password_hash)
        .bind(role)
        .bind(disabled)
        .bind(unix_timestamp_millis())
        .bind(now)
        .bind(now)
        .execute(self.pool())
        .await?;

        self.get_user(result.last_insert_rowid()).await
    }

    /// Create the user unless the username is taken. Returns the stored user
    /// and whether it was created by this call.
    pub async fn ensure_user(
        &self,
        username: &str,
        password_hash: &str,
        role: Role,
        disabled: bool,
    ) -> Result<(User, bool), DatabaseError> {
        match self.create_user(username, password_hash, role, disabled).await {
            Ok(user) => Ok((user, true)),
            Err(DatabaseError::Constraint(_)) => {
                Ok((self.get_user_by_username(username).await?, false))
            }
            Err(e) => Err(e),
        }
    }

    /// Get a user by ID.
    pub async fn get_user(&self, id: i64) -> Result<User, DatabaseError> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("User {id}")))
    }

    /// Get a user by username.
    pub async fn get_user_by_username(&self, username: &str) -> Result<User, DatabaseError> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("User with username {username}")))
    }

    /// Get the oldest account holding `role` (the system admin / guest).
    pub async fn get_first_user_with_role(&self, role: Role) -> Result<User, DatabaseError> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE role = ? ORDER BY id ASC LIMIT 1")
            .bind(role)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("User with role {role}")))
    }

    /// List users, newest first.
    pub async fn list_users(&self, page: PageRequest) -> Result<(Vec<User>, i64), DatabaseError> {
        let total: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
            .fetch_one(self.pool())
            .await?;

        let users = sqlx::query_as::<_, User>("SELECT * FROM users ORDER BY id DESC LIMIT ? OFFSET ?")
            .bind(page.limit())
            .bind(page.offset())
            .fetch_all(self.pool())
            .await?;

        Ok((users, total.0))
    }

    /// Replace a user's password hash and advance the password epoch.
    ///
    /// The epoch always moves forward, even for two changes within the same
    /// millisecond, so every token issued earlier stops validating.
    pub async fn set_user_password(
        &self,
        id: i64,
        password_hash: &str,
    ) -> Result<User, DatabaseError> {
        let result = sqlx::query(
            "UPDATE users SET password_hash = ?, pwd_ts = MAX(pwd_ts + 1, ?), updated_at = ? WHERE id = ?",
        )
        .bind(password_hash)
        .bind(unix_timestamp_millis())
        .bind(unix_timestamp())
        .bind(id)
        .execute(self.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("User {id}")));
        }
        self.get_user(id).await
    }

    /// Apply an admin edit in one transaction. `None` fields are left alone;
    /// a new `password_hash` advances the password epoch.
    pub async fn update_user_fields(
        &self,
        id: i64,
        role: Option<Role>,
        disabled: Option<bool>,
        password_hash: Option<&str>,
    ) -> Result<User, DatabaseError> {
        let mut tx = self.pool().begin().await?;

        if !lock_user_row(&mut tx, id).await? {
            return Err(DatabaseError::NotFound(format!("User {id}")));
        }
        let now = unix_timestamp();
        if let Some(role) = role {
            sqlx::query("UPDATE users SET role = ?, updated_at = ? WHERE id = ?")
                .bind(role)
                .bind(now)
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }
        if let Some(disabled) = disabled {
            sqlx::query("UPDATE users SET disabled = ?, updated_at = ? WHERE id = ?")
                .bind(disabled)
                .bind(now)
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }
        if let Some(hash) = password_hash {
            sqlx::query(
                "UPDATE users SET password_hash = ?, pwd_ts = MAX(pwd_ts + 1, ?), updated_at = ? WHERE id = ?",
            )
            .bind(hash)
            .bind(unix_timestamp_millis())
            .bind(now)
            .bind(id)
            .execute(&mut *tx)
            .await?;
        }

        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(user)
    }

    /// Set or clear a user's TOTP secret (base32).
    pub async fn set_user_otp_secret(
        &self,
        id: i64,
        secret: Option<&str>,
    ) -> Result<User, DatabaseError> {
        let result = sqlx::query("UPDATE users SET otp_secret = ?, updated_at = ? WHERE id = ?")
            .bind(secret)
            .bind(unix_timestamp())
            .bind(id)
            .execute(self.pool())
            .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("User {id}")));
        }
        self.get_user(id).await
    }

    /// Remove a user together with their certificates and requests.
    /// Returns `false` if no such user exists.
    pub async fn delete_user(&self, id: i64) -> Result<bool, DatabaseError> {
        let mut tx = self.pool().begin().await?;

        if !lock_user_row(&mut tx, id).await? {
            return Ok(false);
        }
        sqlx::query("DELETE FROM certificate_requests WHERE user_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM certificates WHERE owner_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(true)
    }
}
