//! Account management: bootstrap system accounts, admin user edits,
//! self-service password changes and TOTP enrollment.

use serde::Deserialize;
use tracing::{info, instrument, warn};

use super::otp::{self, OtpEnrollment};
use super::password::{generate_password, hash_password, verify_password};
use crate::storage::{DatabaseError, Role, ServerDatabase, User};

pub const ADMIN_USERNAME: &str = "admin";
pub const GUEST_USERNAME: &str = "guest";

#[derive(Debug, thiserror::Error)]
pub enum AccountError {
    #[error("{0}")]
    Validation(String),

    #[error("user {0} not found")]
    NotFound(i64),

    #[error("username already taken")]
    UsernameTaken,

    #[error("current password is incorrect")]
    WrongPassword,

    #[error("password hashing failed: {0}")]
    Hash(String),

    #[error("{0}")]
    Protected(String),

    #[error("two-factor authentication is already enabled")]
    OtpAlreadyEnabled,

    #[error("invalid two-factor code")]
    InvalidOtpCode,

    #[error(transparent)]
    Storage(DatabaseError),
}

impl From<DatabaseError> for AccountError {
    fn from(e: DatabaseError) -> Self {
        match e {
            DatabaseError::Constraint(_) => Self::UsernameTaken,
            other => Self::Storage(other),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    pub username: String,
    pub password: String,
    pub role: Role,
    #[serde(default)]
    pub disabled: bool,
}

/// Partial update; absent fields are left alone.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserUpdate {
    pub role: Option<Role>,
    pub disabled: Option<bool>,
    pub password: Option<String>,
}

fn hash(password: &str) -> Result<String, AccountError> {
    if password.is_empty() {
        return Err(AccountError::Validation("password must not be empty".into()));
    }
    hash_password(password).map_err(|e| AccountError::Hash(e.to_string()))
}

/// Make sure the `admin` and `guest` accounts exist.
///
/// A fresh admin gets `initial_admin_password`, or a generated one that is
/// logged once. The guest account starts disabled.
pub async fn ensure_system_accounts(
    db: &ServerDatabase,
    initial_admin_password: Option<&str>,
) -> Result<(), AccountError> {
    if db.get_first_user_with_role(Role::Admin).await.is_err() {
        let (password, generated) = match initial_admin_password {
            Some(p) if !p.is_empty() => (p.to_string(), false),
            _ => (generate_password(), true),
        };
        let (admin, created) = db
            .ensure_user(ADMIN_USERNAME, &hash(&password)?, Role::Admin, false)
            .await?;
        if created && generated {
            warn!(username = %admin.username, %password, "Generated initial admin password");
        } else if created {
            info!(username = %admin.username, "Created admin account");
        }
    }

    if db.get_first_user_with_role(Role::Guest).await.is_err() {
        // Nobody can log in as guest; the hash only fills the column.
        let (_, created) = db
            .ensure_user(GUEST_USERNAME, &hash(&generate_password())?, Role::Guest, true)
            .await?;
        if created {
            info!("Created guest account (disabled)");
        }
    }

    Ok(())
}

#[instrument(skip(db, new), fields(username = %new.username, role = %new.role))]
pub async fn create_user(db: &ServerDatabase, new: &NewUser) -> Result<User, AccountError> {
    let username = new.username.trim();
    if username.is_empty() {
        return Err(AccountError::Validation("username must not be empty".into()));
    }
    let user = db
        .create_user(username, &hash(&new.password)?, new.role, new.disabled)
        .await?;
    info!(user_id = user.id, "User created");
    Ok(user)
}

pub async fn get_user(db: &ServerDatabase, id: i64) -> Result<User, AccountError> {
    db.get_user(id).await.map_err(|e| not_found(id, e))
}

/// Apply an admin edit. The password is validated and hashed before
/// anything is written, and all fields land in one transaction.
#[instrument(skip(db, update))]
pub async fn update_user(
    db: &ServerDatabase,
    id: i64,
    update: &UserUpdate,
) -> Result<User, AccountError> {
    let password_hash = update.password.as_deref().map(hash).transpose()?;

    let user = db
        .update_user_fields(id, update.role, update.disabled, password_hash.as_deref())
        .await
        .map_err(|e| not_found(id, e))?;
    info!(user_id = id, "User updated");
    Ok(user)
}

/// Delete a user and everything they own. The admin and guest accounts
/// cannot be deleted.
#[instrument(skip(db))]
pub async fn delete_user(db: &ServerDatabase, id: i64) -> Result<(), AccountError> {
    let user = get_user(db, id).await?;
    if matches!(user.role, Role::Admin | Role::Guest) {
        return Err(AccountError::Protected(format!(
            "cannot delete the {} account",
            user.role
        )));
    }
    if !db.delete_user(id).await? {
        return Err(AccountError::NotFound(id));
    }
    info!(user_id = id, username = %user.username, "User deleted");
    Ok(())
}

fn not_found(id: i64, e: DatabaseError) -> AccountError {
    match e {
        DatabaseError::NotFound(_) => AccountError::NotFound(id),
        other => AccountError::from(other),
    }
}

/// Change the caller's own password. Every token issued before the change
/// stops working.
#[instrument(skip(db, user, current, new_password), fields(user_id = user.id))]
pub async fn change_password(
    db: &ServerDatabase,
    user: &User,
    current: &str,
    new_password: &str,
) -> Result<User, AccountError> {
    if !verify_password(current, &user.password_hash) {
        return Err(AccountError::WrongPassword);
    }
    let updated = db.set_user_password(user.id, &hash(new_password)?).await?;
    info!("Password changed");
    Ok(updated)
}

/// Start TOTP enrollment. Nothing is stored until [`confirm_otp`].
pub fn begin_otp_enrollment(user: &User) -> Result<OtpEnrollment, AccountError> {
    if user.has_otp() {
        return Err(AccountError::OtpAlreadyEnabled);
    }
    otp::generate_enrollment(&user.username).map_err(AccountError::Validation)
}

/// Store `secret` once the caller proves their authenticator produces `code`.
#[instrument(skip(db, user, secret, code), fields(user_id = user.id))]
pub async fn confirm_otp(
    db: &ServerDatabase,
    user: &User,
    secret: &str,
    code: &str,
) -> Result<User, AccountError> {
    if user.has_otp() {
        return Err(AccountError::OtpAlreadyEnabled);
    }
    if !otp::verify_code(secret, code) {
        return Err(AccountError::InvalidOtpCode);
    }
    let updated = db
        .set_user_otp_secret(user.id, Some(secret))
        .await
        .map_err(|e| not_found(user.id, e))?;
    info!("Two-factor authentication enabled");
    Ok(updated)
}

/// Admin reset of a user's second factor.
#[instrument(skip(db))]
pub async fn reset_otp(db: &ServerDatabase, id: i64) -> Result<User, AccountError> {
    let updated = db
        .set_user_otp_secret(id, None)
        .await
        .map_err(|e| not_found(id, e))?;
    info!(user_id = id, "Two-factor authentication reset");
    Ok(updated)
}
