//! Username/password login with per-IP lockout and optional TOTP.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, warn};

use super::jwt::TokenService;
use super::login_tracker::LoginAttemptTracker;
use super::otp;
use super::password::verify_password;
use crate::storage::{DatabaseError, Role, ServerDatabase, User};

#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub otp_code: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub role: Role,
}

/// Which accounts an entry point accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginScope {
    Any,
    TenantOnly,
}

#[derive(Debug, thiserror::Error)]
pub enum LoginError {
    #[error(
        "Too many unsuccessful sign-in attempts have been made using an incorrect username or password, try again later"
    )]
    RateLimited,

    #[error("Incorrect username or password")]
    BadCredentials,

    #[error("Invalid 2FA code")]
    InvalidOtp,

    #[error("{0}")]
    Forbidden(&'static str),

    #[error("login failed: {0}")]
    Internal(String),
}

/// Lockout policy for [`LoginService`].
#[derive(Debug, Clone)]
pub struct LoginPolicy {
    pub max_retries: u32,
    pub lock_duration: Duration,
    /// IPs that bypass the attempt counter entirely.
    pub trusted_ips: HashSet<String>,
}

pub struct LoginService {
    db: ServerDatabase,
    tokens: Arc<TokenService>,
    tracker: Arc<LoginAttemptTracker>,
    policy: LoginPolicy,
}

impl LoginService {
    pub const fn new(
        db: ServerDatabase,
        tokens: Arc<TokenService>,
        tracker: Arc<LoginAttemptTracker>,
        policy: LoginPolicy,
    ) -> Self {
        Self {
            db,
            tokens,
            tracker,
            policy,
        }
    }

    pub const fn tracker(&self) -> &Arc<LoginAttemptTracker> {
        &self.tracker
    }

    /// Authenticate `req` coming from `ip` and issue a session token.
    #[instrument(skip(self, req), fields(username = %req.username))]
    pub async fn login(
        &self,
        ip: &str,
        req: &LoginRequest,
        scope: LoginScope,
    ) -> Result<LoginResponse, LoginError> {
        let trusted = self.policy.trusted_ips.contains(ip);
        if trusted {
            debug!(ip, "Trusted IP, skipping lockout");
        } else if let Some(count) = self.tracker.get(ip).await {
            if count >= self.policy.max_retries {
                self.tracker.expire(ip, self.policy.lock_duration).await;
                warn!(ip, count, "Login refused, IP locked out");
                return Err(LoginError::RateLimited);
            }
        }

        match self.check_credentials(req, scope).await {
            Ok(user) => {
                let token = self.tokens.issue(&user).map_err(|e| {
                    error!(error = %e, "Failed to issue token");
                    LoginError::Internal(e.to_string())
                })?;
                self.tracker.del(ip).await;
                info!(user_id = user.id, role = %user.role, "Login succeeded");
                Ok(LoginResponse {
                    token,
                    role: user.role,
                })
            }
            Err(Failure::Counted(err)) => {
                if !trusted {
                    let count = self
                        .tracker
                        .record_failure(ip, self.policy.lock_duration)
                        .await;
                    warn!(ip, count, error = %err, "Login failed");
                }
                Err(err)
            }
            Err(Failure::Uncounted(err)) => {
                warn!(ip, error = %err, "Login refused");
                Err(err)
            }
        }
    }

    async fn check_credentials(
        &self,
        req: &LoginRequest,
        scope: LoginScope,
    ) -> Result<User, Failure> {
        let user = match self.db.get_user_by_username(&req.username).await {
            Ok(user) if !user.is_guest() => user,
            Ok(_) | Err(DatabaseError::NotFound(_)) => {
                return Err(Failure::Counted(LoginError::BadCredentials));
            }
            Err(e) => return Err(Failure::Uncounted(LoginError::Internal(e.to_string()))),
        };

        if scope == LoginScope::TenantOnly && user.role != Role::Tenant {
            return Err(Failure::Counted(LoginError::Forbidden(
                "Only tenant accounts can sign in here",
            )));
        }

        if !verify_password(&req.password, &user.password_hash) {
            return Err(Failure::Counted(LoginError::BadCredentials));
        }

        if let Some(secret) = &user.otp_secret {
            let code = req.otp_code.as_deref().unwrap_or_default();
            if !otp::verify_code(secret, code) {
                return Err(Failure::Counted(LoginError::InvalidOtp));
            }
        }

        if user.disabled {
            return Err(Failure::Uncounted(LoginError::Forbidden(
                "Current user is disabled",
            )));
        }

        Ok(user)
    }
}

/// Whether a failed check increments the attempt counter.
enum Failure {
    Counted(LoginError),
    Uncounted(LoginError),
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
#[path = "login_tests.rs"]
mod tests;
