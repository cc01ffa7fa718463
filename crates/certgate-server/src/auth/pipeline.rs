//! Per-request identity resolution.
//!
//! Evaluated in strict order: static admin secret, no credential (guest),
//! session token. The first branch that applies decides the outcome.

use std::sync::Arc;

use subtle::ConstantTimeEq;
use tracing::{debug, error, warn};

use super::jwt::TokenService;
use crate::storage::{DatabaseError, Role, ServerDatabase, User};

/// Per-route knobs for [`AuthPipeline::resolve`].
#[derive(Debug, Clone, Copy, Default)]
pub struct AuthPolicy {
    /// Let anonymous callers through as the guest account even when it is
    /// disabled.
    pub allow_disabled_guest: bool,
    /// Token-authenticated callers must hold a member role.
    pub members_only: bool,
}

impl AuthPolicy {
    pub const fn members() -> Self {
        Self {
            allow_disabled_guest: false,
            members_only: true,
        }
    }

    pub const fn allow_disabled_guest() -> Self {
        Self {
            allow_disabled_guest: true,
            members_only: false,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("{0}")]
    Unauthorized(&'static str),

    #[error("{0}")]
    Forbidden(&'static str),

    /// A required system account could not be loaded.
    #[error("failed to load {role} account: {source}")]
    SystemAccount {
        role: Role,
        #[source]
        source: DatabaseError,
    },
}

/// Resolves the caller identity for each request.
#[derive(Clone)]
pub struct AuthPipeline {
    db: ServerDatabase,
    tokens: Arc<TokenService>,
    admin_token: Arc<str>,
}

impl AuthPipeline {
    /// An empty `admin_token` disables the admin-secret branch.
    pub fn new(db: ServerDatabase, tokens: Arc<TokenService>, admin_token: &str) -> Self {
        Self {
            db,
            tokens,
            admin_token: Arc::from(admin_token),
        }
    }

    /// Resolve the identity behind an `Authorization` header value.
    ///
    /// The header may carry `Bearer <token>` or the raw credential.
    pub async fn resolve(
        &self,
        authorization: Option<&str>,
        policy: AuthPolicy,
    ) -> Result<User, AuthError> {
        let credential = authorization
            .map(str::trim)
            .map(|v| v.strip_prefix("Bearer ").unwrap_or(v).trim())
            .filter(|v| !v.is_empty());

        let Some(credential) = credential else {
            return self.resolve_guest(policy).await;
        };

        if self.is_admin_token(credential) {
            let admin = self.system_account(Role::Admin).await?;
            debug!(user = %admin.username, "Authenticated via admin token");
            return Ok(admin);
        }

        self.resolve_token(credential, policy).await
    }

    fn is_admin_token(&self, credential: &str) -> bool {
        !self.admin_token.is_empty()
            && bool::from(credential.as_bytes().ct_eq(self.admin_token.as_bytes()))
    }

    async fn resolve_guest(&self, policy: AuthPolicy) -> Result<User, AuthError> {
        let guest = self.system_account(Role::Guest).await?;
        if guest.disabled && !policy.allow_disabled_guest {
            debug!("Anonymous request refused, guest account is disabled");
            return Err(AuthError::Unauthorized("Guest user is disabled, login please"));
        }
        Ok(guest)
    }

    async fn resolve_token(&self, token: &str, policy: AuthPolicy) -> Result<User, AuthError> {
        let claims = self.tokens.parse(token).await.map_err(|e| {
            warn!(error = %e, "Token rejected");
            AuthError::Unauthorized("Invalid or expired token")
        })?;

        // Same answer as a bad token so usernames cannot be enumerated.
        let user = self
            .db
            .get_user_by_username(&claims.username)
            .await
            .map_err(|e| {
                warn!(username = %claims.username, error = %e, "Token subject not found");
                AuthError::Unauthorized("Invalid or expired token")
            })?;

        if claims.is_stale_for(user.pwd_ts) {
            warn!(user = %user.username, "Token predates password change");
            return Err(AuthError::Unauthorized("Password has been changed, login please"));
        }
        if user.disabled {
            warn!(user = %user.username, "Disabled user presented a token");
            return Err(AuthError::Unauthorized("Current user is disabled"));
        }
        if policy.members_only && !user.role.is_member() {
            warn!(user = %user.username, role = %user.role, "Role not permitted");
            return Err(AuthError::Forbidden("User role is not permitted to access this API"));
        }

        Ok(user)
    }

    async fn system_account(&self, role: Role) -> Result<User, AuthError> {
        self.db.get_first_user_with_role(role).await.map_err(|source| {
            error!(%role, error = %source, "System account unavailable");
            AuthError::SystemAccount { role, source }
        })
    }
}

/// Reject the guest account.
pub fn require_non_guest(user: &User) -> Result<(), AuthError> {
    if user.is_guest() {
        return Err(AuthError::Forbidden("You are a guest"));
    }
    Ok(())
}

/// Reject everyone but admins.
pub fn require_admin(user: &User) -> Result<(), AuthError> {
    match user.role {
        Role::Admin => Ok(()),
        Role::General | Role::Tenant | Role::Guest => {
            Err(AuthError::Forbidden("You are not an admin"))
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
#[path = "pipeline_tests.rs"]
mod tests;
