//! Session token claims.

use serde::{Deserialize, Serialize};

/// Claims carried by every session token. `pwd_ts` ties the token to the
/// password epoch it was issued under.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// JWT ID (unique per token).
    pub jti: String,
    /// Subject (user ID).
    pub sub: String,
    /// Username.
    pub username: String,
    /// Password epoch of the user when the token was issued.
    pub pwd_ts: i64,
    /// Issued at (unix timestamp).
    pub iat: i64,
    /// Expiration (unix timestamp).
    pub exp: i64,
}

impl Claims {
    /// Whether the token predates the user's latest password change.
    pub const fn is_stale_for(&self, current_pwd_ts: i64) -> bool {
        self.pwd_ts != current_pwd_ts
    }
}
