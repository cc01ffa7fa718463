//! JWT token issuance, validation, and invalidation.

use std::collections::HashMap;

use certgate_core::db::unix_timestamp;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;

use super::claims::Claims;
use crate::storage::User;

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("invalid token")]
    Invalid(#[source] jsonwebtoken::errors::Error),

    #[error("token has been logged out")]
    Revoked,

    #[error("failed to sign token: {0}")]
    Sign(#[source] jsonwebtoken::errors::Error),
}

/// Issues and validates session tokens and keeps the logout blacklist.
///
/// Blacklisted tokens are stored by SHA-256 hash alongside their expiry so
/// entries can be dropped once the token would be rejected anyway.
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl_secs: i64,
    revoked: RwLock<HashMap<String, i64>>,
}

impl TokenService {
    /// Create a new `TokenService` with the given secret.
    pub fn new(secret: &[u8], ttl_secs: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            ttl_secs,
            revoked: RwLock::new(HashMap::new()),
        }
    }

    pub const fn ttl_secs(&self) -> i64 {
        self.ttl_secs
    }

    /// Issue a token bound to the user's current password epoch.
    pub fn issue(&self, user: &User) -> Result<String, TokenError> {
        let now = unix_timestamp();
        let claims = Claims {
            jti: uuid::Uuid::new_v4().to_string(),
            sub: user.id.to_string(),
            username: user.username.clone(),
            pwd_ts: user.pwd_ts,
            iat: now,
            exp: now + self.ttl_secs,
        };

        jsonwebtoken::encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(TokenError::Sign)
    }

    /// Validate a token and return its claims.
    ///
    /// The blacklist is consulted first, so a logged-out token fails even
    /// while its signature and expiry are still good.
    pub async fn parse(&self, token: &str) -> Result<Claims, TokenError> {
        if self.revoked.read().await.contains_key(&hash_token(token)) {
            return Err(TokenError::Revoked);
        }
        self.decode(token)
    }

    /// Blacklist a token until its natural expiry.
    pub async fn invalidate(&self, token: &str) -> Result<(), TokenError> {
        let claims = self.decode(token)?;
        let mut revoked = self.revoked.write().await;
        let now = unix_timestamp();
        revoked.retain(|_, exp| *exp > now);
        revoked.insert(hash_token(token), claims.exp);
        Ok(())
    }

    /// Drop blacklist entries whose tokens have expired. Returns how many
    /// were removed.
    pub async fn prune_revoked(&self) -> usize {
        let mut revoked = self.revoked.write().await;
        let before = revoked.len();
        let now = unix_timestamp();
        revoked.retain(|_, exp| *exp > now);
        before - revoked.len()
    }

    fn decode(&self, token: &str) -> Result<Claims, TokenError> {
        let data = jsonwebtoken::decode::<Claims>(token, &self.decoding_key, &Validation::default())
            .map_err(TokenError::Invalid)?;
        Ok(data.claims)
    }
}

/// Hash a token for the blacklist (raw tokens are never kept).
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}
