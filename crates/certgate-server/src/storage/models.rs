//! Data models for `CertGate` server storage.

use serde::{Deserialize, Serialize};

/// Account role. Closed set; every role check matches on it exhaustively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Role {
    Admin,
    General,
    Tenant,
    Guest,
}

impl Role {
    /// Roles allowed through endpoints closed to anonymous callers.
    pub const fn is_member(self) -> bool {
        match self {
            Self::Admin | Self::General | Self::Tenant => true,
            Self::Guest => false,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::General => "general",
            Self::Tenant => "tenant",
            Self::Guest => "guest",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub role: Role,
    pub disabled: bool,
    /// Password epoch; tokens carrying an older value are refused.
    #[serde(skip_serializing, default)]
    pub pwd_ts: i64,
    #[serde(skip_serializing, default)]
    pub otp_secret: Option<String>,
    #[serde(skip_serializing, default)]
    pub lock_version: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

impl User {
    pub const fn is_guest(&self) -> bool {
        matches!(self.role, Role::Guest)
    }

    pub const fn has_otp(&self) -> bool {
        self.otp_secret.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum CertificateType {
    User,
    Node,
}

impl CertificateType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Node => "node",
        }
    }
}

impl std::fmt::Display for CertificateType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status shared by certificates and certificate requests.
///
/// Requests only ever hold `Pending`, `Valid` (approved) or `Rejected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum CertificateStatus {
    Pending,
    Valid,
    Expiring,
    Revoked,
    Rejected,
}

impl CertificateStatus {
    /// Statuses that count toward the one-active-certificate limit.
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Valid | Self::Expiring)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Valid => "valid",
            Self::Expiring => "expiring",
            Self::Revoked => "revoked",
            Self::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for CertificateStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Certificate {
    pub id: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub cert_type: CertificateType,
    pub status: CertificateStatus,
    pub owner: String,
    pub owner_id: i64,
    pub content: String,
    pub issued_date: i64,
    pub expiration_date: i64,
    pub created_at: i64,
    pub updated_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<i64>,
}

impl Certificate {
    /// Usable right now: active status and not past its expiration date.
    pub const fn is_usable_at(&self, now: i64) -> bool {
        self.status.is_active() && self.expiration_date > now
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CertificateRequest {
    pub id: i64,
    pub user_name: String,
    pub user_id: i64,
    #[serde(rename = "type")]
    pub cert_type: CertificateType,
    pub status: CertificateStatus,
    pub reason: String,
    pub approved_by: Option<String>,
    pub approved_at: Option<i64>,
    pub rejected_by: Option<String>,
    pub rejected_at: Option<i64>,
    pub rejected_reason: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<i64>,
}

/// Fields for a certificate about to be inserted.
#[derive(Debug, Clone)]
pub struct NewCertificate {
    pub name: String,
    pub cert_type: CertificateType,
    pub owner: String,
    pub owner_id: i64,
    pub content: String,
    pub issued_date: i64,
    pub expiration_date: i64,
}

/// Result of a guarded write that can be refused by current state.
#[derive(Debug)]
pub enum Guarded<T> {
    Applied(T),
    /// The target row does not exist (or is soft-deleted).
    Missing,
    /// The owner already holds a `valid`/`expiring` certificate.
    ActiveCertificateExists,
    /// The requester already has a `pending` request.
    PendingRequestExists,
    /// The request has left `pending`; carries its current status.
    NotPending(CertificateStatus),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn member_roles() {
        assert!(Role::Admin.is_member());
        assert!(Role::General.is_member());
        assert!(Role::Tenant.is_member());
        assert!(!Role::Guest.is_member());
    }

    #[test]
    fn active_statuses() {
        assert!(CertificateStatus::Valid.is_active());
        assert!(CertificateStatus::Expiring.is_active());
        assert!(!CertificateStatus::Revoked.is_active());
        assert!(!CertificateStatus::Pending.is_active());
        assert!(!CertificateStatus::Rejected.is_active());
    }

    #[test]
    fn status_serializes_lowercase() {
        let json = serde_json::to_string(&CertificateStatus::Expiring).unwrap_or_default();
        assert_eq!(json, r#""expiring""#);
    }
}
