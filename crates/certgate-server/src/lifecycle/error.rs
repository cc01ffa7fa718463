//! Lifecycle error taxonomy.

use crate::storage::{CertificateStatus, DatabaseError};

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("an active certificate already exists for this user")]
    CertificateAlreadyExists,

    #[error("a certificate request is already pending for this user")]
    CertificateRequestPending,

    #[error("certificate request is not pending (current status: {0})")]
    CertificateRequestNotPending(CertificateStatus),

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    Forbidden(&'static str),

    #[error("{0}")]
    Validation(String),

    #[error("operation timed out")]
    Timeout,

    /// Approval could not be committed. The request is left as it was and
    /// needs an operator to look at it.
    #[error("failed to issue certificate for request {request_id}: {source}")]
    IssueFailed {
        request_id: i64,
        #[source]
        source: DatabaseError,
    },

    #[error(transparent)]
    Storage(DatabaseError),
}

impl From<DatabaseError> for LifecycleError {
    fn from(e: DatabaseError) -> Self {
        match e {
            DatabaseError::NotFound(what) => Self::NotFound(what),
            other => Self::Storage(other),
        }
    }
}
