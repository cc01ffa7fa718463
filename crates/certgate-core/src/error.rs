//! Error types for `CertGate` core library.

use thiserror::Error;

/// Result type alias using `CertGate` Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for `CertGate` operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}
