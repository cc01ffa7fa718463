//! `CertGate` Server Library
//!
//! Core functionality for the `CertGate` server:
//! - `SQLite` storage for users, certificates, and certificate requests
//! - Token issuance, login throttling, and per-request identity resolution
//! - The certificate request / issue / revoke lifecycle
//! - Background expiry sweep
//! - HTTP API

pub mod auth;
pub mod http;
pub mod lifecycle;
pub mod storage;
pub mod sweep;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod test_helpers;
