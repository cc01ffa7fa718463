//! `SQLite` storage for the `CertGate` server.
//!
//! Provides persistence for users, certificates, and certificate requests.
//! Multi-step invariant checks run inside a single transaction that first
//! locks the owning user's row.

mod db;
mod models;
mod queries_certs;
mod queries_requests;
mod queries_users;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic, clippy::unreachable)]
mod tests;

pub use db::{DatabaseError, ServerDatabase};
pub use models::*;
