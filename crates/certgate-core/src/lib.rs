//! `CertGate` Core Library
//!
//! Shared functionality for `CertGate` components:
//! - `SQLite` pool helpers and the `define_database!` macro
//! - Configuration resolution and hierarchy
//! - Page request clamping for list endpoints
//! - Common error types

pub mod config;
pub mod db;
pub mod error;
pub mod page;
pub mod tracing_init;

pub use config::Config;
pub use error::{Error, Result};
pub use page::{Page, PageRequest};
