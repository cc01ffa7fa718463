//! Certificate request, issue, and revoke lifecycle.

mod engine;
mod error;

pub use engine::{CertificateEngine, LifecyclePolicy, NewCertificateSpec};
pub use error::LifecycleError;
