//! Authentication for the `CertGate` server.
//!
//! Provides JWT token management, password hashing, TOTP checks, the
//! login-attempt throttle, and the per-request identity pipeline.

pub mod accounts;
pub mod claims;
pub mod jwt;
pub mod login;
pub mod login_tracker;
pub mod otp;
pub mod password;
pub mod pipeline;

pub use claims::Claims;
pub use jwt::{TokenError, TokenService};
pub use login::{LoginError, LoginPolicy, LoginRequest, LoginResponse, LoginScope, LoginService};
pub use login_tracker::LoginAttemptTracker;
pub use pipeline::{AuthError, AuthPipeline, AuthPolicy, require_admin, require_non_guest};
