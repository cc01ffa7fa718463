//! Configuration resolution for `CertGate`.
//!
//! Implements hierarchical config resolution:
//! 1. Built-in defaults
//! 2. Settings file (`--config` or ~/.config/certgate/settings.json)
//! 3. Environment variables (`CERTGATE_*`)
//! 4. CLI arguments (highest priority, applied by the binary)

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Development fallback for the token signing secret.
pub const DEV_JWT_SECRET: &str = "dev-secret-change-me";

/// Complete `CertGate` configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub certificates: CertificateConfig,
}

/// Listener, storage, and logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub addr: SocketAddr,
    pub database_path: Option<PathBuf>,
    pub log_json: bool,
    /// Upper bound for a single lifecycle operation (seconds).
    pub operation_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([0, 0, 0, 0], 5244)),
            database_path: None,
            log_json: false,
            operation_timeout_secs: 10,
        }
    }
}

/// Token, admin secret, and brute-force lockout settings.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub jwt_secret: String,
    /// Static admin credential. Empty disables admin-token authentication.
    pub admin_token: String,
    pub token_ttl_secs: i64,
    /// Failed logins from one IP before further attempts are refused.
    pub max_auth_retries: u32,
    pub lock_duration_secs: u64,
    /// Client IPs exempt from login throttling.
    pub trusted_ips: Vec<IpAddr>,
    /// Take the client IP from `X-Forwarded-For` (only behind a trusted proxy).
    pub trust_forwarded_for: bool,
    /// Password for the bootstrap `admin` account when it is first created.
    pub initial_admin_password: Option<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: DEV_JWT_SECRET.to_string(),
            admin_token: String::new(),
            token_ttl_secs: 48 * 60 * 60,
            max_auth_retries: 5,
            lock_duration_secs: 5 * 60,
            trusted_ips: Vec::new(),
            trust_forwarded_for: false,
            initial_admin_password: None,
        }
    }
}

// Secrets stay out of logs.
impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &"<redacted>")
            .field("admin_token_set", &!self.admin_token.is_empty())
            .field("token_ttl_secs", &self.token_ttl_secs)
            .field("max_auth_retries", &self.max_auth_retries)
            .field("lock_duration_secs", &self.lock_duration_secs)
            .field("trusted_ips", &self.trusted_ips)
            .field("trust_forwarded_for", &self.trust_forwarded_for)
            .finish_non_exhaustive()
    }
}

/// Certificate issuance and listing policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CertificateConfig {
    /// Validity of a certificate issued from an approved request.
    pub validity_months: u32,
    /// Valid certificates this close to expiry are marked `expiring`.
    pub expiring_window_days: i64,
    pub sweep_interval_secs: u64,
    pub default_page_size: u32,
    pub max_page_size: u32,
}

impl Default for CertificateConfig {
    fn default() -> Self {
        Self {
            validity_months: 12,
            expiring_window_days: 30,
            sweep_interval_secs: 3600,
            default_page_size: 20,
            max_page_size: 100,
        }
    }
}

/// Load configuration with hierarchical resolution.
///
/// An explicit `path` must exist; the global settings file is optional.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let mut config = match path {
        Some(p) => load_config_file(p)?,
        None => match global_config_path() {
            Some(global) if global.exists() => load_config_file(&global)?,
            _ => Config::default(),
        },
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());

    Ok(config)
}

/// Get the global config file path.
pub fn global_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("certgate").join("settings.json"))
}

/// Default location of the server database.
pub fn default_database_path() -> Option<PathBuf> {
    dirs::data_dir().map(|p| p.join("certgate").join("certgate.db"))
}

fn load_config_file(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;
    serde_json::from_str(&content).map_err(|e| {
        Error::Config(format!("Failed to parse config file {}: {}", path.display(), e))
    })
}

/// Apply `CERTGATE_*` overrides read through `lookup`.
///
/// Unparseable numeric values are ignored so a typo never replaces a sane
/// default with zero.
pub fn apply_env_overrides<F>(config: &mut Config, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(val) = lookup("CERTGATE_ADDR") {
        if let Ok(addr) = val.parse() {
            config.server.addr = addr;
        }
    }
    if let Some(val) = lookup("CERTGATE_DB_PATH") {
        config.server.database_path = Some(PathBuf::from(val));
    }
    if let Some(val) = lookup("CERTGATE_JWT_SECRET") {
        config.auth.jwt_secret = val;
    }
    if let Some(val) = lookup("CERTGATE_ADMIN_TOKEN") {
        config.auth.admin_token = val;
    }
    if let Some(val) = lookup("CERTGATE_ADMIN_PASSWORD") {
        config.auth.initial_admin_password = Some(val);
    }
    if let Some(val) = lookup("CERTGATE_MAX_AUTH_RETRIES") {
        if let Ok(n) = val.parse() {
            config.auth.max_auth_retries = n;
        }
    }
    if let Some(val) = lookup("CERTGATE_TRUSTED_IPS") {
        config.auth.trusted_ips = val
            .split(',')
            .filter_map(|s| s.trim().parse().ok())
            .collect();
    }
}
