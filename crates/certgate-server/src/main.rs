//! `CertGate` Server
//!
//! Certificate request lifecycle and authentication API.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{info, warn};

use certgate_core::config::{self, DEV_JWT_SECRET};
use certgate_core::tracing_init::init_tracing;
use certgate_server::auth::accounts::ensure_system_accounts;
use certgate_server::auth::{
    AuthPipeline, LoginAttemptTracker, LoginPolicy, LoginService, TokenService,
};
use certgate_server::http::{AppState, build_router};
use certgate_server::lifecycle::{CertificateEngine, LifecyclePolicy};
use certgate_server::storage::ServerDatabase;
use certgate_server::sweep::Sweeper;

#[derive(Parser, Debug)]
#[command(name = "certgate-server")]
#[command(version, about = "CertGate server - certificate lifecycle and auth API")]
struct Args {
    /// Path to a JSON settings file.
    #[arg(long, env = "CERTGATE_CONFIG")]
    config: Option<PathBuf>,

    /// Address to listen on.
    #[arg(long)]
    addr: Option<SocketAddr>,

    /// Path to SQLite database file.
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// JWT secret key.
    #[arg(long)]
    jwt_secret: Option<String>,

    /// Token TTL in seconds.
    #[arg(long)]
    token_ttl: Option<i64>,

    /// Take client IPs from X-Forwarded-For (only behind a trusted proxy).
    #[arg(long)]
    trust_forwarded_for: bool,

    /// Output logs as JSON (for structured log aggregation).
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = config::load_config(args.config.as_deref())?;
    if let Some(addr) = args.addr {
        config.server.addr = addr;
    }
    if let Some(path) = args.db_path {
        config.server.database_path = Some(path);
    }
    if let Some(secret) = args.jwt_secret {
        config.auth.jwt_secret = secret;
    }
    if let Some(ttl) = args.token_ttl {
        config.auth.token_ttl_secs = ttl;
    }
    config.auth.trust_forwarded_for |= args.trust_forwarded_for;
    config.server.log_json |= args.log_json;

    init_tracing("certgate_server=info", config.server.log_json);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        addr = %config.server.addr,
        "Starting certgate-server"
    );
    if config.auth.jwt_secret == DEV_JWT_SECRET {
        warn!("Using the development JWT secret; set CERTGATE_JWT_SECRET in production");
    }
    if config.auth.admin_token.is_empty() {
        info!("No admin token configured, admin-token authentication disabled");
    }

    let db_path = match config.server.database_path.clone() {
        Some(path) => path,
        None => config::default_database_path()
            .ok_or_else(|| anyhow::anyhow!("Cannot determine data directory"))?,
    };
    info!(path = %db_path.display(), "Opening server database");
    let db = ServerDatabase::open(&db_path).await?;

    ensure_system_accounts(&db, config.auth.initial_admin_password.as_deref()).await?;

    let tokens = Arc::new(TokenService::new(
        config.auth.jwt_secret.as_bytes(),
        config.auth.token_ttl_secs,
    ));
    let tracker = Arc::new(LoginAttemptTracker::new());
    let login = Arc::new(LoginService::new(
        db.clone(),
        Arc::clone(&tokens),
        Arc::clone(&tracker),
        LoginPolicy {
            max_retries: config.auth.max_auth_retries,
            lock_duration: Duration::from_secs(config.auth.lock_duration_secs),
            trusted_ips: config
                .auth
                .trusted_ips
                .iter()
                .map(ToString::to_string)
                .collect::<HashSet<_>>(),
        },
    ));
    let pipeline = AuthPipeline::new(db.clone(), Arc::clone(&tokens), &config.auth.admin_token);
    let engine = CertificateEngine::new(
        db.clone(),
        LifecyclePolicy::from_config(&config.server, &config.certificates),
    );

    let sweep = Sweeper::new(engine.clone(), Arc::clone(&tokens), Arc::clone(&tracker))
        .spawn(Duration::from_secs(config.certificates.sweep_interval_secs.max(1)));

    let app = build_router(AppState {
        db,
        engine,
        pipeline,
        login,
        tokens,
        trust_forwarded_for: config.auth.trust_forwarded_for,
    });

    let listener = tokio::net::TcpListener::bind(config.server.addr).await?;
    info!(addr = %config.server.addr, "Listening");

    tokio::select! {
        result = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        ) => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
    }

    sweep.abort();
    info!("Server stopped");
    Ok(())
}
