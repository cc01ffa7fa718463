//! Periodic housekeeping: mark certificates nearing expiry and drop stale
//! entries from the in-memory auth maps.

use std::sync::Arc;
use std::time::Duration;

use certgate_core::db::unix_timestamp;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::auth::{LoginAttemptTracker, TokenService};
use crate::lifecycle::CertificateEngine;

pub struct Sweeper {
    engine: CertificateEngine,
    tokens: Arc<TokenService>,
    tracker: Arc<LoginAttemptTracker>,
}

impl Sweeper {
    pub const fn new(
        engine: CertificateEngine,
        tokens: Arc<TokenService>,
        tracker: Arc<LoginAttemptTracker>,
    ) -> Self {
        Self {
            engine,
            tokens,
            tracker,
        }
    }

    /// One pass. Returns how many certificates moved to `expiring`.
    pub async fn run_once(&self) -> u64 {
        let marked = match self.engine.mark_expiring(unix_timestamp()).await {
            Ok(marked) => marked,
            Err(e) => {
                warn!(error = %e, "Expiring sweep failed");
                0
            }
        };
        let tokens = self.tokens.prune_revoked().await;
        let ips = self.tracker.purge_expired().await;
        debug!(marked, tokens, ips, "Sweep pass complete");
        marked
    }

    /// Run [`Self::run_once`] every `interval`, starting immediately.
    pub fn spawn(self, interval: Duration) -> JoinHandle<()> {
        info!(interval_secs = interval.as_secs(), "Starting background sweep");
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                self.run_once().await;
            }
        })
    }
}
