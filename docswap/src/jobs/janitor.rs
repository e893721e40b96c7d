//! Periodic eviction of finished jobs.
//!
//! Runs in the background and drops terminal jobs once they are older than the
//! configured retention period.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{Duration, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::registry::JobRegistry;

/// Configuration for job eviction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JanitorConfig {
    /// Seconds between sweeps.
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,

    /// Seconds a finished job is kept after `completed_at`.
    /// Set to 0 to keep jobs for the life of the process.
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,
}

fn default_cleanup_interval_secs() -> u64 {
    300
}

fn default_retention_secs() -> u64 {
    3600
}

impl Default for JanitorConfig {
    fn default() -> Self {
        Self {
            cleanup_interval_secs: default_cleanup_interval_secs(),
            retention_secs: default_retention_secs(),
        }
    }
}

impl JanitorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cleanup_interval_secs(mut self, secs: u64) -> Self {
        self.cleanup_interval_secs = secs;
        self
    }

    pub fn with_retention_secs(mut self, secs: u64) -> Self {
        self.retention_secs = secs;
        self
    }
}

/// Evicts expired jobs from a [`JobRegistry`].
#[derive(Clone)]
pub struct Janitor {
    config: JanitorConfig,
    registry: Arc<JobRegistry>,
}

impl Janitor {
    pub fn new(config: JanitorConfig, registry: Arc<JobRegistry>) -> Self {
        Self { config, registry }
    }

    /// Run a single sweep. Returns the number of jobs removed.
    pub fn run_once(&self) -> usize {
        if self.config.retention_secs == 0 {
            debug!("Job eviction disabled (retention_secs = 0)");
            return 0;
        }

        // A retention beyond chrono's range reaches before any job existed.
        let Some(cutoff) = i64::try_from(self.config.retention_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .and_then(|retention| Utc::now().checked_sub_signed(retention))
        else {
            debug!(
                "Retention of {}s outlives every job, nothing to evict",
                self.config.retention_secs
            );
            return 0;
        };
        let removed = self.registry.remove_expired(cutoff);

        if removed > 0 {
            info!(
                "Evicted {} finished jobs (retention: {}s)",
                removed, self.config.retention_secs
            );
        } else {
            debug!("No jobs to evict");
        }
        removed
    }

    /// Start the background sweep loop.
    pub fn start(&self, cancellation_token: CancellationToken) -> JoinHandle<()> {
        let janitor = self.clone();

        tokio::spawn(async move {
            let period = Duration::from_secs(janitor.config.cleanup_interval_secs.max(1));
            let mut ticker = interval(period);
            // The first tick fires immediately and there is nothing to sweep yet.
            ticker.tick().await;

            info!(
                "Job janitor started (retention: {}s, interval: {}s)",
                janitor.config.retention_secs, janitor.config.cleanup_interval_secs
            );

            loop {
                tokio::select! {
                    _ = cancellation_token.cancelled() => {
                        info!("Job janitor shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        janitor.run_once();
                    }
                }
            }
        })
    }

    pub fn config(&self) -> &JanitorConfig {
        &self.config
    }
}
