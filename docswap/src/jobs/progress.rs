//! Progress reporting handle injected into running jobs.

use conversion_router::{EngineError, ProgressSink};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use super::registry::JobRegistry;
use crate::error::Aborted;

/// Lets a running conversion publish progress and notice cancellation.
///
/// Cheap to clone. Every clone refers to the same job.
#[derive(Clone)]
pub struct ProgressReporter {
    job_id: String,
    registry: Option<Arc<JobRegistry>>,
    token: CancellationToken,
    started: Instant,
    timeout: Option<Duration>,
}

impl ProgressReporter {
    pub(crate) fn new(
        job_id: impl Into<String>,
        registry: Arc<JobRegistry>,
        token: CancellationToken,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            registry: Some(registry),
            token,
            started: Instant::now(),
            timeout,
        }
    }

    /// A reporter attached to no job, for running tasks outside the pool.
    pub fn noop(job_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            registry: None,
            token: CancellationToken::new(),
            started: Instant::now(),
            timeout: None,
        }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Publish progress (clamped to 0-95) and an optional status message.
    ///
    /// An error means the job no longer wants the result and the task should
    /// stop.
    pub fn report(&self, progress: u8, message: Option<&str>) -> Result<(), Aborted> {
        self.check()?;
        match &self.registry {
            Some(registry) => registry.update_progress(&self.job_id, progress, message),
            None => Ok(()),
        }
    }

    /// Fails once the job is cancelled or past its deadline.
    pub fn check(&self) -> Result<(), Aborted> {
        if self.token.is_cancelled() {
            return Err(Aborted::Cancelled);
        }
        if self.timed_out() {
            return Err(Aborted::TimedOut {
                secs: self.timeout_secs(),
            });
        }
        Ok(())
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves when the job is cancelled.
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }

    /// Resolves when the job is cancelled or its deadline passes.
    pub async fn aborted(&self) -> Aborted {
        match self.timeout {
            Some(timeout) => {
                let deadline = tokio::time::Instant::from_std(self.started + timeout);
                tokio::select! {
                    _ = self.token.cancelled() => Aborted::Cancelled,
                    _ = tokio::time::sleep_until(deadline) => Aborted::TimedOut {
                        secs: timeout.as_secs(),
                    },
                }
            }
            None => {
                self.token.cancelled().await;
                Aborted::Cancelled
            }
        }
    }

    pub fn timed_out(&self) -> bool {
        self.timeout
            .is_some_and(|timeout| self.started.elapsed() >= timeout)
    }

    pub fn timeout_secs(&self) -> u64 {
        self.timeout.map_or(0, |timeout| timeout.as_secs())
    }

    /// Record which engine produced the output.
    pub fn set_engine(&self, engine: &str) {
        if let Some(registry) = &self.registry {
            registry.set_engine(&self.job_id, engine);
        }
    }
}

impl std::fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("job_id", &self.job_id)
            .field("attached", &self.registry.is_some())
            .field("cancelled", &self.token.is_cancelled())
            .finish()
    }
}

impl ProgressSink for ProgressReporter {
    fn report(&self, percent: u8, message: Option<&str>) -> conversion_router::Result<()> {
        ProgressReporter::report(self, percent, message)
            .map_err(|aborted| EngineError::Aborted(aborted.to_string()))
    }
}
