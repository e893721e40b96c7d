//! Bounded pool of workers running conversion tasks.

use serde::{Deserialize, Serialize};
use std::any::Any;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::job::{
    ERR_NO_OUTPUT, JobStatus, MSG_PREPARING, MSG_PROCESSING, PREPARING_PROGRESS,
    PROCESSING_PROGRESS,
};
use super::progress::ProgressReporter;
use super::registry::{ClaimedJob, Finalization, JobRegistry};
use super::task::ConversionRequest;
use crate::error::{Aborted, TaskError};

fn default_max_workers() -> usize {
    3
}

fn default_job_timeout_secs() -> u64 {
    300
}

fn default_poll_interval_ms() -> u64 {
    100
}

/// Configuration for a worker pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerPoolConfig {
    /// Maximum concurrent conversions.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    /// Per-job timeout in seconds, 0 for no deadline.
    ///
    /// Enforced cooperatively: once it passes, the job's reporter refuses
    /// further progress. A task that never reports is left to finish.
    #[serde(default = "default_job_timeout_secs")]
    pub job_timeout_secs: u64,
    /// How often idle workers look for work without a wakeup.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            job_timeout_secs: default_job_timeout_secs(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl WorkerPoolConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers;
        self
    }

    pub fn with_job_timeout_secs(mut self, secs: u64) -> Self {
        self.job_timeout_secs = secs;
        self
    }

    pub fn with_poll_interval_ms(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms;
        self
    }
}

/// A worker pool pulling pending jobs from a [`JobRegistry`].
pub struct WorkerPool {
    config: WorkerPoolConfig,
    /// Workers currently running a task.
    active_workers: Arc<AtomicUsize>,
    cancellation_token: CancellationToken,
    tasks: parking_lot::Mutex<Option<JoinSet<()>>>,
}

impl WorkerPool {
    pub fn new() -> Self {
        Self::with_config(WorkerPoolConfig::default())
    }

    pub fn with_config(config: WorkerPoolConfig) -> Self {
        Self {
            config,
            active_workers: Arc::new(AtomicUsize::new(0)),
            cancellation_token: CancellationToken::new(),
            tasks: parking_lot::Mutex::new(Some(JoinSet::new())),
        }
    }

    /// Spawn the worker loops. Must be called inside a tokio runtime.
    pub fn start(&self, registry: Arc<JobRegistry>) {
        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);
        let job_timeout = timeout_from_secs(self.config.job_timeout_secs);

        info!(
            "Starting conversion worker pool with {} max workers",
            self.config.max_workers
        );

        let mut tasks = self.tasks.lock();
        let Some(join_set) = tasks.as_mut() else {
            warn!("Worker pool already stopped, not starting");
            return;
        };

        for i in 0..self.config.max_workers {
            let registry = registry.clone();
            let cancellation_token = self.cancellation_token.clone();
            let active_workers = self.active_workers.clone();
            let notifier = registry.notifier();

            join_set.spawn(async move {
                debug!("Conversion worker {} started", i);

                loop {
                    if cancellation_token.is_cancelled() {
                        break;
                    }

                    let Some(claimed) = registry.claim_next() else {
                        tokio::select! {
                            _ = cancellation_token.cancelled() => break,
                            _ = notifier.notified() => {}
                            _ = tokio::time::sleep(poll_interval) => {}
                        }
                        continue;
                    };

                    active_workers.fetch_add(1, Ordering::SeqCst);
                    debug!(
                        "Conversion worker {} processing job {}",
                        i, claimed.job.job_id
                    );
                    run_job(&registry, claimed, job_timeout).await;
                    active_workers.fetch_sub(1, Ordering::SeqCst);
                }

                debug!("Conversion worker {} shutting down", i);
            });
        }
    }

    /// Stop the worker pool and wait for every worker to exit.
    ///
    /// Running tasks are allowed to finish first.
    pub async fn stop(&self) {
        info!("Stopping conversion worker pool");
        self.cancellation_token.cancel();

        let join_set = {
            let mut tasks = self.tasks.lock();
            tasks.take()
        };

        if let Some(mut join_set) = join_set {
            while join_set.join_next().await.is_some() {}
        }

        info!("Conversion worker pool stopped");
    }

    pub fn active_count(&self) -> usize {
        self.active_workers.load(Ordering::SeqCst)
    }

    pub fn max_workers(&self) -> usize {
        self.config.max_workers
    }

    pub fn config(&self) -> &WorkerPoolConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        !self.cancellation_token.is_cancelled()
    }
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new()
    }
}

/// 0 means no deadline.
fn timeout_from_secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

/// Run one claimed job to a terminal state.
async fn run_job(
    registry: &Arc<JobRegistry>,
    claimed: ClaimedJob,
    job_timeout: Option<Duration>,
) {
    let ClaimedJob { job, token, task } = claimed;
    let job_id = job.job_id.clone();
    let output_path = job.output_path.clone();

    let timeout = timeout_from_secs(job.timeout_secs).or(job_timeout);
    let reporter = ProgressReporter::new(&job_id, registry.clone(), token, timeout);
    let request = ConversionRequest::from_job(&job, reporter.clone());

    let result = match prepare(&reporter) {
        Ok(()) => {
            // Call the task from inside the spawned task so a panic while
            // building the future is contained too.
            match tokio::spawn(async move { task(request).await }).await {
                Ok(result) => result,
                Err(e) if e.is_panic() => Err(TaskError::other(format!(
                    "Conversion task panicked: {}",
                    panic_message(e.into_panic().as_ref())
                ))),
                Err(e) => Err(TaskError::other(format!("Conversion task failed: {e}"))),
            }
        }
        Err(aborted) => Err(aborted.into()),
    };

    let finalization = match result {
        Ok(true) => match output_size(&output_path).await {
            Some(_) => Finalization::Completed,
            None => Finalization::Failed(ERR_NO_OUTPUT.to_string()),
        },
        Ok(false) => Finalization::Failed(ERR_NO_OUTPUT.to_string()),
        Err(e) => {
            if reporter.timed_out() || matches!(e, TaskError::Aborted(Aborted::TimedOut { .. })) {
                Finalization::Failed(
                    Aborted::TimedOut {
                        secs: reporter.timeout_secs(),
                    }
                    .to_string(),
                )
            } else {
                Finalization::Failed(e.to_string())
            }
        }
    };

    match registry.finish(&job_id, finalization.clone()) {
        Ok(JobStatus::Completed) => {
            info!(
                job_id = %job_id,
                "Conversion completed in {:.2}s",
                reporter.elapsed().as_secs_f64()
            );
        }
        Ok(JobStatus::Cancelled) => {
            info!(job_id = %job_id, "Conversion cancelled while running");
            remove_output(&output_path).await;
        }
        Ok(status) => {
            if let Finalization::Failed(error) = &finalization {
                warn!(job_id = %job_id, status = %status, "Conversion failed: {}", error);
            }
            remove_output(&output_path).await;
        }
        Err(e) => {
            error!(job_id = %job_id, "Failed to record job outcome: {}", e);
        }
    }
}

fn prepare(reporter: &ProgressReporter) -> Result<(), Aborted> {
    reporter.report(PREPARING_PROGRESS, Some(MSG_PREPARING))?;
    reporter.report(PROCESSING_PROGRESS, Some(MSG_PROCESSING))
}

async fn output_size(path: &Path) -> Option<u64> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() && meta.len() > 0 => Some(meta.len()),
        _ => None,
    }
}

/// Remove a partial or unwanted output file.
async fn remove_output(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!("Cleaned up output: {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to clean up output {}: {}", path.display(), e),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_pool_config_default() {
        let config = WorkerPoolConfig::default();
        assert_eq!(config.max_workers, 3);
        assert_eq!(config.job_timeout_secs, 300);
        assert_eq!(config.poll_interval_ms, 100);
    }

    #[test]
    fn test_worker_pool_config_builder() {
        let config = WorkerPoolConfig::new()
            .with_max_workers(8)
            .with_job_timeout_secs(30)
            .with_poll_interval_ms(10);
        assert_eq!(config.max_workers, 8);
        assert_eq!(config.job_timeout_secs, 30);
        assert_eq!(config.poll_interval_ms, 10);
    }

    #[test]
    fn test_worker_pool_config_serde_defaults() {
        let config: WorkerPoolConfig = serde_json::from_str(r#"{"max_workers": 1}"#).unwrap();
        assert_eq!(config.max_workers, 1);
        assert_eq!(config.job_timeout_secs, 300);
    }

    #[test]
    fn test_worker_pool_creation() {
        let pool = WorkerPool::new();
        assert!(pool.is_running());
        assert_eq!(pool.active_count(), 0);
        assert_eq!(pool.max_workers(), 3);
    }

    #[tokio::test]
    async fn test_stop_without_start() {
        let pool = WorkerPool::new();
        pool.stop().await;
        assert!(!pool.is_running());
    }

    #[test]
    fn test_zero_timeout_means_no_deadline() {
        assert_eq!(timeout_from_secs(0), None);
        assert_eq!(timeout_from_secs(30), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_panic_message() {
        let boxed: Box<dyn Any + Send> = Box::new(String::from("bad pdf"));
        assert_eq!(panic_message(boxed.as_ref()), "bad pdf");
    }
}
