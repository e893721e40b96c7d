//! Facade tying the registry, worker pool and janitor together.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::janitor::Janitor;
use super::job::{ConversionSubmission, Job, JobSnapshot};
use super::registry::JobRegistry;
use super::task::ConversionTask;
use super::worker_pool::WorkerPool;
use crate::config::ManagerConfig;
use crate::error::{Error, Result};

/// Queue-wide counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStatus {
    pub total: usize,
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub max_workers: usize,
    pub active_workers: usize,
}

/// Accepts conversion jobs and runs them in the background.
pub struct ConversionJobManager {
    config: ManagerConfig,
    registry: Arc<JobRegistry>,
    pool: WorkerPool,
    janitor_token: CancellationToken,
    janitor_handle: parking_lot::Mutex<Option<JoinHandle<()>>>,
    shutting_down: AtomicBool,
}

impl ConversionJobManager {
    /// Create a manager and start its workers. Must be called inside a tokio
    /// runtime.
    pub fn new(config: ManagerConfig) -> Result<Self> {
        config.validate()?;
        let registry = Arc::new(JobRegistry::new());

        let pool = WorkerPool::with_config(config.worker_pool.clone());
        pool.start(registry.clone());

        let janitor_token = CancellationToken::new();
        let janitor = Janitor::new(config.janitor.clone(), registry.clone());
        let janitor_handle = janitor.start(janitor_token.clone());

        info!(
            max_workers = config.worker_pool.max_workers,
            job_timeout_secs = config.worker_pool.job_timeout_secs,
            "Conversion job manager started"
        );

        Ok(Self {
            config,
            registry,
            pool,
            janitor_token,
            janitor_handle: parking_lot::Mutex::new(Some(janitor_handle)),
            shutting_down: AtomicBool::new(false),
        })
    }

    /// Queue a conversion and return its job id without waiting for it.
    ///
    /// The task receives the caller's options plus `file_size` and
    /// `is_large_file`.
    pub fn submit_conversion(
        &self,
        submission: ConversionSubmission,
        task: ConversionTask,
    ) -> Result<String> {
        if self.shutting_down.load(Ordering::SeqCst) {
            return Err(Error::ShuttingDown);
        }
        if submission.input_format.trim().is_empty() {
            return Err(Error::validation("input format must not be empty"));
        }
        if submission.output_format.trim().is_empty() {
            return Err(Error::validation("output format must not be empty"));
        }

        let mut job = Job::new(submission, self.config.worker_pool.job_timeout_secs);
        let is_large_file = job.file_size > self.config.large_file_threshold_bytes;
        job.options
            .insert("file_size".to_string(), Value::from(job.file_size));
        job.options
            .insert("is_large_file".to_string(), Value::Bool(is_large_file));

        info!(
            job_id = %job.job_id,
            session_id = %job.session_id,
            "Queued {} -> {} conversion ({} bytes, ~{}s)",
            job.input_format,
            job.output_format,
            job.file_size,
            job.estimated_duration
        );

        Ok(self.registry.submit(job, task))
    }

    pub fn get_job_status(&self, job_id: &str) -> Option<JobSnapshot> {
        self.registry.get(job_id)
    }

    /// 1-based position among pending jobs, 0 when not pending.
    pub fn get_queue_position(&self, job_id: &str) -> usize {
        self.registry.queue_position(job_id)
    }

    pub fn cancel_job(&self, job_id: &str) -> bool {
        self.registry.cancel(job_id)
    }

    pub fn get_session_jobs(&self, session_id: &str) -> Vec<JobSnapshot> {
        self.registry.list_for_session(session_id)
    }

    pub fn get_queue_status(&self) -> QueueStatus {
        let counts = self.registry.stats();
        QueueStatus {
            total: counts.total,
            pending: counts.pending,
            processing: counts.processing,
            completed: counts.completed,
            failed: counts.failed,
            cancelled: counts.cancelled,
            max_workers: self.pool.max_workers(),
            active_workers: self.pool.active_count(),
        }
    }

    /// Stop accepting jobs, let running tasks finish, and stop background work.
    ///
    /// Jobs still pending stay pending.
    pub async fn shutdown(&self) {
        if self.shutting_down.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Shutting down conversion job manager");

        self.pool.stop().await;
        self.janitor_token.cancel();

        let handle = self.janitor_handle.lock().take();
        if let Some(handle) = handle
            && let Err(e) = handle.await
        {
            warn!("Job janitor ended abnormally: {}", e);
        }

        info!("Conversion job manager stopped");
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::task::task_fn;

    #[tokio::test]
    async fn test_empty_format_rejected() {
        let manager = ConversionJobManager::new(ManagerConfig::default()).unwrap();
        let submission = ConversionSubmission::new("s", "f", "/in", "/out", "", "pdf");

        let err = manager
            .submit_conversion(submission, task_fn(|_| async { Ok(true) }))
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(manager.get_queue_status().total, 0);
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_submit_after_shutdown() {
        let manager = ConversionJobManager::new(ManagerConfig::default()).unwrap();
        manager.shutdown().await;
        assert!(manager.is_shutting_down());

        let submission = ConversionSubmission::new("s", "f", "/in", "/out", "txt", "html");
        let err = manager
            .submit_conversion(submission, task_fn(|_| async { Ok(true) }))
            .unwrap_err();
        assert!(matches!(err, Error::ShuttingDown));
    }

    #[tokio::test]
    async fn test_queue_status_reports_pool_size() {
        let config = ManagerConfig::default();
        let manager = ConversionJobManager::new(config.clone()).unwrap();
        let status = manager.get_queue_status();
        assert_eq!(status.max_workers, config.worker_pool.max_workers);
        assert_eq!(status.active_workers, 0);
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_zero_workers_rejected() {
        let config = ManagerConfig::default()
            .with_worker_pool(crate::jobs::WorkerPoolConfig::new().with_max_workers(0));
        let err = ConversionJobManager::new(config).err().unwrap();
        assert!(matches!(err, Error::Configuration(_)));
    }
}
