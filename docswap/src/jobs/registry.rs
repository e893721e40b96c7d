//! In-memory job registry.
//!
//! All job state lives behind one mutex. It is held only for metadata reads
//! and writes, never across conversion work.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::job::{
    Job, JobSnapshot, JobStatus, MAX_RUNNING_PROGRESS, MSG_CANCELLED, MSG_COMPLETED, MSG_FAILED,
    MSG_STARTING, STARTING_PROGRESS,
};
use super::task::ConversionTask;
use crate::error::{Aborted, Error, Result};

/// Per-status job counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobCounts {
    pub total: usize,
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
}

/// How a worker wants a finished job recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Finalization {
    Completed,
    Failed(String),
}

/// A job handed to a worker by [`JobRegistry::claim_next`].
pub struct ClaimedJob {
    pub job: Job,
    pub token: CancellationToken,
    pub task: ConversionTask,
}

struct JobEntry {
    job: Job,
    /// Submission order, breaks `created_at` ties.
    seq: u64,
    token: CancellationToken,
    /// Taken by the worker that claims the job.
    task: Option<ConversionTask>,
}

#[derive(Default)]
struct RegistryState {
    jobs: HashMap<String, JobEntry>,
    next_seq: u64,
}

impl RegistryState {
    fn pending_in_order(&self) -> Vec<&JobEntry> {
        let mut pending: Vec<&JobEntry> = self
            .jobs
            .values()
            .filter(|entry| entry.job.status == JobStatus::Pending)
            .collect();
        pending.sort_by_key(|entry| (entry.job.created_at, entry.seq));
        pending
    }
}

fn transition(job: &mut Job, to: JobStatus) -> Result<()> {
    if job.status.can_transition_to(to) {
        job.status = to;
        Ok(())
    } else {
        warn!(
            job_id = %job.job_id,
            "Rejected transition from {} to {}",
            job.status,
            to
        );
        Err(Error::invalid_transition(job.status, to))
    }
}

/// Shared store of every tracked job.
pub struct JobRegistry {
    state: Mutex<RegistryState>,
    /// Wakes idle workers when a job is submitted.
    notify: Arc<Notify>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RegistryState::default()),
            notify: Arc::new(Notify::new()),
        }
    }

    pub fn notifier(&self) -> Arc<Notify> {
        self.notify.clone()
    }

    /// Insert a pending job and wake a worker.
    pub fn submit(&self, job: Job, task: ConversionTask) -> String {
        let job_id = job.job_id.clone();
        {
            let mut state = self.state.lock();
            let seq = state.next_seq;
            state.next_seq += 1;
            state.jobs.insert(
                job_id.clone(),
                JobEntry {
                    job,
                    seq,
                    token: CancellationToken::new(),
                    task: Some(task),
                },
            );
        }

        debug!(job_id = %job_id, "Job queued");
        self.notify.notify_one();
        job_id
    }

    pub fn get(&self, job_id: &str) -> Option<JobSnapshot> {
        self.state.lock().jobs.get(job_id).map(|e| e.job.clone())
    }

    /// Cancel a pending or processing job.
    pub fn try_cancel(&self, job_id: &str) -> Result<JobSnapshot> {
        let mut state = self.state.lock();
        let entry = state
            .jobs
            .get_mut(job_id)
            .ok_or_else(|| Error::not_found("Job", job_id))?;

        if entry.job.is_terminal() {
            return Err(Error::NotCancelable {
                id: job_id.to_string(),
                status: entry.job.status.to_string(),
            });
        }

        transition(&mut entry.job, JobStatus::Cancelled)?;
        entry.job.message = MSG_CANCELLED.to_string();
        entry.job.completed_at = Some(Utc::now());
        // A pending job's task will never run.
        entry.task = None;
        entry.token.cancel();

        info!(job_id = %job_id, "Job cancelled");
        Ok(entry.job.clone())
    }

    /// Returns false for unknown or already finished jobs.
    pub fn cancel(&self, job_id: &str) -> bool {
        match self.try_cancel(job_id) {
            Ok(_) => true,
            Err(e) => {
                debug!(job_id = %job_id, "Cancel ignored: {}", e);
                false
            }
        }
    }

    /// Jobs of one session, oldest first.
    pub fn list_for_session(&self, session_id: &str) -> Vec<JobSnapshot> {
        let state = self.state.lock();
        let mut entries: Vec<&JobEntry> = state
            .jobs
            .values()
            .filter(|entry| entry.job.session_id == session_id)
            .collect();
        entries.sort_by_key(|entry| (entry.job.created_at, entry.seq));
        entries.into_iter().map(|entry| entry.job.clone()).collect()
    }

    /// 1-based rank among pending jobs, or 0 when the job is not pending.
    pub fn queue_position(&self, job_id: &str) -> usize {
        let state = self.state.lock();
        state
            .pending_in_order()
            .iter()
            .position(|entry| entry.job.job_id == job_id)
            .map_or(0, |index| index + 1)
    }

    pub fn stats(&self) -> JobCounts {
        let state = self.state.lock();
        let mut counts = JobCounts {
            total: state.jobs.len(),
            ..JobCounts::default()
        };
        for entry in state.jobs.values() {
            match entry.job.status {
                JobStatus::Pending => counts.pending += 1,
                JobStatus::Processing => counts.processing += 1,
                JobStatus::Completed => counts.completed += 1,
                JobStatus::Failed => counts.failed += 1,
                JobStatus::Cancelled => counts.cancelled += 1,
            }
        }
        counts
    }

    pub fn len(&self) -> usize {
        self.state.lock().jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop jobs that finished before `cutoff`. Jobs without `completed_at` stay.
    pub fn remove_expired(&self, cutoff: DateTime<Utc>) -> usize {
        let mut state = self.state.lock();
        let before = state.jobs.len();
        state.jobs.retain(|_, entry| {
            !matches!(entry.job.completed_at, Some(completed_at) if completed_at < cutoff)
        });
        before - state.jobs.len()
    }

    /// Move the oldest pending job to processing.
    pub fn claim_next(&self) -> Option<ClaimedJob> {
        let mut state = self.state.lock();
        let job_id = state.pending_in_order().first()?.job.job_id.clone();
        let entry = state.jobs.get_mut(&job_id)?;
        let task = entry.task.take()?;

        transition(&mut entry.job, JobStatus::Processing).ok()?;
        entry.job.started_at = Some(Utc::now());
        entry.job.progress = STARTING_PROGRESS;
        entry.job.message = MSG_STARTING.to_string();

        Some(ClaimedJob {
            job: entry.job.clone(),
            token: entry.token.clone(),
            task,
        })
    }

    /// Record progress for a running job.
    ///
    /// Progress is clamped to the running range and never goes backwards.
    pub fn update_progress(
        &self,
        job_id: &str,
        progress: u8,
        message: Option<&str>,
    ) -> std::result::Result<(), Aborted> {
        let mut state = self.state.lock();
        let Some(entry) = state.jobs.get_mut(job_id) else {
            return Err(Aborted::Cancelled);
        };
        if entry.job.status != JobStatus::Processing {
            return Err(Aborted::Cancelled);
        }

        let clamped = progress.min(MAX_RUNNING_PROGRESS);
        entry.job.progress = entry.job.progress.max(clamped);
        if let Some(message) = message {
            entry.job.message = message.to_string();
        }
        Ok(())
    }

    pub fn set_engine(&self, job_id: &str, engine: &str) {
        if let Some(entry) = self.state.lock().jobs.get_mut(job_id) {
            entry.job.engine = Some(engine.to_string());
        }
    }

    /// Record the outcome of a processing job.
    ///
    /// A job cancelled while its task ran stays cancelled; the returned status
    /// tells the worker what was kept.
    pub fn finish(&self, job_id: &str, finalization: Finalization) -> Result<JobStatus> {
        let mut state = self.state.lock();
        let entry = state
            .jobs
            .get_mut(job_id)
            .ok_or_else(|| Error::not_found("Job", job_id))?;

        if entry.job.status == JobStatus::Cancelled {
            return Ok(JobStatus::Cancelled);
        }

        let job = &mut entry.job;
        match finalization {
            Finalization::Completed => {
                transition(job, JobStatus::Completed)?;
                job.progress = 100;
                job.message = MSG_COMPLETED.to_string();
                job.error = None;
            }
            Finalization::Failed(error) => {
                transition(job, JobStatus::Failed)?;
                job.progress = 0;
                job.message = MSG_FAILED.to_string();
                job.error = Some(error);
            }
        }
        job.completed_at = Some(Utc::now());
        Ok(job.status)
    }
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::job::ConversionSubmission;
    use crate::jobs::task::task_fn;

    fn noop_task() -> ConversionTask {
        task_fn(|_request| async { Ok(true) })
    }

    fn job(session: &str) -> Job {
        Job::new(
            ConversionSubmission::new(session, "f", "/in.pdf", "/out.txt", "pdf", "txt"),
            300,
        )
    }

    #[test]
    fn test_submit_and_get() {
        let registry = JobRegistry::new();
        let id = registry.submit(job("s"), noop_task());

        let snapshot = registry.get(&id).unwrap();
        assert_eq!(snapshot.status, JobStatus::Pending);
        assert_eq!(registry.queue_position(&id), 1);
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn test_claim_is_fifo_and_sets_start_state() {
        let registry = JobRegistry::new();
        let first = registry.submit(job("s"), noop_task());
        let second = registry.submit(job("s"), noop_task());

        let claimed = registry.claim_next().unwrap();
        assert_eq!(claimed.job.job_id, first);
        assert_eq!(claimed.job.status, JobStatus::Processing);
        assert_eq!(claimed.job.progress, STARTING_PROGRESS);
        assert_eq!(claimed.job.message, MSG_STARTING);
        assert!(claimed.job.started_at.is_some());

        assert_eq!(registry.queue_position(&first), 0);
        assert_eq!(registry.queue_position(&second), 1);
    }

    #[test]
    fn test_cancel_pending_is_never_claimed() {
        let registry = JobRegistry::new();
        let id = registry.submit(job("s"), noop_task());

        assert!(registry.cancel(&id));
        assert!(registry.claim_next().is_none());

        let snapshot = registry.get(&id).unwrap();
        assert_eq!(snapshot.status, JobStatus::Cancelled);
        assert_eq!(snapshot.message, MSG_CANCELLED);
        assert!(snapshot.completed_at.is_some());
    }

    #[test]
    fn test_cancel_terminal_or_unknown() {
        let registry = JobRegistry::new();
        let id = registry.submit(job("s"), noop_task());
        registry.claim_next().unwrap();
        registry.finish(&id, Finalization::Completed).unwrap();
        let before = registry.get(&id).unwrap();

        assert!(!registry.cancel(&id));
        assert!(!registry.cancel("unknown"));
        assert_eq!(registry.get(&id).unwrap(), before);

        assert!(matches!(
            registry.try_cancel(&id),
            Err(Error::NotCancelable { .. })
        ));
        assert!(matches!(
            registry.try_cancel("unknown"),
            Err(Error::NotFound { .. })
        ));
    }

    #[test]
    fn test_cancel_fires_token() {
        let registry = JobRegistry::new();
        let id = registry.submit(job("s"), noop_task());
        let claimed = registry.claim_next().unwrap();

        assert!(!claimed.token.is_cancelled());
        assert!(registry.cancel(&id));
        assert!(claimed.token.is_cancelled());
        assert_eq!(
            registry.finish(&id, Finalization::Completed).unwrap(),
            JobStatus::Cancelled
        );
    }

    #[test]
    fn test_progress_clamped_and_monotonic() {
        let registry = JobRegistry::new();
        let id = registry.submit(job("s"), noop_task());

        // Not running yet.
        assert_eq!(
            registry.update_progress(&id, 10, None),
            Err(Aborted::Cancelled)
        );

        registry.claim_next().unwrap();
        registry.update_progress(&id, 40, Some("Rendering")).unwrap();
        registry.update_progress(&id, 20, None).unwrap();
        let snapshot = registry.get(&id).unwrap();
        assert_eq!(snapshot.progress, 40);
        assert_eq!(snapshot.message, "Rendering");

        registry.update_progress(&id, 250, None).unwrap();
        assert_eq!(registry.get(&id).unwrap().progress, MAX_RUNNING_PROGRESS);
    }

    #[test]
    fn test_finish_states() {
        let registry = JobRegistry::new();
        let ok = registry.submit(job("s"), noop_task());
        let bad = registry.submit(job("s"), noop_task());
        registry.claim_next().unwrap();
        registry.claim_next().unwrap();

        registry.finish(&ok, Finalization::Completed).unwrap();
        registry
            .finish(&bad, Finalization::Failed("boom".into()))
            .unwrap();

        let ok = registry.get(&ok).unwrap();
        assert_eq!((ok.status, ok.progress), (JobStatus::Completed, 100));
        let bad = registry.get(&bad).unwrap();
        assert_eq!((bad.status, bad.progress), (JobStatus::Failed, 0));
        assert_eq!(bad.error.as_deref(), Some("boom"));

        // Terminal states never change again.
        assert!(matches!(
            registry.finish(&bad.job_id, Finalization::Completed),
            Err(Error::InvalidStateTransition { .. })
        ));
    }

    #[test]
    fn test_list_for_session_in_creation_order() {
        let registry = JobRegistry::new();
        let a = registry.submit(job("alpha"), noop_task());
        let _ = registry.submit(job("beta"), noop_task());
        let b = registry.submit(job("alpha"), noop_task());

        let ids: Vec<String> = registry
            .list_for_session("alpha")
            .into_iter()
            .map(|j| j.job_id)
            .collect();
        assert_eq!(ids, vec![a, b]);
        assert!(registry.list_for_session("gamma").is_empty());
    }

    #[test]
    fn test_stats_and_remove_expired() {
        let registry = JobRegistry::new();
        let done = registry.submit(job("s"), noop_task());
        let pending = registry.submit(job("s"), noop_task());
        registry.claim_next().unwrap();
        registry.finish(&done, Finalization::Completed).unwrap();

        let counts = registry.stats();
        assert_eq!(counts.total, 2);
        assert_eq!(counts.completed, 1);
        assert_eq!(counts.pending, 1);

        // Cutoff before completion keeps everything.
        assert_eq!(
            registry.remove_expired(Utc::now() - chrono::Duration::hours(1)),
            0
        );
        // Pending jobs have no completed_at and survive any cutoff.
        assert_eq!(
            registry.remove_expired(Utc::now() + chrono::Duration::seconds(1)),
            1
        );
        assert!(registry.get(&done).is_none());
        assert!(registry.get(&pending).is_some());
    }
}
