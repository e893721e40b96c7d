//! Job record and lifecycle states.

use chrono::{DateTime, Utc};
use conversion_router::{ConversionOptions, normalize_format};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::estimate::estimate_duration;

pub const MSG_QUEUED: &str = "Conversion queued";
pub const MSG_STARTING: &str = "Starting conversion...";
pub const MSG_PREPARING: &str = "Preparing conversion...";
pub const MSG_PROCESSING: &str = "Processing file...";
pub const MSG_COMPLETED: &str = "Conversion completed successfully";
pub const MSG_CANCELLED: &str = "Conversion cancelled by user";
pub const MSG_FAILED: &str = "Conversion failed";
pub const ERR_NO_OUTPUT: &str = "Conversion function returned false or output file not created";

/// Progress a job reports when a worker picks it up.
pub const STARTING_PROGRESS: u8 = 5;
/// Stages a worker reports before handing the job to its task.
pub const PREPARING_PROGRESS: u8 = 10;
pub const PROCESSING_PROGRESS: u8 = 20;
/// Highest progress a running job may report; the rest is reserved for finalization.
pub const MAX_RUNNING_PROGRESS: u8 = 95;

/// Job status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Waiting for a free worker.
    Pending,
    /// Running on a worker.
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Processing)
                | (Self::Pending, Self::Cancelled)
                | (Self::Processing, Self::Completed)
                | (Self::Processing, Self::Failed)
                | (Self::Processing, Self::Cancelled)
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a caller asks to convert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionSubmission {
    pub session_id: String,
    pub file_id: String,
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub input_format: String,
    pub output_format: String,
    #[serde(default)]
    pub options: ConversionOptions,
}

impl ConversionSubmission {
    pub fn new(
        session_id: impl Into<String>,
        file_id: impl Into<String>,
        input_path: impl Into<PathBuf>,
        output_path: impl Into<PathBuf>,
        input_format: &str,
        output_format: &str,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            file_id: file_id.into(),
            input_path: input_path.into(),
            output_path: output_path.into(),
            input_format: input_format.to_string(),
            output_format: output_format.to_string(),
            options: ConversionOptions::new(),
        }
    }

    pub fn with_options(mut self, options: ConversionOptions) -> Self {
        self.options = options;
        self
    }
}

/// One conversion request and its lifecycle state.
///
/// The registry owns the live record; everything handed out is a copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub job_id: String,
    pub session_id: String,
    pub file_id: String,
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub input_format: String,
    pub output_format: String,
    pub options: ConversionOptions,
    pub status: JobStatus,
    /// 0-100.
    pub progress: u8,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    /// Input size in bytes at submission, 0 if the file was missing.
    pub file_size: u64,
    /// Advisory, in seconds.
    pub estimated_duration: u64,
    pub timeout_secs: u64,
    /// Engine that produced the output, when known.
    pub engine: Option<String>,
}

/// A read-only copy of a [`Job`] returned to callers.
pub type JobSnapshot = Job;

impl Job {
    /// Build a pending job, sizing the input from disk.
    pub fn new(submission: ConversionSubmission, timeout_secs: u64) -> Self {
        let file_size = std::fs::metadata(&submission.input_path)
            .map(|meta| meta.len())
            .unwrap_or(0);
        let input_format = normalize_format(&submission.input_format);
        let output_format = normalize_format(&submission.output_format);
        let estimated_duration = estimate_duration(file_size, &input_format, &output_format);

        Self {
            job_id: uuid::Uuid::new_v4().to_string(),
            session_id: submission.session_id,
            file_id: submission.file_id,
            input_path: submission.input_path,
            output_path: submission.output_path,
            input_format,
            output_format,
            options: submission.options,
            status: JobStatus::Pending,
            progress: 0,
            message: MSG_QUEUED.to_string(),
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            error: None,
            file_size,
            estimated_duration,
            timeout_secs,
            engine: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Seconds between start and completion, if both are known.
    pub fn duration_secs(&self) -> Option<f64> {
        let started = self.started_at?;
        let completed = self.completed_at?;
        Some((completed - started).num_milliseconds() as f64 / 1000.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn submission(input: PathBuf) -> ConversionSubmission {
        ConversionSubmission::new("session-1", "file-1", input, "/tmp/out.docx", "PDF", "Docx")
    }

    #[test]
    fn test_status_transitions() {
        use JobStatus::*;
        assert!(Pending.can_transition_to(Processing));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(Processing.can_transition_to(Completed));
        assert!(Processing.can_transition_to(Failed));
        assert!(Processing.can_transition_to(Cancelled));

        assert!(!Pending.can_transition_to(Completed));
        for terminal in [Completed, Failed, Cancelled] {
            assert!(terminal.is_terminal());
            for next in [Pending, Processing, Completed, Failed, Cancelled] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let json = serde_json::to_string(&JobStatus::Processing).unwrap();
        assert_eq!(json, "\"processing\"");
        assert_eq!(JobStatus::Cancelled.to_string(), "cancelled");
    }

    #[test]
    fn test_new_job_missing_input() {
        let job = Job::new(submission(PathBuf::from("/no/such/input.pdf")), 300);
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.progress, 0);
        assert_eq!(job.message, MSG_QUEUED);
        assert_eq!(job.file_size, 0);
        assert_eq!(job.input_format, "pdf");
        assert_eq!(job.output_format, "docx");
        assert_eq!(job.estimated_duration, 5);
        assert!(job.started_at.is_none());
        assert!(uuid::Uuid::parse_str(&job.job_id).is_ok());
    }

    #[test]
    fn test_new_job_reads_file_size() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("in.pdf");
        std::fs::write(&input, vec![0u8; 2048]).unwrap();

        let job = Job::new(submission(input), 60);
        assert_eq!(job.file_size, 2048);
        assert_eq!(job.timeout_secs, 60);
    }

    #[test]
    fn test_job_ids_unique() {
        let a = Job::new(submission(PathBuf::from("/x")), 1);
        let b = Job::new(submission(PathBuf::from("/x")), 1);
        assert_ne!(a.job_id, b.job_id);
    }
}
