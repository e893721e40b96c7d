//! Conversion job system.
//!
//! A [`ConversionJobManager`] accepts submissions, keeps them in a
//! [`JobRegistry`], and runs them on a bounded [`WorkerPool`]. A [`Janitor`]
//! evicts finished jobs after the retention period.

pub mod estimate;
pub mod janitor;
pub mod job;
pub mod manager;
pub mod progress;
pub mod registry;
pub mod task;
pub mod worker_pool;

pub use estimate::estimate_duration;
pub use janitor::{Janitor, JanitorConfig};
pub use job::{ConversionSubmission, Job, JobSnapshot, JobStatus};
pub use manager::{ConversionJobManager, QueueStatus};
pub use progress::ProgressReporter;
pub use registry::{JobCounts, JobRegistry};
pub use task::{ConversionRequest, ConversionTask, blocking_task, router_task, task_fn};
pub use worker_pool::{WorkerPool, WorkerPoolConfig};
