//! docswap: asynchronous document-conversion jobs.
//!
//! Callers submit a conversion together with the function that performs it and
//! get a job id back immediately. A bounded pool of workers runs the jobs,
//! tracking status and progress, and honouring cancellation between progress
//! reports. Finished jobs are evicted after a retention period.
//!
//! ```no_run
//! use std::sync::Arc;
//! use conversion_router::{ConversionRouter, TextEngine};
//! use docswap::{ConversionJobManager, ConversionSubmission, ManagerConfig, router_task};
//!
//! # async fn demo() -> docswap::Result<()> {
//! let router = Arc::new(ConversionRouter::builder().engine(TextEngine::new()).build());
//! let manager = ConversionJobManager::new(ManagerConfig::default())?;
//!
//! let submission =
//!     ConversionSubmission::new("session", "file", "notes.txt", "notes.html", "txt", "html");
//! let job_id = manager.submit_conversion(submission, router_task(router))?;
//! println!("{:?}", manager.get_job_status(&job_id));
//!
//! manager.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod jobs;
pub mod logging;

pub use config::ManagerConfig;
pub use error::{Aborted, Error, Result, TaskError};
pub use jobs::{
    ConversionJobManager, ConversionRequest, ConversionSubmission, ConversionTask, Janitor,
    JanitorConfig, Job, JobSnapshot, JobStatus, ProgressReporter, QueueStatus, WorkerPoolConfig,
    blocking_task, estimate_duration, router_task, task_fn,
};
pub use logging::{LoggingOptions, init_logging};
