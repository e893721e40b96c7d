//! Conversion functions run by the worker pool.

use conversion_router::{ConversionOptions, ConversionRouter, EngineRequest, FailureKind};
use futures::FutureExt;
use futures::future::BoxFuture;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

use super::job::Job;
use super::progress::ProgressReporter;
use crate::error::{Aborted, TaskError};

/// Everything a conversion task gets to work with.
#[derive(Debug, Clone)]
pub struct ConversionRequest {
    pub job_id: String,
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub input_format: String,
    pub output_format: String,
    /// Caller options plus `file_size` and `is_large_file`.
    pub options: ConversionOptions,
    pub reporter: ProgressReporter,
}

impl ConversionRequest {
    pub(crate) fn from_job(job: &Job, reporter: ProgressReporter) -> Self {
        Self {
            job_id: job.job_id.clone(),
            input_path: job.input_path.clone(),
            output_path: job.output_path.clone(),
            input_format: job.input_format.clone(),
            output_format: job.output_format.clone(),
            options: job.options.clone(),
            reporter,
        }
    }
}

/// A conversion function.
///
/// `Ok(true)` claims success; the worker still verifies the output file.
pub type ConversionTask =
    Arc<dyn Fn(ConversionRequest) -> BoxFuture<'static, Result<bool, TaskError>> + Send + Sync>;

/// Wrap an async closure.
pub fn task_fn<F, Fut>(f: F) -> ConversionTask
where
    F: Fn(ConversionRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<bool, TaskError>> + Send + 'static,
{
    Arc::new(move |request: ConversionRequest| f(request).boxed())
}

/// Wrap a synchronous closure; it runs on the blocking thread pool.
pub fn blocking_task<F>(f: F) -> ConversionTask
where
    F: Fn(ConversionRequest) -> Result<bool, TaskError> + Send + Sync + 'static,
{
    let f = Arc::new(f);
    Arc::new(move |request: ConversionRequest| {
        let f = f.clone();
        async move {
            tokio::task::spawn_blocking(move || f(request))
                .await
                .map_err(|e| TaskError::other(format!("Conversion task failed: {e}")))?
        }
        .boxed()
    })
}

/// Delegate to a [`ConversionRouter`], forwarding progress and cancellation.
pub fn router_task(router: Arc<ConversionRouter>) -> ConversionTask {
    Arc::new(move |request: ConversionRequest| {
        let router = router.clone();
        async move {
            let reporter = request.reporter.clone();
            let engine_request = EngineRequest::new(
                request.input_path,
                request.output_path,
                &request.input_format,
                &request.output_format,
            )
            .with_options(request.options)
            .with_progress(Arc::new(reporter.clone()));

            let outcome = router.convert_request(&engine_request).await;
            if outcome.success {
                if let Some(engine) = &outcome.engine {
                    reporter.set_engine(engine);
                }
                return Ok(true);
            }

            debug!(
                job_id = %request.job_id,
                attempted = ?outcome.attempted_engines,
                "Routed conversion failed"
            );
            match outcome.failure {
                Some(FailureKind::Aborted) => Err(reporter
                    .check()
                    .err()
                    .unwrap_or(Aborted::Cancelled)
                    .into()),
                _ => Err(TaskError::other(
                    outcome
                        .error
                        .unwrap_or_else(|| "Conversion failed".to_string()),
                )),
            }
        }
        .boxed()
    })
}
