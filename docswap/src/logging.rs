//! Logging bootstrap for binaries embedding the job system.
//!
//! Console output always; an optional daily-rotated log file when a directory
//! is given. Timestamps use the local timezone.

use chrono::Local;
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::Writer, time::FormatTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

use crate::error::{Error, Result};

/// Default log filter directive.
pub const DEFAULT_LOG_FILTER: &str = "docswap=info,conversion_router=info";

/// File name prefix for rotated log files.
const LOG_FILE_NAME: &str = "docswap.log";

#[derive(Debug, Clone, Copy)]
struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        let now = Local::now();
        write!(w, "{}", now.format("%Y-%m-%dT%H:%M:%S%.3f%:z"))
    }
}

/// How to set up logging.
#[derive(Debug, Clone, Default)]
pub struct LoggingOptions {
    /// Explicit filter directive. Falls back to `RUST_LOG`, then
    /// [`DEFAULT_LOG_FILTER`].
    pub filter: Option<String>,
    /// Log at debug level.
    pub verbose: bool,
    /// Only log errors. Wins over `verbose`.
    pub quiet: bool,
    /// Emit JSON lines on the console.
    pub json: bool,
    /// Also write to a daily-rotated file in this directory.
    pub log_dir: Option<PathBuf>,
}

impl LoggingOptions {
    fn env_filter(&self) -> Result<EnvFilter> {
        if self.quiet {
            return Ok(EnvFilter::new("error"));
        }
        if self.verbose {
            return Ok(EnvFilter::new("debug"));
        }
        match &self.filter {
            Some(directive) => EnvFilter::try_new(directive)
                .map_err(|e| Error::config(format!("Invalid log filter '{directive}': {e}"))),
            None => Ok(EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))),
        }
    }
}

/// Install the global subscriber.
///
/// Keep the returned guard alive for as long as file logging should flush.
pub fn init_logging(options: &LoggingOptions) -> Result<Option<WorkerGuard>> {
    let filter = options.env_filter()?;

    let (file_layer, guard) = match &options.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let file_appender = tracing_appender::rolling::daily(dir, LOG_FILE_NAME);
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            let layer = fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_timer(LocalTimer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let json_layer = options.json.then(|| {
        fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_timer(LocalTimer)
    });
    let console_layer = (!options.json).then(|| {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(options.verbose)
            .with_timer(LocalTimer)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| Error::config(format!("Failed to set global default subscriber: {e}")))?;

    Ok(guard)
}
