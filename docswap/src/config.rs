//! Job manager configuration.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::debug;

use crate::error::{Error, Result};
use crate::jobs::{JanitorConfig, WorkerPoolConfig};

pub const ENV_MAX_WORKERS: &str = "DOCSWAP_MAX_WORKERS";
pub const ENV_JOB_TIMEOUT_SECS: &str = "DOCSWAP_JOB_TIMEOUT_SECS";
pub const ENV_RETENTION_SECS: &str = "DOCSWAP_RETENTION_SECS";
pub const ENV_CLEANUP_INTERVAL_SECS: &str = "DOCSWAP_CLEANUP_INTERVAL_SECS";

fn default_large_file_threshold_bytes() -> u64 {
    5 * 1024 * 1024
}

/// Configuration for a [`ConversionJobManager`](crate::ConversionJobManager).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagerConfig {
    #[serde(default)]
    pub worker_pool: WorkerPoolConfig,

    #[serde(default)]
    pub janitor: JanitorConfig,

    /// Inputs above this size are flagged `is_large_file` in task options.
    #[serde(default = "default_large_file_threshold_bytes")]
    pub large_file_threshold_bytes: u64,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            worker_pool: WorkerPoolConfig::default(),
            janitor: JanitorConfig::default(),
            large_file_threshold_bytes: default_large_file_threshold_bytes(),
        }
    }
}

impl ManagerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_worker_pool(mut self, worker_pool: WorkerPoolConfig) -> Self {
        self.worker_pool = worker_pool;
        self
    }

    pub fn with_janitor(mut self, janitor: JanitorConfig) -> Self {
        self.janitor = janitor;
        self
    }

    pub fn with_large_file_threshold_bytes(mut self, bytes: u64) -> Self {
        self.large_file_threshold_bytes = bytes;
        self
    }

    /// Defaults overridden by the process environment (and a `.env` file, if any).
    ///
    /// Supported env vars:
    /// - `DOCSWAP_MAX_WORKERS`
    /// - `DOCSWAP_JOB_TIMEOUT_SECS`
    /// - `DOCSWAP_RETENTION_SECS`
    /// - `DOCSWAP_CLEANUP_INTERVAL_SECS`
    ///
    /// A timeout or retention of 0 disables that limit.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        let mut config = Self::default();
        config.apply_overrides_from(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Reject settings the manager cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.worker_pool.max_workers == 0 {
            return Err(Error::config("max_workers must be at least 1"));
        }
        Ok(())
    }

    /// Apply overrides from `lookup`. Blank values are ignored.
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = parse_override::<usize>(&lookup, ENV_MAX_WORKERS)? {
            if value == 0 {
                return Err(Error::config(format!("{ENV_MAX_WORKERS} must be at least 1")));
            }
            self.worker_pool.max_workers = value;
        }
        if let Some(value) = parse_override(&lookup, ENV_JOB_TIMEOUT_SECS)? {
            self.worker_pool.job_timeout_secs = value;
        }
        if let Some(value) = parse_override(&lookup, ENV_RETENTION_SECS)? {
            self.janitor.retention_secs = value;
        }
        if let Some(value) = parse_override(&lookup, ENV_CLEANUP_INTERVAL_SECS)? {
            self.janitor.cleanup_interval_secs = value;
        }
        Ok(())
    }
}

fn parse_override<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let Some(raw) = lookup(key) else {
        return Ok(None);
    };
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }

    let value = raw
        .parse::<T>()
        .map_err(|e| Error::config(format!("Invalid value {raw:?} for {key}: {e}")))?;
    debug!("Config override from {}", key);
    Ok(Some(value))
}
