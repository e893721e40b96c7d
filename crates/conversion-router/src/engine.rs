//! Engine trait and request types.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::error::{EngineError, Result};
use crate::matrix::{ConversionMatrix, normalize_format};

/// Opaque key/value options passed through to engines.
pub type ConversionOptions = Map<String, Value>;

/// Receiver for progress updates emitted by an engine.
///
/// Returning an error means the caller no longer wants the result; engines
/// should stop and propagate it as [`EngineError::Aborted`].
pub trait ProgressSink: Send + Sync {
    fn report(&self, percent: u8, message: Option<&str>) -> Result<()>;
}

/// A single conversion request handed to an engine.
#[derive(Clone)]
pub struct EngineRequest {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    /// Lowercase input format.
    pub input_format: String,
    /// Lowercase output format.
    pub output_format: String,
    pub options: ConversionOptions,
    pub progress: Option<Arc<dyn ProgressSink>>,
}

impl EngineRequest {
    pub fn new(
        input_path: impl Into<PathBuf>,
        output_path: impl Into<PathBuf>,
        input_format: &str,
        output_format: &str,
    ) -> Self {
        Self {
            input_path: input_path.into(),
            output_path: output_path.into(),
            input_format: normalize_format(input_format),
            output_format: normalize_format(output_format),
            options: ConversionOptions::new(),
            progress: None,
        }
    }

    pub fn with_options(mut self, options: ConversionOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Forward a progress update, if anyone is listening.
    pub fn report(&self, percent: u8, message: &str) -> Result<()> {
        match &self.progress {
            Some(sink) => sink.report(percent, Some(message)),
            None => Ok(()),
        }
    }

    pub fn option_str(&self, key: &str) -> Option<&str> {
        self.options.get(key).and_then(Value::as_str)
    }

    pub fn option_bool(&self, key: &str) -> Option<bool> {
        self.options.get(key).and_then(Value::as_bool)
    }

    pub fn option_u64(&self, key: &str) -> Option<u64> {
        self.options.get(key).and_then(Value::as_u64)
    }
}

impl fmt::Debug for EngineRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineRequest")
            .field("input_path", &self.input_path)
            .field("output_path", &self.output_path)
            .field("input_format", &self.input_format)
            .field("output_format", &self.output_format)
            .field("options", &self.options)
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

/// A conversion capability provider.
///
/// Engines advertise a fixed [`ConversionMatrix`] at construction and are only
/// asked to convert pairs they claim.
#[async_trait]
pub trait Engine: Send + Sync {
    /// Human readable engine name, used in results and logs.
    fn name(&self) -> &str;

    fn conversion_matrix(&self) -> &ConversionMatrix;

    fn supported_inputs(&self) -> Vec<String> {
        self.conversion_matrix().inputs()
    }

    fn supported_outputs(&self) -> Vec<String> {
        self.conversion_matrix().outputs()
    }

    fn can_convert(&self, input_format: &str, output_format: &str) -> bool {
        self.conversion_matrix()
            .contains(input_format, output_format)
    }

    /// Optional feature flags surfaced through engine status.
    fn features(&self) -> BTreeMap<String, bool> {
        BTreeMap::new()
    }

    /// Check if the engine can run at all (e.g., its binary exists).
    fn is_available(&self) -> bool {
        true
    }

    fn version(&self) -> Option<String> {
        None
    }

    /// Convert `request.input_path` into `request.output_path`.
    ///
    /// `Ok(false)` is a soft failure; the router tries the next engine.
    async fn convert(&self, request: &EngineRequest) -> Result<bool>;
}

/// Reject a request the engine does not claim.
pub fn ensure_supported(engine: &dyn Engine, request: &EngineRequest) -> Result<()> {
    if engine.can_convert(&request.input_format, &request.output_format) {
        Ok(())
    } else {
        Err(EngineError::unsupported(
            engine.name(),
            &request.input_format,
            &request.output_format,
        ))
    }
}
