//! Capability-driven dispatch with ordered fallback across engines.

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::engine::{ConversionOptions, Engine, EngineRequest};
use crate::formats::{FormatInfo, describe_format, detect_format};
use crate::matrix::{ConversionMatrix, normalize_format};
use crate::options::{ConversionOptionsInfo, options_for_pair};

/// Why a routed conversion did not produce output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// No registered engine claims the pair.
    UnsupportedPair,
    /// The input file does not exist.
    InputNotFound,
    /// The pair is in the global matrix but no candidate remains.
    NoEngine,
    /// Every candidate engine was tried and none succeeded.
    EnginesExhausted,
    /// An engine reported that the caller gave up (cancelled or timed out).
    Aborted,
}

/// Structured result of [`ConversionRouter::convert`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engine: Option<String>,
    pub input_format: String,
    pub output_format: String,
    pub output_path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attempted_engines: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub supported_outputs: Vec<String>,
}

impl ConversionOutcome {
    fn failure(request: &EngineRequest, kind: FailureKind, error: String) -> Self {
        Self {
            success: false,
            engine: None,
            input_format: request.input_format.clone(),
            output_format: request.output_format.clone(),
            output_path: request.output_path.clone(),
            file_size: None,
            error: Some(error),
            failure: Some(kind),
            attempted_engines: Vec::new(),
            supported_outputs: Vec::new(),
        }
    }

    fn with_attempted(mut self, attempted: Vec<String>) -> Self {
        self.attempted_engines = attempted;
        self
    }
}

/// Inputs and outputs understood by at least one engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupportedFormats {
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineState {
    Active,
    Unavailable,
}

/// Capabilities and health of one registered engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineStatus {
    pub name: String,
    pub supported_inputs: Vec<String>,
    pub supported_outputs: Vec<String>,
    pub conversion_matrix: BTreeMap<String, Vec<String>>,
    pub conversion_count: usize,
    pub features: BTreeMap<String, bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub status: EngineState,
}

/// Builder collecting engines in priority order.
#[derive(Default)]
pub struct ConversionRouterBuilder {
    engines: Vec<Arc<dyn Engine>>,
}

impl ConversionRouterBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an engine. Earlier registrations are tried first.
    pub fn engine<E: Engine + 'static>(self, engine: E) -> Self {
        self.shared_engine(Arc::new(engine))
    }

    pub fn shared_engine(mut self, engine: Arc<dyn Engine>) -> Self {
        self.engines.push(engine);
        self
    }

    pub fn build(self) -> ConversionRouter {
        let mut global_matrix = ConversionMatrix::new();
        let mut format_pair_engines: HashMap<(String, String), Vec<usize>> = HashMap::new();

        for (index, engine) in self.engines.iter().enumerate() {
            if !engine.is_available() {
                warn!(engine = engine.name(), "Engine unavailable, not routing to it");
                continue;
            }

            let matrix = engine.conversion_matrix();
            global_matrix.merge(matrix);
            for (input, output) in matrix.pairs() {
                format_pair_engines
                    .entry((input.to_string(), output.to_string()))
                    .or_default()
                    .push(index);
            }
            debug!(
                engine = engine.name(),
                inputs = matrix.len(),
                "Registered conversion engine"
            );
        }

        info!(
            engines = self.engines.len(),
            pairs = format_pair_engines.len(),
            "Conversion router initialized"
        );

        ConversionRouter {
            engines: self.engines,
            global_matrix,
            format_pair_engines,
        }
    }
}

/// Dispatches conversions to registered engines.
///
/// Built once and read-only afterwards, so it can be shared freely behind an
/// `Arc`.
pub struct ConversionRouter {
    engines: Vec<Arc<dyn Engine>>,
    global_matrix: ConversionMatrix,
    format_pair_engines: HashMap<(String, String), Vec<usize>>,
}

impl ConversionRouter {
    pub fn builder() -> ConversionRouterBuilder {
        ConversionRouterBuilder::new()
    }

    pub fn engines(&self) -> &[Arc<dyn Engine>] {
        &self.engines
    }

    pub fn can_convert(&self, input_format: &str, output_format: &str) -> bool {
        self.global_matrix.contains(input_format, output_format)
    }

    /// Names of the engines that would be tried for a pair, in order.
    pub fn engines_for(&self, input_format: &str, output_format: &str) -> Vec<String> {
        self.candidates(input_format, output_format)
            .iter()
            .map(|&index| self.engines[index].name().to_string())
            .collect()
    }

    fn candidates(&self, input_format: &str, output_format: &str) -> &[usize] {
        let key = (normalize_format(input_format), normalize_format(output_format));
        self.format_pair_engines
            .get(&key)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Convert a file, trying each capable engine in registration order.
    pub async fn convert(
        &self,
        input_path: impl Into<PathBuf>,
        output_path: impl Into<PathBuf>,
        input_format: &str,
        output_format: &str,
        options: ConversionOptions,
    ) -> ConversionOutcome {
        let request = EngineRequest::new(input_path, output_path, input_format, output_format)
            .with_options(options);
        self.convert_request(&request).await
    }

    /// Like [`convert`](Self::convert), for a prepared request (e.g. one
    /// carrying a progress sink).
    pub async fn convert_request(&self, request: &EngineRequest) -> ConversionOutcome {
        let input_format = &request.input_format;
        let output_format = &request.output_format;

        if !self.can_convert(input_format, output_format) {
            let mut outcome = ConversionOutcome::failure(
                request,
                FailureKind::UnsupportedPair,
                format!("Conversion from {input_format} to {output_format} not supported"),
            );
            outcome.supported_outputs = self.global_matrix.outputs_for(input_format).to_vec();
            return outcome;
        }

        if !tokio::fs::try_exists(&request.input_path)
            .await
            .unwrap_or(false)
        {
            return ConversionOutcome::failure(
                request,
                FailureKind::InputNotFound,
                format!("Input file not found: {}", request.input_path.display()),
            );
        }

        let candidates = self.candidates(input_format, output_format);
        if candidates.is_empty() {
            return ConversionOutcome::failure(
                request,
                FailureKind::NoEngine,
                format!("No engine available for {input_format} to {output_format}"),
            );
        }

        let mut attempted = Vec::with_capacity(candidates.len());
        let mut last_error = String::new();

        for &index in candidates {
            let engine = &self.engines[index];
            let name = engine.name().to_string();
            attempted.push(name.clone());

            info!(
                engine = %name,
                "Attempting {} -> {} conversion",
                input_format,
                output_format
            );
            let start = Instant::now();

            let attempt = AssertUnwindSafe(engine.convert(request))
                .catch_unwind()
                .await;

            match attempt {
                Ok(Ok(true)) => {
                    if let Some(size) = non_empty_size(&request.output_path).await {
                        info!(
                            engine = %name,
                            file_size = size,
                            "Conversion succeeded in {:.2}s",
                            start.elapsed().as_secs_f64()
                        );
                        return ConversionOutcome {
                            success: true,
                            engine: Some(name),
                            input_format: input_format.clone(),
                            output_format: output_format.clone(),
                            output_path: request.output_path.clone(),
                            file_size: Some(size),
                            error: None,
                            failure: None,
                            attempted_engines: attempted,
                            supported_outputs: Vec::new(),
                        };
                    }
                    last_error = format!("{name} reported success but produced no output");
                    warn!(engine = %name, "{}", last_error);
                }
                Ok(Ok(false)) => {
                    last_error = format!("{name} conversion returned false");
                    warn!(engine = %name, "Engine failed, trying next");
                }
                Ok(Err(e)) if e.is_abort() => {
                    info!(engine = %name, "Conversion aborted: {}", e);
                    remove_partial_output(&request.output_path).await;
                    return ConversionOutcome::failure(request, FailureKind::Aborted, e.to_string())
                        .with_attempted(attempted);
                }
                Ok(Err(e)) => {
                    last_error = e.to_string();
                    warn!(engine = %name, error = %e, "Engine error, trying next");
                }
                Err(panic) => {
                    last_error = format!("{name} panicked: {}", panic_message(panic.as_ref()));
                    error!(engine = %name, "{}", last_error);
                }
            }

            remove_partial_output(&request.output_path).await;
        }

        ConversionOutcome::failure(
            request,
            FailureKind::EnginesExhausted,
            format!("All engines failed. Last error: {last_error}"),
        )
        .with_attempted(attempted)
    }

    pub fn get_supported_formats(&self) -> SupportedFormats {
        SupportedFormats {
            inputs: self.global_matrix.inputs(),
            outputs: self.global_matrix.outputs(),
        }
    }

    pub fn get_conversion_matrix(&self) -> BTreeMap<String, Vec<String>> {
        self.global_matrix.to_map()
    }

    pub fn get_engine_status(&self) -> Vec<EngineStatus> {
        self.engines
            .iter()
            .map(|engine| {
                let matrix = engine.conversion_matrix();
                EngineStatus {
                    name: engine.name().to_string(),
                    supported_inputs: engine.supported_inputs(),
                    supported_outputs: engine.supported_outputs(),
                    conversion_matrix: matrix.to_map(),
                    conversion_count: matrix.len(),
                    features: engine.features(),
                    version: engine.version(),
                    status: if engine.is_available() {
                        EngineState::Active
                    } else {
                        EngineState::Unavailable
                    },
                }
            })
            .collect()
    }

    pub fn get_conversion_options(
        &self,
        input_format: &str,
        output_format: &str,
    ) -> ConversionOptionsInfo {
        let input_format = normalize_format(input_format);
        let output_format = normalize_format(output_format);
        ConversionOptionsInfo {
            supported: self.can_convert(&input_format, &output_format),
            engines: self.engines_for(&input_format, &output_format),
            options: options_for_pair(&input_format, &output_format),
            input_format,
            output_format,
        }
    }

    /// Guess a file's format from its extension.
    pub fn detect_format(&self, path: impl AsRef<Path>) -> Option<&'static str> {
        detect_format(path)
    }

    /// Describe a format along with what it converts to and from.
    pub fn format_info(&self, format: &str) -> FormatInfo {
        let mut info = describe_format(format);
        info.can_convert_to = self.global_matrix.outputs_for(&info.format).to_vec();
        info.can_convert_from = self
            .global_matrix
            .pairs()
            .filter(|(_, output)| *output == info.format)
            .map(|(input, _)| input.to_string())
            .collect();
        info
    }
}

async fn non_empty_size(path: &Path) -> Option<u64> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() && meta.len() > 0 => Some(meta.len()),
        _ => None,
    }
}

async fn remove_partial_output(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!("Removed partial output {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove partial output {}: {}", path.display(), e),
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
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
    use crate::error::{EngineError, Result};
    use async_trait::async_trait;

    struct Fixed {
        name: &'static str,
        matrix: ConversionMatrix,
        available: bool,
    }

    impl Fixed {
        fn new(name: &'static str, matrix: ConversionMatrix) -> Self {
            Self {
                name,
                matrix,
                available: true,
            }
        }
    }

    #[async_trait]
    impl Engine for Fixed {
        fn name(&self) -> &str {
            self.name
        }

        fn conversion_matrix(&self) -> &ConversionMatrix {
            &self.matrix
        }

        fn is_available(&self) -> bool {
            self.available
        }

        async fn convert(&self, _request: &EngineRequest) -> Result<bool> {
            Err(EngineError::failed("not used"))
        }
    }

    fn router() -> ConversionRouter {
        ConversionRouter::builder()
            .engine(Fixed::new(
                "A",
                ConversionMatrix::new().with_outputs("pdf", ["docx", "txt"]),
            ))
            .engine(Fixed::new(
                "B",
                ConversionMatrix::new()
                    .with_outputs("pdf", ["txt"])
                    .with_outputs("docx", ["pdf"]),
            ))
            .build()
    }

    #[test]
    fn test_global_matrix_is_union() {
        let router = router();
        assert!(router.can_convert("PDF", "txt"));
        assert!(router.can_convert("docx", "pdf"));
        assert!(!router.can_convert("txt", "pdf"));

        let formats = router.get_supported_formats();
        assert_eq!(formats.inputs, vec!["docx", "pdf"]);
        assert_eq!(formats.outputs, vec!["docx", "pdf", "txt"]);
    }

    #[test]
    fn test_engines_for_keeps_registration_order() {
        let router = router();
        assert_eq!(router.engines_for("pdf", "txt"), vec!["A", "B"]);
        assert_eq!(router.engines_for("docx", "pdf"), vec!["B"]);
        assert!(router.engines_for("txt", "pdf").is_empty());
    }

    #[test]
    fn test_unavailable_engine_is_not_routed() {
        let mut offline = Fixed::new("Offline", ConversionMatrix::new().with_outputs("png", ["pdf"]));
        offline.available = false;
        let router = ConversionRouter::builder().engine(offline).build();

        assert!(!router.can_convert("png", "pdf"));
        let status = router.get_engine_status();
        assert_eq!(status.len(), 1);
        assert_eq!(status[0].status, EngineState::Unavailable);
    }

    #[test]
    fn test_engine_status() {
        let status = router().get_engine_status();
        assert_eq!(status[0].name, "A");
        assert_eq!(status[0].conversion_count, 1);
        assert_eq!(status[1].supported_inputs, vec!["docx", "pdf"]);
        assert_eq!(status[1].status, EngineState::Active);
    }

    #[test]
    fn test_format_info_includes_capabilities() {
        let info = router().format_info("pdf");
        assert_eq!(info.name, "Portable Document Format");
        assert_eq!(info.can_convert_to, vec!["docx", "txt"]);
        assert_eq!(info.can_convert_from, vec!["docx"]);
    }

    #[test]
    fn test_conversion_options() {
        let router = router();
        let info = router.get_conversion_options("PDF", "docx");
        assert!(info.supported);
        assert_eq!(info.engines, vec!["A"]);
        assert!(info.options.contains_key("page_range"));

        let info = router.get_conversion_options("txt", "png");
        assert!(!info.supported);
        assert!(info.engines.is_empty());
    }

    #[tokio::test]
    async fn test_unsupported_pair_lists_outputs() {
        let outcome = router()
            .convert("/missing.pdf", "/out.png", "pdf", "png", ConversionOptions::new())
            .await;
        assert!(!outcome.success);
        assert_eq!(outcome.failure, Some(FailureKind::UnsupportedPair));
        assert_eq!(outcome.supported_outputs, vec!["docx", "txt"]);
        assert!(outcome.attempted_engines.is_empty());
    }

    #[tokio::test]
    async fn test_missing_input_fails_fast() {
        let outcome = router()
            .convert(
                "/definitely/not/here.pdf",
                "/tmp/out.txt",
                "pdf",
                "txt",
                ConversionOptions::new(),
            )
            .await;
        assert_eq!(outcome.failure, Some(FailureKind::InputNotFound));
        assert!(outcome.error.unwrap().starts_with("Input file not found"));
    }

    #[test]
    fn test_panic_message() {
        let boxed: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(boxed.as_ref()), "boom");
        let boxed: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(boxed.as_ref()), "bang");
        let boxed: Box<dyn Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(boxed.as_ref()), "unknown panic");
    }
}
