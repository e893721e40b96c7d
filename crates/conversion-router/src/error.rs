//! Engine-level error types.

use thiserror::Error;

/// Result type returned by [`Engine::convert`](crate::Engine::convert).
pub type Result<T> = std::result::Result<T, EngineError>;

/// Failure raised by a single engine.
///
/// The router treats every variant except [`EngineError::Aborted`] as
/// non-fatal and moves on to the next candidate engine.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("{engine} cannot convert {input_format} to {output_format}")]
    Unsupported {
        engine: String,
        input_format: String,
        output_format: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Process error: {0}")]
    Process(String),

    #[error("Timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("Conversion aborted: {0}")]
    Aborted(String),

    #[error("{0}")]
    Failed(String),
}

impl EngineError {
    pub fn unsupported(
        engine: impl Into<String>,
        input_format: impl Into<String>,
        output_format: impl Into<String>,
    ) -> Self {
        Self::Unsupported {
            engine: engine.into(),
            input_format: input_format.into(),
            output_format: output_format.into(),
        }
    }

    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }

    /// Whether this error should stop the fallback loop instead of trying the next engine.
    pub fn is_abort(&self) -> bool {
        matches!(self, Self::Aborted(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_display() {
        let err = EngineError::unsupported("Text Engine", "pdf", "png");
        assert_eq!(err.to_string(), "Text Engine cannot convert pdf to png");
        assert!(!err.is_abort());
    }

    #[test]
    fn test_aborted_is_abort() {
        assert!(EngineError::Aborted("cancelled".into()).is_abort());
        assert!(!EngineError::Timeout { secs: 5 }.is_abort());
    }
}
