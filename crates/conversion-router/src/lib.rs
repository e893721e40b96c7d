//! Routing of file conversions across independent engines.
//!
//! Each [`Engine`] advertises a fixed [`ConversionMatrix`]. The
//! [`ConversionRouter`] merges those into a global matrix and, for every
//! `(input, output)` pair, keeps the list of capable engines in registration
//! order. A conversion tries each candidate until one succeeds and leaves a
//! non-empty output file; engine errors and panics never escape
//! [`ConversionRouter::convert`].
//!
//! ```no_run
//! use conversion_router::{ConversionOptions, ConversionRouter, TextEngine};
//!
//! # async fn demo() {
//! let router = ConversionRouter::builder().engine(TextEngine::new()).build();
//! let outcome = router
//!     .convert("notes.txt", "notes.html", "txt", "html", ConversionOptions::new())
//!     .await;
//! assert!(outcome.success);
//! # }
//! ```

pub mod engine;
pub mod engines;
pub mod error;
pub mod formats;
pub mod matrix;
pub mod options;
pub mod router;

pub use engine::{ConversionOptions, Engine, EngineRequest, ProgressSink, ensure_supported};
pub use engines::{CommandEngine, CommandEngineConfig, TextEngine};
pub use error::{EngineError, Result};
pub use formats::{FormatCategory, FormatInfo, detect_format, is_image_format};
pub use matrix::{ConversionMatrix, normalize_format};
pub use options::{ConversionOptionsInfo, OptionDescriptor, OptionKind};
pub use router::{
    ConversionOutcome, ConversionRouter, ConversionRouterBuilder, EngineState, EngineStatus,
    FailureKind, SupportedFormats,
};
