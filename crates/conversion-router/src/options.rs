//! Option descriptors advertised for a format pair.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Value type of a conversion option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionKind {
    String,
    Boolean,
    Integer,
}

/// Describes one option an engine understands for a given pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionDescriptor {
    #[serde(rename = "type")]
    pub kind: OptionKind,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub example: Option<String>,
}

impl OptionDescriptor {
    fn new(kind: OptionKind, description: &str) -> Self {
        Self {
            kind,
            description: description.to_string(),
            default: None,
            min: None,
            max: None,
            example: None,
        }
    }

    fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }

    fn with_range(mut self, min: i64, max: i64) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }

    fn with_example(mut self, example: &str) -> Self {
        self.example = Some(example.to_string());
        self
    }
}

/// Answer to "what can I tune for this conversion?".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionOptionsInfo {
    pub supported: bool,
    pub input_format: String,
    pub output_format: String,
    #[serde(default)]
    pub engines: Vec<String>,
    #[serde(default)]
    pub options: BTreeMap<String, OptionDescriptor>,
}

/// Options that apply to `input_format -> output_format`.
///
/// Descriptors are returned even for unsupported pairs; check
/// [`ConversionOptionsInfo::supported`] before offering them.
pub fn options_for_pair(
    input_format: &str,
    output_format: &str,
) -> BTreeMap<String, OptionDescriptor> {
    let mut options = BTreeMap::new();

    if input_format == "pdf" {
        options.insert(
            "page_range".to_string(),
            OptionDescriptor::new(OptionKind::String, "Page range to convert")
                .with_example("1-5 or 1,3,5"),
        );
    }

    if matches!(input_format, "docx" | "pdf") {
        options.insert(
            "preserve_formatting".to_string(),
            OptionDescriptor::new(
                OptionKind::Boolean,
                "Preserve original formatting when possible",
            )
            .with_default(true),
        );
    }

    if matches!(output_format, "jpg" | "png") {
        options.insert(
            "quality".to_string(),
            OptionDescriptor::new(OptionKind::Integer, "Output quality (1-100)")
                .with_default(95)
                .with_range(1, 100),
        );
        options.insert(
            "dpi".to_string(),
            OptionDescriptor::new(OptionKind::Integer, "Output DPI")
                .with_default(300)
                .with_range(72, 600),
        );
    }

    options
}
