//! Format detection and descriptive metadata.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Broad family a format belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormatCategory {
    Document,
    Spreadsheet,
    Image,
    Text,
    Web,
    Data,
    Unknown,
}

impl FormatCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Document => "document",
            Self::Spreadsheet => "spreadsheet",
            Self::Image => "image",
            Self::Text => "text",
            Self::Web => "web",
            Self::Data => "data",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for FormatCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Image formats used when grouping conversions for estimates.
pub const IMAGE_FORMATS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tiff"];

pub fn is_image_format(format: &str) -> bool {
    let format = format.to_ascii_lowercase();
    IMAGE_FORMATS.contains(&format.as_str())
}

/// Guess the canonical format name from a file extension.
pub fn detect_format(path: impl AsRef<Path>) -> Option<&'static str> {
    let extension = path.as_ref().extension()?.to_str()?.to_ascii_lowercase();
    let format = match extension.as_str() {
        "pdf" => "pdf",
        "docx" => "docx",
        "doc" => "doc",
        "xlsx" => "xlsx",
        "xls" => "xls",
        "pptx" => "pptx",
        "ppt" => "ppt",
        "txt" => "txt",
        "html" | "htm" => "html",
        "csv" => "csv",
        "jpg" | "jpeg" => "jpg",
        "png" => "png",
        "gif" => "gif",
        "bmp" => "bmp",
        "tiff" | "tif" => "tiff",
        "webp" => "webp",
        _ => return None,
    };
    Some(format)
}

/// Descriptive information about a format and where it can be converted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatInfo {
    pub format: String,
    pub name: String,
    pub category: FormatCategory,
    pub description: String,
    pub mime_types: Vec<String>,
    pub extensions: Vec<String>,
    #[serde(default)]
    pub can_convert_to: Vec<String>,
    #[serde(default)]
    pub can_convert_from: Vec<String>,
}

struct KnownFormat {
    format: &'static str,
    name: &'static str,
    category: FormatCategory,
    description: &'static str,
    mime_types: &'static [&'static str],
    extensions: &'static [&'static str],
}

const KNOWN_FORMATS: &[KnownFormat] = &[
    KnownFormat {
        format: "pdf",
        name: "Portable Document Format",
        category: FormatCategory::Document,
        description: "Universal document format",
        mime_types: &["application/pdf"],
        extensions: &[".pdf"],
    },
    KnownFormat {
        format: "docx",
        name: "Microsoft Word Document",
        category: FormatCategory::Document,
        description: "Modern Word document format",
        mime_types: &["application/vnd.openxmlformats-officedocument.wordprocessingml.document"],
        extensions: &[".docx"],
    },
    KnownFormat {
        format: "xlsx",
        name: "Microsoft Excel Spreadsheet",
        category: FormatCategory::Spreadsheet,
        description: "Modern Excel spreadsheet format",
        mime_types: &["application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"],
        extensions: &[".xlsx"],
    },
    KnownFormat {
        format: "jpg",
        name: "JPEG Image",
        category: FormatCategory::Image,
        description: "Compressed image format",
        mime_types: &["image/jpeg"],
        extensions: &[".jpg", ".jpeg"],
    },
    KnownFormat {
        format: "png",
        name: "PNG Image",
        category: FormatCategory::Image,
        description: "Lossless image format",
        mime_types: &["image/png"],
        extensions: &[".png"],
    },
    KnownFormat {
        format: "txt",
        name: "Plain Text",
        category: FormatCategory::Text,
        description: "Simple text format",
        mime_types: &["text/plain"],
        extensions: &[".txt"],
    },
    KnownFormat {
        format: "html",
        name: "HTML Document",
        category: FormatCategory::Web,
        description: "Web page format",
        mime_types: &["text/html"],
        extensions: &[".html", ".htm"],
    },
    KnownFormat {
        format: "csv",
        name: "Comma Separated Values",
        category: FormatCategory::Data,
        description: "Tabular data format",
        mime_types: &["text/csv"],
        extensions: &[".csv"],
    },
];

/// Static description of `format`, without conversion capabilities.
///
/// Unknown formats get a generic entry rather than `None` so callers can
/// always render something.
pub fn describe_format(format: &str) -> FormatInfo {
    let format = crate::matrix::normalize_format(format);
    match KNOWN_FORMATS.iter().find(|known| known.format == format) {
        Some(known) => FormatInfo {
            format: known.format.to_string(),
            name: known.name.to_string(),
            category: known.category,
            description: known.description.to_string(),
            mime_types: known.mime_types.iter().map(|s| s.to_string()).collect(),
            extensions: known.extensions.iter().map(|s| s.to_string()).collect(),
            can_convert_to: Vec::new(),
            can_convert_from: Vec::new(),
        },
        None => FormatInfo {
            name: format.to_uppercase(),
            category: if is_image_format(&format) {
                FormatCategory::Image
            } else {
                FormatCategory::Unknown
            },
            description: format!("{} format", format.to_uppercase()),
            mime_types: Vec::new(),
            extensions: vec![format!(".{format}")],
            can_convert_to: Vec::new(),
            can_convert_from: Vec::new(),
            format,
        },
    }
}
