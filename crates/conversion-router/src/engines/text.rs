//! Pure-Rust conversions between text, HTML and CSV.

use async_trait::async_trait;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;
use tracing::debug;

use crate::engine::{Engine, EngineRequest, ensure_supported};
use crate::error::Result;
use crate::matrix::ConversionMatrix;

static SCRIPT_STYLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<(script|style)[^>]*>.*?</(script|style)>").expect("valid regex")
});
static BLOCK_BREAK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<br\s*/?>|</(p|div|li|tr|h[1-6]|table|ul|ol)\s*>").expect("valid regex")
});
static CELL_BREAK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)</t[dh]\s*>").expect("valid regex"));
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").expect("valid regex"));
static BLANK_LINES_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n[ \t]*(\n[ \t]*)+").expect("valid regex"));

/// Converts between plain text, HTML and CSV without external tools.
pub struct TextEngine {
    matrix: ConversionMatrix,
}

impl TextEngine {
    pub const NAME: &'static str = "Text Engine";

    pub fn new() -> Self {
        Self {
            matrix: ConversionMatrix::new()
                .with_outputs("txt", ["html"])
                .with_outputs("html", ["txt"])
                .with_outputs("csv", ["txt", "html"]),
        }
    }
}

impl Default for TextEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Engine for TextEngine {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn conversion_matrix(&self) -> &ConversionMatrix {
        &self.matrix
    }

    fn features(&self) -> BTreeMap<String, bool> {
        BTreeMap::from([
            ("html_escaping".to_string(), true),
            ("csv_tables".to_string(), true),
            ("external_tools".to_string(), false),
        ])
    }

    async fn convert(&self, request: &EngineRequest) -> Result<bool> {
        ensure_supported(self, request)?;

        request.report(10, "Reading input")?;
        let source = tokio::fs::read_to_string(&request.input_path).await?;
        let title = request
            .input_path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("Document")
            .to_string();

        request.report(50, "Converting")?;
        let rendered = match (
            request.input_format.as_str(),
            request.output_format.as_str(),
        ) {
            ("txt", "html") => text_to_html(&source, &title),
            ("html", "txt") => html_to_text(&source),
            ("csv", "txt") => table_to_text(&parse_csv(&source)),
            ("csv", "html") => table_to_html(&parse_csv(&source), &title),
            _ => return Ok(false),
        };

        if rendered.trim().is_empty() {
            debug!("{} produced empty output", Self::NAME);
            return Ok(false);
        }

        request.report(90, "Writing output")?;
        if let Some(parent) = request.output_path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&request.output_path, rendered).await?;
        Ok(true)
    }
}

pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

fn html_document(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>{}</title>\n</head>\n<body>\n{}</body>\n</html>\n",
        escape_html(title),
        body
    )
}

/// Paragraphs are separated by blank lines; single newlines become `<br>`.
pub fn text_to_html(text: &str, title: &str) -> String {
    let normalized = text.replace("\r\n", "\n");
    let mut body = String::new();
    for paragraph in normalized.split("\n\n") {
        let paragraph = paragraph.trim_matches('\n');
        if paragraph.trim().is_empty() {
            continue;
        }
        let lines: Vec<String> = paragraph.lines().map(escape_html).collect();
        body.push_str("<p>");
        body.push_str(&lines.join("<br>\n"));
        body.push_str("</p>\n");
    }
    html_document(title, &body)
}

pub fn html_to_text(html: &str) -> String {
    let without_scripts = SCRIPT_STYLE_RE.replace_all(html, "");
    let with_cells = CELL_BREAK_RE.replace_all(&without_scripts, "\t");
    let with_breaks = BLOCK_BREAK_RE.replace_all(&with_cells, "\n");
    let stripped = TAG_RE.replace_all(&with_breaks, "");
    let decoded = decode_entities(&stripped);

    let trimmed: Vec<&str> = decoded.lines().map(str::trim_end).collect();
    let joined = trimmed.join("\n");
    let collapsed = BLANK_LINES_RE.replace_all(&joined, "\n\n");
    let mut text = collapsed.trim().to_string();
    text.push('\n');
    text
}

/// Minimal RFC 4180 reader: quoted fields, doubled quotes, CRLF.
pub fn parse_csv(input: &str) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    let mut row = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    field.push('"');
                    chars.next();
                }
                '"' => in_quotes = false,
                _ => field.push(c),
            }
            continue;
        }

        match c {
            '"' => in_quotes = true,
            ',' => row.push(std::mem::take(&mut field)),
            '\r' => {}
            '\n' => {
                row.push(std::mem::take(&mut field));
                rows.push(std::mem::take(&mut row));
            }
            _ => field.push(c),
        }
    }

    if !field.is_empty() || !row.is_empty() {
        row.push(field);
        rows.push(row);
    }

    rows.retain(|r| !(r.len() == 1 && r[0].is_empty()));
    rows
}

fn table_to_text(rows: &[Vec<String>]) -> String {
    let columns = rows.iter().map(Vec::len).max().unwrap_or(0);
    let mut widths = vec![0usize; columns];
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            widths[i] = widths[i].max(cell.chars().count());
        }
    }

    let mut out = String::new();
    for (n, row) in rows.iter().enumerate() {
        let cells: Vec<String> = (0..columns)
            .map(|i| {
                let cell = row.get(i).map(String::as_str).unwrap_or("");
                format!("{:<width$}", cell, width = widths[i])
            })
            .collect();
        out.push_str(cells.join(" | ").trim_end());
        out.push('\n');

        if n == 0 && rows.len() > 1 {
            let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
            out.push_str(&rule.join("-+-"));
            out.push('\n');
        }
    }
    out
}

fn table_to_html(rows: &[Vec<String>], title: &str) -> String {
    let mut body = String::from("<table>\n");
    for (n, row) in rows.iter().enumerate() {
        let tag = if n == 0 { "th" } else { "td" };
        body.push_str("<tr>");
        for cell in row {
            body.push_str(&format!("<{tag}>{}</{tag}>", escape_html(cell)));
        }
        body.push_str("</tr>\n");
    }
    body.push_str("</table>\n");
    html_document(title, &body)
}
