//! Built-in engines.

mod command;
mod text;

pub use command::{CommandEngine, CommandEngineConfig};
pub use text::{TextEngine, escape_html, html_to_text, parse_csv, text_to_html};
