//! Terminal styling, plain when colors are compiled out.

#[cfg(feature = "colored-output")]
use colored::*;

pub fn heading(text: &str) -> String {
    #[cfg(feature = "colored-output")]
    {
        text.green().bold().to_string()
    }
    #[cfg(not(feature = "colored-output"))]
    {
        text.to_string()
    }
}

pub fn label(text: &str) -> String {
    #[cfg(feature = "colored-output")]
    {
        text.green().to_string()
    }
    #[cfg(not(feature = "colored-output"))]
    {
        text.to_string()
    }
}

pub fn value(text: &str) -> String {
    #[cfg(feature = "colored-output")]
    {
        text.cyan().to_string()
    }
    #[cfg(not(feature = "colored-output"))]
    {
        text.to_string()
    }
}

pub fn success(text: &str) -> String {
    #[cfg(feature = "colored-output")]
    {
        text.green().to_string()
    }
    #[cfg(not(feature = "colored-output"))]
    {
        text.to_string()
    }
}

pub fn failure(text: &str) -> String {
    #[cfg(feature = "colored-output")]
    {
        text.red().bold().to_string()
    }
    #[cfg(not(feature = "colored-output"))]
    {
        text.to_string()
    }
}

pub fn muted(text: &str) -> String {
    #[cfg(feature = "colored-output")]
    {
        text.dimmed().to_string()
    }
    #[cfg(not(feature = "colored-output"))]
    {
        text.to_string()
    }
}

/// Comma-separated list, or a dash when empty.
pub fn list(items: &[String]) -> String {
    if items.is_empty() {
        "-".to_string()
    } else {
        items.join(", ")
    }
}
