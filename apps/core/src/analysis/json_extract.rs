//! Lenient JSON recovery from model completions.
//!
//! Models asked for JSON frequently wrap it in prose or code fences. Parsing
//! tries the raw text first, then strips fences, then scans for the first
//! balanced object or array span.

use regex::Regex;
use serde::de::DeserializeOwned;
use std::sync::LazyLock;

static CODE_FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```(?:json)?\s*(.*?)\s*```").unwrap_or_else(|e| panic!("fence regex: {e}"))
});

/// Outcome of parsing a model completion as JSON.
#[derive(Debug)]
pub enum ModelJson<T> {
    Parsed(T),
    /// No parseable JSON found; carries the raw completion for fallbacks.
    Unparseable(String),
}

impl<T> ModelJson<T> {
    pub fn ok(self) -> Option<T> {
        match self {
            ModelJson::Parsed(value) => Some(value),
            ModelJson::Unparseable(_) => None,
        }
    }
}

/// Parse a completion into `T`, tolerating surrounding prose and fences.
pub fn parse_model_json<T: DeserializeOwned>(raw: &str) -> ModelJson<T> {
    let trimmed = raw.trim();
    if let Ok(value) = serde_json::from_str::<T>(trimmed) {
        return ModelJson::Parsed(value);
    }

    if let Some(caps) = CODE_FENCE.captures(trimmed) {
        if let Some(inner) = caps.get(1) {
            if let Ok(value) = serde_json::from_str::<T>(inner.as_str()) {
                return ModelJson::Parsed(value);
            }
        }
    }

    if let Some(span) = balanced_span(trimmed) {
        if let Ok(value) = serde_json::from_str::<T>(span) {
            return ModelJson::Parsed(value);
        }
    }

    ModelJson::Unparseable(raw.to_string())
}

/// Find the first balanced `{...}` or `[...]` span, respecting string
/// literals and escapes.
fn balanced_span(text: &str) -> Option<&str> {
    let bytes = text.as_bytes();
    let start = bytes.iter().position(|&b| b == b'{' || b == b'[')?;
    let open = bytes[start];
    let close = if open == b'{' { b'}' } else { b']' };

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            _ if b == open => depth += 1,
            _ if b == close => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=i]);
                }
            }
            _ => {}
        }
    }
    None
}
