//! Tolerant JSON extraction from model output.
//!
//! Models wrap JSON in prose or markdown fences more often than not. Three
//! strategies run in order and the first one that yields a value of the
//! requested type wins:
//!
//! 1. the whole (trimmed) text parses directly;
//! 2. the body of a fenced code block (```` ```json ```` or a bare fence);
//! 3. the first balanced `{...}` or `[...]` substring, skipping brackets
//!    inside string literals.

use std::sync::LazyLock;

use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::GenerationError;

static FENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```[A-Za-z]*[ \t]*\r?\n?(.*?)```").expect("valid fence regex")
});

type Strategy = fn(&str) -> Option<Value>;

const STRATEGIES: [(&str, Strategy); 3] = [
    ("direct", parse_direct),
    ("fenced", parse_fenced),
    ("balanced", parse_balanced),
];

/// Parse model output into `T`.
///
/// # Errors
///
/// Returns [`GenerationError::Parse`] if no strategy finds JSON, or if every
/// JSON value found fails to match `T`.
pub fn parse_payload<T: DeserializeOwned>(raw: &str) -> Result<T, GenerationError> {
    let mut shape_error: Option<String> = None;

    for (name, strategy) in STRATEGIES {
        let Some(value) = strategy(raw) else {
            continue;
        };
        match serde_json::from_value::<T>(value) {
            Ok(parsed) => return Ok(parsed),
            Err(e) => {
                tracing::debug!(strategy = name, error = %e, "JSON found but shape mismatched");
                shape_error.get_or_insert_with(|| e.to_string());
            }
        }
    }

    Err(GenerationError::Parse(match shape_error {
        Some(e) => format!("JSON did not match expected shape: {e}"),
        None => "no JSON object or array found in response".to_string(),
    }))
}

/// First JSON value any strategy can extract, regardless of shape.
#[must_use]
pub fn extract_json(raw: &str) -> Option<Value> {
    STRATEGIES.iter().find_map(|(_, strategy)| strategy(raw))
}

fn parse_direct(raw: &str) -> Option<Value> {
    serde_json::from_str(raw.trim()).ok()
}

fn parse_fenced(raw: &str) -> Option<Value> {
    FENCE_RE
        .captures_iter(raw)
        .filter_map(|caps| caps.get(1))
        .find_map(|body| serde_json::from_str(body.as_str().trim()).ok())
}

fn parse_balanced(raw: &str) -> Option<Value> {
    raw.char_indices()
        .filter(|(_, c)| *c == '{' || *c == '[')
        .find_map(|(start, _)| {
            let end = balanced_end(&raw[start..])?;
            serde_json::from_str(&raw[start..start + end]).ok()
        })
}

/// Byte length of the bracketed span starting at `text[0]`, if it closes.
fn balanced_end(text: &str) -> Option<usize> {
    let mut stack: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => stack.push('}'),
            '[' => stack.push(']'),
            '}' | ']' => {
                if stack.pop() != Some(c) {
                    return None;
                }
                if stack.is_empty() {
                    return Some(i + c.len_utf8());
                }
            }
            _ => {}
        }
    }
    None
}
