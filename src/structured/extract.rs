//! Pull a JSON value out of free-form model output.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use crate::error::{BridgeError, Result};

static FENCE: OnceLock<Regex> = OnceLock::new();

fn fence() -> &'static Regex {
    FENCE.get_or_init(|| {
        Regex::new(r"(?s)```[A-Za-z0-9_-]*[ \t]*\r?\n?(.*?)```").expect("fence pattern is valid")
    })
}

/// Parse the JSON value embedded in `text`.
///
/// The first fenced block wins. Without a fence, the outermost `{...}` span is
/// tried, then the outermost `[...]` span, then the whole trimmed text.
pub fn extract_json(text: &str) -> Result<Value> {
    if let Some(body) = fence().captures(text).and_then(|c| c.get(1)) {
        return parse_candidate(body.as_str().trim());
    }

    let mut first_error = None;
    for span in [outer_span(text, '{', '}'), outer_span(text, '[', ']')]
        .into_iter()
        .flatten()
    {
        match parse_candidate(span) {
            Ok(value) => return Ok(value),
            Err(e) => {
                first_error.get_or_insert(e);
            }
        }
    }
    match first_error {
        Some(e) => Err(e),
        None => parse_candidate(text.trim()),
    }
}

fn parse_candidate(candidate: &str) -> Result<Value> {
    if candidate.is_empty() {
        return Err(BridgeError::StructuredOutput {
            attempts: 1,
            message: "response contained no JSON".into(),
        });
    }
    serde_json::from_str(candidate).map_err(|e| BridgeError::StructuredOutput {
        attempts: 1,
        message: format!("invalid JSON: {e}"),
    })
}

fn outer_span(text: &str, open: char, close: char) -> Option<&str> {
    let start = text.find(open)?;
    let end = text.rfind(close)?;
    (end > start).then(|| &text[start..=end])
}
