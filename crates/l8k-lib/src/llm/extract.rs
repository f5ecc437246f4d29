//! Extraction of structured fields from model output

use super::LlmFields;
use crate::error::ExtractionError;
use serde_json::Value;

/// Strip surrounding whitespace and a markdown code fence
///
/// A leading "```json" (else "```") and a trailing "```" are removed
/// independently, then whitespace is trimmed again.
pub fn trim_markdown_json(text: &str) -> &str {
    let mut s = text.trim();
    if let Some(rest) = s.strip_prefix("```json") {
        s = rest;
    } else if let Some(rest) = s.strip_prefix("```") {
        s = rest;
    }
    if let Some(rest) = s.strip_suffix("```") {
        s = rest;
    }
    s.trim()
}

fn coerce(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        nested => nested.to_string(),
    }
}

/// Parse a JSON object and coerce every value to a string
pub fn parse_fields(json: &str) -> Result<LlmFields, ExtractionError> {
    match serde_json::from_str::<Value>(json)? {
        Value::Object(map) => Ok(map.into_iter().map(|(k, v)| (k, coerce(v))).collect()),
        _ => Err(ExtractionError::NotAnObject),
    }
}

/// Locate the outermost `{...}` in a response and parse it into fields
pub fn extract_fields(response: &str) -> Result<LlmFields, ExtractionError> {
    if response.trim().is_empty() {
        return Err(ExtractionError::EmptyResponse);
    }

    let text = trim_markdown_json(response);
    let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) else {
        return Err(ExtractionError::NoJson);
    };
    if end <= start {
        return Err(ExtractionError::NoJson);
    }

    parse_fields(&text[start..=end])
}
