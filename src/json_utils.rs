//! JSON decoding for page-event lines and JSON output helpers.

use serde::{Deserialize, Serialize};

use crate::pipeline::PageEvent;

/// JSON decoding error with enough context to point at the bad input
#[derive(Debug, thiserror::Error)]
pub enum JsonError {
    #[error("JSON syntax error at line {line}, column {column}: {msg}")]
    Syntax { msg: String, line: usize, column: usize },

    /// Missing field or type mismatch
    #[error("JSON validation error: {0}")]
    Data(String),

    #[error("Incomplete JSON: {0}")]
    UnexpectedEof(String),

    #[error("JSON serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for JsonError {
    fn from(e: serde_json::Error) -> Self {
        if e.is_syntax() {
            JsonError::Syntax {
                msg: e.to_string(),
                line: e.line(),
                column: e.column(),
            }
        } else if e.is_eof() {
            JsonError::UnexpectedEof(e.to_string())
        } else {
            JsonError::Data(e.to_string())
        }
    }
}

pub fn safe_deserialize<'a, T>(json: &'a str) -> Result<T, JsonError>
where
    T: Deserialize<'a>,
{
    let trimmed = json.trim();
    if trimmed.is_empty() {
        return Err(JsonError::Data("Empty JSON input".to_string()));
    }
    if trimmed == "null" {
        return Err(JsonError::Data("Null JSON input".to_string()));
    }

    serde_json::from_str(trimmed).map_err(JsonError::from)
}

pub fn safe_serialize_pretty<T>(value: &T) -> Result<String, JsonError>
where
    T: Serialize,
{
    serde_json::to_string_pretty(value).map_err(|e| JsonError::Serialization(e.to_string()))
}

/// Decode one line of a page-event stream.
///
/// Blank lines and `#` comments yield `Ok(None)`.
pub fn decode_page_event(line: &str) -> Result<Option<PageEvent>, JsonError> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }
    safe_deserialize(trimmed).map(Some)
}
