//! Tool responses that never carry row data.
//!
//! A successful call returns only `{"success":true,"data":{}}`. Rows live in
//! the staging area; file paths, column names and counts are withheld too,
//! since a caller can smuggle row values through column aliases.

use crate::error::{ErrorCode, Result};
use serde::{Deserialize, Serialize};

/// Maximum length of an error message shown to the caller, in characters.
pub const MAX_ERROR_CHARS: usize = 256;

/// Appended to error messages that were cut short.
pub const TRUNCATION_MARKER: &str = "... (truncated, see server logs)";

const JSON_MIME_TYPE: &str = "application/json";

/// A tool-call response in MCP content form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResponse {
    pub content: Vec<ToolContent>,

    #[serde(rename = "isError", default, skip_serializing_if = "is_false")]
    pub is_error: bool,
}

/// A single content block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolContent {
    #[serde(rename = "type")]
    pub kind: String,

    #[serde(rename = "mimeType")]
    pub mime_type: String,

    pub text: String,
}

impl ToolContent {
    fn json(text: String) -> Self {
        Self {
            kind: "text".to_string(),
            mime_type: JSON_MIME_TYPE.to_string(),
            text,
        }
    }
}

#[derive(Serialize)]
struct SuccessPayload {
    success: bool,
    data: serde_json::Map<String, serde_json::Value>,
}

#[derive(Serialize)]
struct ErrorPayload<'a> {
    success: bool,
    error: &'a str,
    code: ErrorCode,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl ToolResponse {
    /// Parses the JSON payload of the first content block.
    pub fn payload(&self) -> Result<serde_json::Value> {
        let text = self.content.first().map(|c| c.text.as_str()).unwrap_or("null");
        Ok(serde_json::from_str(text)?)
    }
}

/// Builds the success response: `{"success":true,"data":{}}`.
pub fn pii_safe_success() -> ToolResponse {
    let payload = SuccessPayload {
        success: true,
        data: serde_json::Map::new(),
    };
    // Serializing a bool and an empty map cannot fail.
    let text = serde_json::to_string(&payload)
        .unwrap_or_else(|_| r#"{"success":true,"data":{}}"#.to_string());

    ToolResponse {
        content: vec![ToolContent::json(text)],
        is_error: false,
    }
}

/// Builds an error response with a truncated message.
pub fn error_response(message: &str, code: ErrorCode) -> ToolResponse {
    let error = truncate_for_llm(message);
    let payload = ErrorPayload {
        success: false,
        error: &error,
        code,
    };
    let text = serde_json::to_string(&payload).unwrap_or_else(|_| {
        format!(r#"{{"success":false,"error":"internal error","code":"{code}"}}"#)
    });

    ToolResponse {
        content: vec![ToolContent::json(text)],
        is_error: true,
    }
}

/// Bounds a message to [`MAX_ERROR_CHARS`] characters.
///
/// Longer messages keep a prefix and end with [`TRUNCATION_MARKER`], landing
/// exactly on the bound, so applying this twice changes nothing.
pub fn truncate_for_llm(text: &str) -> String {
    if text.chars().count() <= MAX_ERROR_CHARS {
        return text.to_string();
    }
    let keep = MAX_ERROR_CHARS - TRUNCATION_MARKER.chars().count();
    let mut truncated: String = text.chars().take(keep).collect();
    truncated.push_str(TRUNCATION_MARKER);
    truncated
}
