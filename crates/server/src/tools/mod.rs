//! MCP tool implementations.
//!
//! This module contains all tools exposed by the offcache agent server.

pub mod agent_fetch;
pub mod agent_status;
pub mod cache;

use offcache_core::{Error, Response};
use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A response rendered for tool output.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ResponseView {
    /// URL the response belongs to.
    pub url: String,
    /// HTTP status code.
    pub status: u16,
    pub status_text: String,
    /// Response headers as (name, value) pairs.
    pub headers: Vec<(String, String)>,
    /// Body as text; absent when the body is not valid UTF-8.
    pub body: Option<String>,
    /// Body length in bytes.
    pub body_bytes: usize,
}

impl ResponseView {
    pub fn new(response: &Response) -> Self {
        Self {
            url: response.url.to_string(),
            status: response.status,
            status_text: response.status_text.clone(),
            headers: response.headers.clone(),
            body: std::str::from_utf8(&response.body).ok().map(str::to_string),
            body_bytes: response.body.len(),
        }
    }
}

/// Serialize a tool output into a text result.
pub(crate) fn json_result<T: Serialize>(output: &T) -> Result<CallToolResult, McpError> {
    let json = serde_json::to_string_pretty(output)
        .map_err(|e| Error::InvalidInput(format!("Failed to serialize output: {e}")))?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}

/// Parse the JSON text carried by a tool result.
#[cfg(test)]
pub(crate) fn parse_result<T: serde::de::DeserializeOwned>(result: &CallToolResult) -> T {
    let content_val = serde_json::to_value(&result.content[0]).unwrap();
    let text = content_val
        .get("text")
        .and_then(|v| v.as_str())
        .expect("Expected text field in content");
    serde_json::from_str(text).unwrap()
}
