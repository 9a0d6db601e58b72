//! agent_fetch tool implementation.
//!
//! Dispatches a fetch event for the request; the agent answers network-first
//! with cache fallback, or lets the request pass through to the network.

use std::collections::BTreeMap;

use offcache_core::{Error, Request, ResponseSource};
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::{ResponseView, json_result};
use crate::host::Runtime;

/// Input parameters for agent_fetch tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct AgentFetchParams {
    /// Resource identifier, absolute or relative to the application origin.
    pub url: String,

    /// HTTP method (default: GET). Only GET requests are cached.
    #[serde(default = "default_method")]
    pub method: String,

    /// Extra request headers.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

fn default_method() -> String {
    "GET".into()
}

/// Output structure for agent_fetch tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct AgentFetchOutput {
    /// Whether the agent mediated the request.
    pub intercepted: bool,
    /// Where the response came from.
    pub source: ResponseSource,
    pub response: ResponseView,
}

/// Implementation of the agent_fetch tool.
pub async fn fetch_impl(runtime: &Runtime, params: AgentFetchParams) -> Result<CallToolResult, McpError> {
    if params.url.trim().is_empty() {
        return Err(Error::InvalidInput("url cannot be empty".into()).into());
    }
    if params.method.trim().is_empty() {
        return Err(Error::InvalidInput("method cannot be empty".into()).into());
    }

    let url = runtime.agent().resolve(&params.url)?;
    let mut request = Request::new(params.method.trim(), url);
    for (name, value) in params.headers {
        request = request.with_header(name, value);
    }

    let fetched = runtime.fetch(request).await?;
    tracing::debug!(
        url = %fetched.served.response.url,
        source = ?fetched.served.source,
        intercepted = fetched.intercepted,
        "agent_fetch served"
    );

    let output = AgentFetchOutput {
        intercepted: fetched.intercepted,
        source: fetched.served.source,
        response: ResponseView::new(&fetched.served.response),
    };
    json_result(&output)
}
