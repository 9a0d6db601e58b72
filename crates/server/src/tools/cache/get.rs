//! cache_get tool implementation.
//!
//! Looks up an identifier in the active generation without touching the
//! network.

use offcache_core::{Error, GenerationStore, RequestKey};
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::host::Runtime;
use crate::tools::{ResponseView, json_result};

/// Parameters for the cache_get tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheGetParams {
    /// Resource identifier, absolute or relative to the application origin.
    pub url: String,
}

/// Output from the cache_get tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheGetOutput {
    /// Generation the entry was read from.
    pub generation: String,
    /// RFC 3339 time the entry was written.
    pub stored_at: String,
    pub response: ResponseView,
}

/// Implementation of the cache_get tool.
pub async fn get_impl(runtime: &Runtime, params: CacheGetParams) -> Result<CallToolResult, McpError> {
    let agent = runtime.agent();
    let key = RequestKey::get(agent.resolve(&params.url)?);

    let entry = agent
        .store()
        .get(agent.version(), &key)
        .await?
        .ok_or_else(|| Error::CacheMiss(key.url.to_string()))?;

    let output = CacheGetOutput {
        generation: agent.version().to_string(),
        stored_at: entry.stored_at.clone(),
        response: ResponseView::new(&entry.into_response()),
    };
    json_result(&output)
}
