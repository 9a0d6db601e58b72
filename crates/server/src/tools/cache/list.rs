//! cache_list tool implementation.

use offcache_core::GenerationStore;
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::host::Runtime;
use crate::tools::json_result;

/// One generation in the store.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GenerationInfo {
    pub name: String,
    pub entries: u64,
    /// Whether this is the generation the agent reads and writes.
    pub active: bool,
}

/// Output from the cache_list tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheListOutput {
    pub generations: Vec<GenerationInfo>,
}

/// Implementation of the cache_list tool.
pub async fn list_impl(runtime: &Runtime) -> Result<CallToolResult, McpError> {
    let agent = runtime.agent();
    let store = agent.store();

    let mut generations = Vec::new();
    for name in store.names().await? {
        let entries = store.entry_count(&name).await?;
        let active = name == agent.version();
        generations.push(GenerationInfo { name, entries, active });
    }

    json_result(&CacheListOutput { generations })
}
