//! agent_status tool implementation.

use offcache_core::ProvisionStatus;
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::json_result;
use crate::host::{HostState, Runtime};

/// Output structure for agent_status tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct AgentStatusOutput {
    pub state: HostState,
    /// Active cache generation.
    pub version: String,
    pub skipped_waiting: bool,
    pub clients_claimed: bool,
    /// Outcome of the last install; absent before the first one.
    pub provision: Option<ProvisionStatus>,
    /// Generations deleted by the last activation.
    pub reclaimed: Vec<String>,
    /// Resolved manifest.
    pub manifest: Vec<String>,
}

/// Implementation of the agent_status tool.
pub async fn status_impl(runtime: &Runtime) -> Result<CallToolResult, McpError> {
    let agent = runtime.agent();
    let host = runtime.host();
    let output = AgentStatusOutput {
        state: host.state(),
        version: agent.version().to_string(),
        skipped_waiting: host.skipped_waiting(),
        clients_claimed: host.clients_claimed(),
        provision: agent.last_provision(),
        reclaimed: agent.last_reclaim(),
        manifest: agent.manifest().iter().map(|u| u.to_string()).collect(),
    };
    json_result(&output)
}
