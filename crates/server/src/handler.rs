//! MCP server handler implementation.
//!
//! This module defines the main server handler that
//! routes tool calls to the appropriate implementations.
use std::sync::Arc;

use crate::host::Runtime;
use crate::tools::agent_fetch::{AgentFetchParams, fetch_impl};
use crate::tools::agent_status::status_impl;
use crate::tools::cache::{CacheGetParams, get_impl, list_impl};

use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::{
        tool::{ToolCallContext, ToolRouter},
        wrapper::Parameters,
    },
    model::{
        CallToolRequestParam, CallToolResult, Implementation, ListToolsResult, PaginatedRequestParam, ProtocolVersion,
        ServerCapabilities, ServerInfo,
    },
    service::{RequestContext, RoleServer},
    tool, tool_router,
};

/// The main MCP server handler for the offline cache agent.
#[derive(Clone)]
pub struct OffcacheServer {
    tool_router: ToolRouter<Self>,
    runtime: Arc<Runtime>,
}

/// Tool router implementation using the #[tool_router] macro.
///
/// This macro generates the routing logic that maps tool names to handler methods.
#[tool_router]
impl OffcacheServer {
    /// Create a new server handler around a started runtime.
    pub fn new(runtime: Arc<Runtime>) -> Self {
        Self { tool_router: Self::tool_router(), runtime }
    }

    /// Fetch a resource through the offline cache agent.
    #[tool(description = "Fetch a URL through the offline cache agent. GET requests are served network-first \
                          and fall back to the cache when the network is unavailable.")]
    async fn agent_fetch(&self, params: Parameters<AgentFetchParams>) -> Result<CallToolResult, McpError> {
        fetch_impl(&self.runtime, params.0).await
    }

    #[tool(description = "Report the agent lifecycle state, active cache version and last install/activate outcome.")]
    async fn agent_status(&self) -> Result<CallToolResult, McpError> {
        status_impl(&self.runtime).await
    }

    #[tool(description = "List cache generations with their entry counts.")]
    async fn cache_list(&self) -> Result<CallToolResult, McpError> {
        list_impl(&self.runtime).await
    }

    /// Read a cached entry without touching the network.
    #[tool(description = "Look up a URL in the active cache generation without using the network.")]
    async fn cache_get(&self, params: Parameters<CacheGetParams>) -> Result<CallToolResult, McpError> {
        get_impl(&self.runtime, params.0).await
    }
}

impl ServerHandler for OffcacheServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "offcache-agent".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Default::default()
            },
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self, _request: Option<PaginatedRequestParam>, _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, rmcp::model::ErrorData> {
        Ok(ListToolsResult { meta: None, tools: self.tool_router.list_all(), next_cursor: None })
    }

    async fn call_tool(
        &self, request: CallToolRequestParam, context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, rmcp::model::ErrorData> {
        self.tool_router
            .call(ToolCallContext::new(self, request, context))
            .await
    }
}
