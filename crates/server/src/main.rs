//! offcache agent entry point.
//!
//! Loads configuration, opens the generation store, runs the agent's
//! install and activate lifecycle, then serves MCP tools on stdio.
//! Logging goes to stderr to avoid interfering with the JSON-RPC protocol on stdout.

use std::sync::Arc;

use anyhow::Result;
use offcache_client::{FetchConfig, HttpNetwork};
use offcache_core::{AgentSettings, AppConfig, CacheDb, OfflineAgent};
use rmcp::service::serve_server;
use rmcp::transport::io::stdio;
use tracing_subscriber::EnvFilter;

mod handler;
mod host;
mod tools;

#[cfg(test)]
mod testing;

use host::{Runtime, RuntimeHost};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load()?;
    tracing::info!(version = %config.cache_version, db = %config.db_path.display(), "starting offcache agent");

    let store = Arc::new(CacheDb::open(&config.db_path).await?);
    let network = Arc::new(HttpNetwork::new(FetchConfig::from(&config))?);
    let host = Arc::new(RuntimeHost::default());
    let agent = Arc::new(OfflineAgent::new(
        AgentSettings::from_config(&config)?,
        store,
        network.clone(),
        host.clone(),
    )?);

    let runtime = Arc::new(Runtime::new(agent, host, network));
    runtime.start().await;

    let handler = handler::OffcacheServer::new(runtime.clone());
    let server = serve_server(handler, stdio()).await?;

    server.waiting().await?;

    runtime.agent().settle().await;
    tracing::info!("offcache agent stopped");

    Ok(())
}
