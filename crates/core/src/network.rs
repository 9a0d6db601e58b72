//! Network interface consumed by the agent.

use async_trait::async_trait;

use crate::request::{Request, Response};

/// Transport-level fetch failures.
///
/// HTTP error statuses are not represented here: a 404 or 500 is a
/// successful fetch as far as the agent is concerned.
#[derive(Debug, Clone, thiserror::Error)]
pub enum NetworkError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("failed to read response body: {0}")]
    Body(String),

    #[error("failed to build HTTP client: {0}")]
    Client(String),
}

/// Something that can turn a request into a response.
#[async_trait]
pub trait Network: Send + Sync {
    async fn fetch(&self, request: &Request) -> Result<Response, NetworkError>;
}
