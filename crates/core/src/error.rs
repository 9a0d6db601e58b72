//! Unified error types for offcache.
//!
//! Only `TotalMiss` ever reaches a consumer of the agent; the other
//! lifecycle kinds are logged and contained where they occur.

use rmcp::model::{ErrorCode, ErrorData as McpError};
use tokio_rusqlite::rusqlite;

use crate::network::NetworkError;

/// Unified error types for the offline cache agent.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid input parameters (e.g., empty URL).
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// Resource identifier could not be resolved to an absolute URL.
    #[error("INVALID_URL: {0}")]
    InvalidUrl(String),

    /// A manifest identifier failed to fetch during provisioning.
    #[error("PROVISION_FAILED: {0}")]
    ProvisionFailed(String),

    /// Best-effort write into the active generation failed.
    #[error("CACHE_WRITE_FAILED: {0}")]
    CacheWrite(String),

    /// Transport-level failure while fetching from the network.
    #[error("NETWORK_ERROR: {0}")]
    Network(#[from] NetworkError),

    /// No entry for the identifier in the active generation.
    #[error("CACHE_MISS: {0}")]
    CacheMiss(String),

    /// Neither the network nor any cache entry could satisfy the request.
    #[error("TOTAL_MISS: {0}")]
    TotalMiss(String),

    /// Database operation failed.
    #[error("CACHE_ERROR: {0}")]
    Database(tokio_rusqlite::Error),

    /// Migration failed to apply.
    #[error("CACHE_ERROR: migration failed: {0}")]
    MigrationFailed(String),

    /// A stored entry could not be decoded.
    #[error("CACHE_ERROR: corrupt entry: {0}")]
    CorruptEntry(String),
}

impl From<tokio_rusqlite::Error<Error>> for Error {
    fn from(err: tokio_rusqlite::Error<Error>) -> Self {
        match err {
            tokio_rusqlite::Error::Error(e) => e,
            tokio_rusqlite::Error::ConnectionClosed => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
            tokio_rusqlite::Error::Close(c) => Error::Database(tokio_rusqlite::Error::Close(c)),
            _ => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
        }
    }
}

impl From<tokio_rusqlite::Error<rusqlite::Error>> for Error {
    fn from(err: tokio_rusqlite::Error<rusqlite::Error>) -> Self {
        Error::Database(err)
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Database(tokio_rusqlite::Error::Error(err))
    }
}

impl From<Error> for McpError {
    fn from(err: Error) -> Self {
        let (code, message) = match &err {
            Error::InvalidInput(msg) => (-32602, msg.clone()),
            Error::InvalidUrl(msg) => (-32003, msg.clone()),
            Error::ProvisionFailed(msg) => (-32010, msg.clone()),
            Error::CacheWrite(msg) => (-32011, msg.clone()),
            Error::Network(e) => (-32008, e.to_string()),
            Error::CacheMiss(msg) => (-32004, msg.clone()),
            Error::TotalMiss(msg) => (-32001, msg.clone()),
            Error::Database(e) => (-32002, e.to_string()),
            Error::MigrationFailed(msg) => (-32002, msg.clone()),
            Error::CorruptEntry(msg) => (-32002, msg.clone()),
        };

        McpError { code: ErrorCode(code), message: message.into(), data: None }
    }
}
