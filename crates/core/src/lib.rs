//! Core types and shared functionality for offcache.
//!
//! This crate provides:
//! - Generation store implementation with SQLite backend
//! - The offline cache agent and its lifecycle event bus
//! - Unified error types
//! - Configuration structures

pub mod agent;
pub mod cache;
pub mod config;
pub mod error;
pub mod network;
pub mod request;

pub use agent::{
    AgentSettings, BypassRule, EventBus, ExtendableEvent, FetchDisposition, FetchEvent, GenerationStore, HostControl,
    OfflineAgent, ProvisionStatus, ResponseSource, Served,
};
pub use cache::{CacheDb, CachedResponse};
pub use config::{AppConfig, ConfigError};
pub use error::Error;
pub use network::{Network, NetworkError};
pub use request::{Request, RequestKey, Response};
