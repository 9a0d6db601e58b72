//! Interfaces the agent consumes from its host.

use async_trait::async_trait;

use crate::Error;
use crate::cache::CachedResponse;
use crate::request::RequestKey;

/// Key-value store of named cache generations.
///
/// Implementations must give atomic per-key writes with last-write-wins
/// semantics, and `put_all` must store either every entry or none.
#[async_trait]
pub trait GenerationStore: Send + Sync {
    /// Create the generation if absent.
    async fn open(&self, generation: &str) -> Result<(), Error>;

    async fn names(&self) -> Result<Vec<String>, Error>;

    /// Remove a generation; false if it did not exist.
    async fn delete(&self, generation: &str) -> Result<bool, Error>;

    async fn get(&self, generation: &str, key: &RequestKey) -> Result<Option<CachedResponse>, Error>;

    async fn put(&self, generation: &str, entry: CachedResponse) -> Result<(), Error>;

    async fn put_all(&self, generation: &str, entries: Vec<CachedResponse>) -> Result<usize, Error>;

    async fn entry_count(&self, generation: &str) -> Result<u64, Error>;
}

/// Control signals the agent sends to the runtime hosting it.
///
/// Both are fire-and-forget.
pub trait HostControl: Send + Sync {
    /// Activate the installed agent without waiting for the previous one to retire.
    fn skip_waiting(&self);

    /// Route already-open consumers through this agent immediately.
    fn claim_clients(&self);
}
