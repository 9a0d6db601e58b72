//! The offline cache agent.
//!
//! ### Provision (install)
//! - Open the generation named by the current version
//! - Fetch every manifest identifier; store all of them or none
//! - Failures are logged, never retried, and do not block activation
//!
//! ### Reclaim (activate)
//! - Delete every generation other than the current one, concurrently
//!
//! ### Mediate (fetch)
//! - Non-GET and bypassed requests are not intercepted
//! - Network first; any HTTP status counts as success and is written back,
//!   unless the body exceeds the write-back limit
//! - On transport failure: cached entry, then the fallback document, then
//!   a total miss

pub mod bypass;
pub mod events;
pub mod store;

use std::sync::{Arc, Mutex, PoisonError};

use futures_util::future::{join_all, try_join_all};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use url::Url;

pub use bypass::BypassRule;
pub use events::{EventBus, ExtendableEvent, FetchDisposition, FetchEvent, LifecycleKind};
pub use store::{GenerationStore, HostControl};

use crate::cache::CachedResponse;
use crate::config::{AppConfig, ConfigError};
use crate::network::Network;
use crate::request::{Request, RequestKey, Response, resolve};
use crate::{Error, NetworkError};

/// Deploy-time inputs of the agent.
#[derive(Debug, Clone)]
pub struct AgentSettings {
    /// Name of the generation this agent reads and writes.
    pub version: String,
    /// Identifiers provisioned on install, relative or absolute.
    pub manifest: Vec<String>,
    /// Base for relative identifiers.
    pub origin: Url,
    /// Identifier served when a request misses both network and cache.
    pub fallback_url: String,
    pub bypass: BypassRule,
    /// Bodies larger than this are served but not written back.
    pub max_entry_bytes: usize,
}

impl AgentSettings {
    pub fn from_config(config: &AppConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            version: config.cache_version.clone(),
            manifest: config.manifest.clone(),
            origin: config.origin_url()?,
            fallback_url: config.fallback_url.clone(),
            bypass: BypassRule::Patterns(config.bypass_patterns.clone()),
            max_entry_bytes: config.max_bytes,
        })
    }
}

/// Outcome of the most recent provisioning run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ProvisionStatus {
    Complete { stored: usize },
    Failed { reason: String },
}

/// Where a served response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ResponseSource {
    /// Live network response
    Network,
    /// Entry for the request itself in the active generation
    Cache,
    /// The fallback document, served in place of a missing entry
    Fallback,
}

/// A response produced by mediation.
#[derive(Debug)]
pub struct Served {
    pub response: Response,
    pub source: ResponseSource,
}

/// Network-first offline cache agent.
pub struct OfflineAgent {
    version: String,
    origin: Url,
    manifest: Vec<Url>,
    fallback: RequestKey,
    bypass: BypassRule,
    max_entry_bytes: usize,
    store: Arc<dyn GenerationStore>,
    network: Arc<dyn Network>,
    host: Arc<dyn HostControl>,
    write_backs: Mutex<Vec<JoinHandle<()>>>,
    last_provision: Mutex<Option<ProvisionStatus>>,
    last_reclaim: Mutex<Vec<String>>,
}

impl OfflineAgent {
    /// Build an agent, resolving every manifest identifier up front.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidUrl` if a manifest or fallback identifier
    /// cannot be resolved against the origin.
    pub fn new(
        settings: AgentSettings, store: Arc<dyn GenerationStore>, network: Arc<dyn Network>,
        host: Arc<dyn HostControl>,
    ) -> Result<Self, Error> {
        let manifest = settings
            .manifest
            .iter()
            .map(|id| resolve(&settings.origin, id))
            .collect::<Result<Vec<_>, _>>()?;
        let fallback = RequestKey::get(resolve(&settings.origin, &settings.fallback_url)?);

        Ok(Self {
            version: settings.version,
            origin: settings.origin,
            manifest,
            fallback,
            bypass: settings.bypass,
            max_entry_bytes: settings.max_entry_bytes,
            store,
            network,
            host,
            write_backs: Mutex::new(Vec::new()),
            last_provision: Mutex::new(None),
            last_reclaim: Mutex::new(Vec::new()),
        })
    }

    /// The generation this agent owns.
    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn origin(&self) -> &Url {
        &self.origin
    }

    pub fn manifest(&self) -> &[Url] {
        &self.manifest
    }

    pub fn store(&self) -> &Arc<dyn GenerationStore> {
        &self.store
    }

    /// Resolve a resource identifier against the agent's origin.
    pub fn resolve(&self, identifier: &str) -> Result<Url, Error> {
        resolve(&self.origin, identifier)
    }

    pub fn last_provision(&self) -> Option<ProvisionStatus> {
        self.last_provision.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Generations deleted by the most recent reclaim.
    pub fn last_reclaim(&self) -> Vec<String> {
        self.last_reclaim.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Attach install, activate and fetch listeners to `bus`.
    pub fn register(self: &Arc<Self>, bus: &mut EventBus) {
        let agent = Arc::clone(self);
        bus.on_install(move |event| {
            let task = Arc::clone(&agent);
            event.wait_until(async move {
                task.install().await;
            });
            agent.host.skip_waiting();
        });

        let agent = Arc::clone(self);
        bus.on_activate(move |event| {
            let task = Arc::clone(&agent);
            event.wait_until(async move {
                task.reclaim().await;
            });
            agent.host.claim_clients();
        });

        let agent = Arc::clone(self);
        bus.on_fetch(move |event| {
            if !agent.intercepts(event.request()) {
                return;
            }
            let task = Arc::clone(&agent);
            let request = event.request().clone();
            event.respond_with(async move { task.mediate(request).await });
        });
    }

    /// Run provisioning and record its outcome; never fails.
    pub async fn install(&self) -> ProvisionStatus {
        let status = match self.provision().await {
            Ok(stored) => {
                tracing::info!(version = %self.version, stored, "cache generation provisioned");
                ProvisionStatus::Complete { stored }
            }
            Err(e) => {
                tracing::warn!(version = %self.version, error = %e, "provisioning failed; continuing without full coverage");
                ProvisionStatus::Failed { reason: e.to_string() }
            }
        };
        *self.last_provision.lock().unwrap_or_else(PoisonError::into_inner) = Some(status.clone());
        status
    }

    /// Fetch the whole manifest and store it in one atomic write.
    ///
    /// # Errors
    ///
    /// Returns `Error::ProvisionFailed` if any identifier fails to fetch or
    /// answers with a non-2xx status; nothing is written in that case.
    pub async fn provision(&self) -> Result<usize, Error> {
        self.store.open(&self.version).await?;

        let fetches = self.manifest.iter().map(|url| async move {
            let request = Request::get(url.clone());
            let response = self
                .network
                .fetch(&request)
                .await
                .map_err(|e| Error::ProvisionFailed(format!("{url}: {e}")))?;
            if !response.is_ok() {
                return Err(Error::ProvisionFailed(format!("{url}: status {}", response.status)));
            }
            Ok(CachedResponse::capture(request.key(), response))
        });
        let entries = try_join_all(fetches).await?;

        self.store.put_all(&self.version, entries).await
    }

    /// Delete every generation other than the current one.
    ///
    /// Returns the names that were deleted. Listing or deletion failures are
    /// logged and skipped.
    pub async fn reclaim(&self) -> Vec<String> {
        let names = match self.store.names().await {
            Ok(names) => names,
            Err(e) => {
                tracing::warn!(error = %e, "failed to list cache generations");
                Vec::new()
            }
        };

        let deletions = names.into_iter().filter(|name| *name != self.version).map(|name| async move {
            tracing::info!(generation = %name, "deleting stale cache generation");
            match self.store.delete(&name).await {
                Ok(_) => Some(name),
                Err(e) => {
                    tracing::warn!(generation = %name, error = %e, "failed to delete cache generation");
                    None
                }
            }
        });
        let deleted: Vec<String> = join_all(deletions).await.into_iter().flatten().collect();

        *self.last_reclaim.lock().unwrap_or_else(PoisonError::into_inner) = deleted.clone();
        deleted
    }

    /// Whether mediation applies to this request at all.
    pub fn intercepts(&self, request: &Request) -> bool {
        if !request.is_get() {
            return false;
        }
        if self.bypass.matches(&request.url) {
            tracing::debug!(url = %request.url, "bypassing cache for live-data request");
            return false;
        }
        true
    }

    /// Answer a request network-first.
    ///
    /// # Errors
    ///
    /// Returns `Error::TotalMiss` when the network fails and neither the
    /// request nor the fallback document is cached.
    pub async fn mediate(&self, request: Request) -> Result<Served, Error> {
        let key = request.key();
        match self.network.fetch(&request).await {
            Ok(response) => {
                if response.body.len() > self.max_entry_bytes {
                    tracing::debug!(
                        url = %request.url,
                        size = response.body.len(),
                        limit = self.max_entry_bytes,
                        "response too large to cache; serving without write-back"
                    );
                } else {
                    self.spawn_write_back(key, response.duplicate());
                }
                Ok(Served { response, source: ResponseSource::Network })
            }
            Err(e) => {
                tracing::debug!(url = %request.url, error = %e, "network failed; trying cache");
                self.serve_offline(&key, &e).await
            }
        }
    }

    async fn serve_offline(&self, key: &RequestKey, cause: &NetworkError) -> Result<Served, Error> {
        if let Some(entry) = self.lookup(key).await {
            return Ok(Served { response: entry.into_response(), source: ResponseSource::Cache });
        }
        if let Some(entry) = self.lookup(&self.fallback).await {
            tracing::debug!(url = %key.url, fallback = %self.fallback.url, "serving fallback document");
            return Ok(Served { response: entry.into_response(), source: ResponseSource::Fallback });
        }
        Err(Error::TotalMiss(format!("{}: {cause}", key.url)))
    }

    async fn lookup(&self, key: &RequestKey) -> Option<CachedResponse> {
        match self.store.get(&self.version, key).await {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(url = %key.url, error = %e, "cache lookup failed");
                None
            }
        }
    }

    fn spawn_write_back(&self, key: RequestKey, response: Response) {
        let store = Arc::clone(&self.store);
        let version = self.version.clone();
        let handle = tokio::spawn(async move {
            let url = key.url.clone();
            let entry = CachedResponse::capture(key, response);
            if let Err(e) = store.put(&version, entry).await {
                let e = Error::CacheWrite(e.to_string());
                tracing::warn!(url = %url, error = %e, "cache write-back failed");
            }
        });

        let mut pending = self.write_backs.lock().unwrap_or_else(PoisonError::into_inner);
        pending.retain(|h| !h.is_finished());
        pending.push(handle);
    }

    /// Wait for every write-back spawned so far to finish.
    pub async fn settle(&self) {
        let pending = std::mem::take(&mut *self.write_backs.lock().unwrap_or_else(PoisonError::into_inner));
        for handle in pending {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "write-back task aborted");
            }
        }
    }
}

#[cfg(test)]
mod tests;
