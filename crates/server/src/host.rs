//! Host runtime for the offline cache agent.
//!
//! Owns the lifecycle event bus, drives install and activate at start-up,
//! and performs default network handling for requests the agent does not
//! intercept.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use offcache_core::{Error, EventBus, FetchDisposition, HostControl, Network, OfflineAgent, Request, ResponseSource, Served};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Lifecycle state of the hosted agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum HostState {
    Parsed,
    Installing,
    Installed,
    Activating,
    Activated,
}

/// Receives the agent's control signals and tracks lifecycle state.
#[derive(Debug)]
pub struct RuntimeHost {
    state: RwLock<HostState>,
    skip_waiting: AtomicBool,
    clients_claimed: AtomicBool,
}

impl Default for RuntimeHost {
    fn default() -> Self {
        Self {
            state: RwLock::new(HostState::Parsed),
            skip_waiting: AtomicBool::new(false),
            clients_claimed: AtomicBool::new(false),
        }
    }
}

impl RuntimeHost {
    pub fn state(&self) -> HostState {
        *self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: HostState) {
        tracing::info!(?state, "agent lifecycle transition");
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = state;
    }

    pub fn skipped_waiting(&self) -> bool {
        self.skip_waiting.load(Ordering::SeqCst)
    }

    pub fn clients_claimed(&self) -> bool {
        self.clients_claimed.load(Ordering::SeqCst)
    }
}

impl HostControl for RuntimeHost {
    fn skip_waiting(&self) {
        tracing::debug!("agent requested immediate activation");
        self.skip_waiting.store(true, Ordering::SeqCst);
    }

    fn claim_clients(&self) {
        tracing::debug!("agent claimed open clients");
        self.clients_claimed.store(true, Ordering::SeqCst);
    }
}

/// Result of a request routed through the host.
#[derive(Debug)]
pub struct HostFetch {
    pub served: Served,
    /// False when the agent let the request pass through.
    pub intercepted: bool,
}

/// The running host: event bus, agent and default network.
pub struct Runtime {
    bus: EventBus,
    agent: Arc<OfflineAgent>,
    host: Arc<RuntimeHost>,
    network: Arc<dyn Network>,
}

impl Runtime {
    /// Register `agent`'s listeners on a fresh event bus.
    pub fn new(agent: Arc<OfflineAgent>, host: Arc<RuntimeHost>, network: Arc<dyn Network>) -> Self {
        let mut bus = EventBus::new();
        agent.register(&mut bus);
        Self { bus, agent, host, network }
    }

    pub fn agent(&self) -> &Arc<OfflineAgent> {
        &self.agent
    }

    pub fn host(&self) -> &RuntimeHost {
        &self.host
    }

    /// Install, then activate, waiting for each to settle.
    ///
    /// A single process never has a previous instance to wait for, so
    /// activation follows install whether or not the agent skipped waiting.
    pub async fn start(&self) {
        self.host.set_state(HostState::Installing);
        self.bus.dispatch_install().await;
        self.host.set_state(HostState::Installed);
        tracing::debug!(skipped_waiting = self.host.skipped_waiting(), "install settled; activating");

        self.host.set_state(HostState::Activating);
        self.bus.dispatch_activate().await;
        self.host.set_state(HostState::Activated);
    }

    /// Route a request through the agent, falling back to a plain fetch.
    ///
    /// Requests are only offered to the agent once it controls clients.
    pub async fn fetch(&self, request: Request) -> Result<HostFetch, Error> {
        let disposition = if self.controls_clients() {
            self.bus.dispatch_fetch(request).await
        } else {
            FetchDisposition::Passthrough(request)
        };

        match disposition {
            FetchDisposition::Responded(result) => result.map(|served| HostFetch { served, intercepted: true }),
            FetchDisposition::Passthrough(request) => {
                let response = self.network.fetch(&request).await?;
                Ok(HostFetch { served: Served { response, source: ResponseSource::Network }, intercepted: false })
            }
        }
    }

    fn controls_clients(&self) -> bool {
        self.host.state() == HostState::Activated || self.host.clients_claimed()
    }
}
