//! Typed lifecycle event bus.
//!
//! Listeners are registered once at process start. Install and activate
//! listeners receive an [`ExtendableEvent`] and may attach work with
//! `wait_until`; dispatch only returns once all of it has finished. Fetch
//! listeners receive a [`FetchEvent`] and may claim the request with
//! `respond_with`; unclaimed requests are handed back to the host.

use std::future::Future;

use futures_util::future::{BoxFuture, join_all};

use super::Served;
use crate::Error;
use crate::request::Request;

/// Which lifecycle event an [`ExtendableEvent`] represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleKind {
    Install,
    Activate,
}

/// Event handle whose lifetime can be extended by async work.
pub struct ExtendableEvent {
    kind: LifecycleKind,
    lifetime: Vec<BoxFuture<'static, ()>>,
}

impl ExtendableEvent {
    fn new(kind: LifecycleKind) -> Self {
        Self { kind, lifetime: Vec::new() }
    }

    pub fn kind(&self) -> LifecycleKind {
        self.kind
    }

    /// Keep the event alive until `task` completes.
    pub fn wait_until<F>(&mut self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.lifetime.push(Box::pin(task));
    }

    async fn settle(self) {
        join_all(self.lifetime).await;
    }
}

/// Event handle for one outbound request.
pub struct FetchEvent {
    request: Request,
    response: Option<BoxFuture<'static, Result<Served, Error>>>,
}

impl FetchEvent {
    fn new(request: Request) -> Self {
        Self { request, response: None }
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    /// Claim this request; the host will use `response` instead of the network.
    ///
    /// Only the first call takes effect.
    pub fn respond_with<F>(&mut self, response: F)
    where
        F: Future<Output = Result<Served, Error>> + Send + 'static,
    {
        if self.response.is_some() {
            tracing::warn!(url = %self.request.url, "respond_with called twice; ignoring");
            return;
        }
        self.response = Some(Box::pin(response));
    }

    pub fn is_claimed(&self) -> bool {
        self.response.is_some()
    }
}

/// What became of a dispatched fetch event.
#[derive(Debug)]
pub enum FetchDisposition {
    /// No listener claimed the request; the host performs default handling.
    Passthrough(Request),
    /// A listener answered the request.
    Responded(Result<Served, Error>),
}

type Listener<E> = Box<dyn Fn(&mut E) + Send + Sync>;

/// Registry of lifecycle listeners.
#[derive(Default)]
pub struct EventBus {
    install: Vec<Listener<ExtendableEvent>>,
    activate: Vec<Listener<ExtendableEvent>>,
    fetch: Vec<Listener<FetchEvent>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_install(&mut self, listener: impl Fn(&mut ExtendableEvent) + Send + Sync + 'static) {
        self.install.push(Box::new(listener));
    }

    pub fn on_activate(&mut self, listener: impl Fn(&mut ExtendableEvent) + Send + Sync + 'static) {
        self.activate.push(Box::new(listener));
    }

    pub fn on_fetch(&mut self, listener: impl Fn(&mut FetchEvent) + Send + Sync + 'static) {
        self.fetch.push(Box::new(listener));
    }

    /// Fire install and wait for every extension to finish.
    pub async fn dispatch_install(&self) {
        Self::dispatch_lifecycle(&self.install, LifecycleKind::Install).await;
    }

    /// Fire activate and wait for every extension to finish.
    pub async fn dispatch_activate(&self) {
        Self::dispatch_lifecycle(&self.activate, LifecycleKind::Activate).await;
    }

    async fn dispatch_lifecycle(listeners: &[Listener<ExtendableEvent>], kind: LifecycleKind) {
        let mut event = ExtendableEvent::new(kind);
        for listener in listeners {
            listener(&mut event);
        }
        tracing::debug!(?kind, extensions = event.lifetime.len(), "waiting for lifecycle event to settle");
        event.settle().await;
    }

    /// Fire fetch for `request`.
    ///
    /// Listeners run in registration order and stop once one of them claims
    /// the request.
    pub async fn dispatch_fetch(&self, request: Request) -> FetchDisposition {
        let mut event = FetchEvent::new(request);
        for listener in &self.fetch {
            listener(&mut event);
            if event.is_claimed() {
                break;
            }
        }

        match event.response {
            Some(response) => FetchDisposition::Responded(response.await),
            None => FetchDisposition::Passthrough(event.request),
        }
    }
}
