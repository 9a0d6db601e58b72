//! Test doubles shared by the server's unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use offcache_core::{
    AgentSettings, BypassRule, CacheDb, Network, NetworkError, OfflineAgent, Request, Response,
};
use url::Url;

use crate::host::{Runtime, RuntimeHost};

pub const ORIGIN: &str = "https://app.example.com";

/// In-process network answering from a fixed route table.
#[derive(Default)]
pub struct StaticNetwork {
    routes: Mutex<HashMap<String, (u16, &'static str)>>,
    offline: AtomicBool,
}

impl StaticNetwork {
    pub fn new(routes: &[(&str, u16, &'static str)]) -> Arc<Self> {
        let network = Self::default();
        {
            let mut table = network.routes.lock().unwrap();
            for (path, status, body) in routes {
                table.insert(network.url(path).to_string(), (*status, *body));
            }
        }
        Arc::new(network)
    }

    pub fn url(&self, path: &str) -> Url {
        Url::parse(ORIGIN).unwrap().join(path).unwrap()
    }

    pub fn go_offline(&self) {
        self.offline.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl Network for StaticNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response, NetworkError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(NetworkError::Transport("network unreachable".into()));
        }
        let route = self.routes.lock().unwrap().get(request.url.as_str()).copied();
        let (status, body) = route.ok_or_else(|| NetworkError::Transport(format!("no route to {}", request.url)))?;
        Ok(Response {
            url: request.url.clone(),
            status,
            status_text: String::new(),
            headers: vec![("content-type".into(), "text/html".into())],
            body: Bytes::from_static(body.as_bytes()),
        })
    }
}

/// Runtime over an in-memory store, generation "v1", bypassing "supabase.co".
pub async fn runtime_with(network: Arc<StaticNetwork>, manifest: &[&str]) -> Runtime {
    let settings = AgentSettings {
        version: "v1".into(),
        manifest: manifest.iter().map(|s| s.to_string()).collect(),
        origin: Url::parse(ORIGIN).unwrap(),
        fallback_url: "/".into(),
        bypass: BypassRule::Patterns(vec!["supabase.co".into()]),
        max_entry_bytes: 1024 * 1024,
    };
    let store = Arc::new(CacheDb::open_in_memory().await.unwrap());
    let host = Arc::new(RuntimeHost::default());
    let agent = Arc::new(OfflineAgent::new(settings, store, network.clone(), host.clone()).unwrap());
    Runtime::new(agent, host, network)
}
