use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;

use super::*;
use crate::cache::CacheDb;

const ORIGIN: &str = "https://app.example.com";

#[derive(Default)]
struct FakeNetwork {
    routes: Mutex<HashMap<String, (u16, &'static str)>>,
    offline: AtomicBool,
    calls: AtomicUsize,
}

impl FakeNetwork {
    fn route(&self, path: &str, status: u16, body: &'static str) {
        let url = url(path).to_string();
        self.routes.lock().unwrap().insert(url, (status, body));
    }

    fn go_offline(&self) {
        self.offline.store(true, Ordering::SeqCst);
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Network for FakeNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response, NetworkError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.offline.load(Ordering::SeqCst) {
            return Err(NetworkError::Transport("network unreachable".into()));
        }
        let route = self.routes.lock().unwrap().get(request.url.as_str()).copied();
        match route {
            Some((status, body)) => Ok(Response {
                url: request.url.clone(),
                status,
                status_text: String::new(),
                headers: vec![("content-type".into(), "text/plain".into())],
                body: Bytes::from_static(body.as_bytes()),
            }),
            None => Err(NetworkError::Transport(format!("no route to {}", request.url))),
        }
    }
}

#[derive(Default)]
struct FakeHost {
    skipped_waiting: AtomicBool,
    claimed: AtomicBool,
}

impl HostControl for FakeHost {
    fn skip_waiting(&self) {
        self.skipped_waiting.store(true, Ordering::SeqCst);
    }

    fn claim_clients(&self) {
        self.claimed.store(true, Ordering::SeqCst);
    }
}

/// Failures injected into `ObservedStore`.
#[derive(Default)]
struct Faults {
    fail_writes: bool,
    fail_names: bool,
    fail_delete: Option<&'static str>,
}

/// Wraps the SQLite store to count reads/writes and inject failures.
struct ObservedStore {
    inner: CacheDb,
    gets: AtomicUsize,
    puts: AtomicUsize,
    faults: Faults,
}

#[async_trait]
impl GenerationStore for ObservedStore {
    async fn open(&self, generation: &str) -> Result<(), Error> {
        self.inner.open_generation(generation).await
    }

    async fn names(&self) -> Result<Vec<String>, Error> {
        if self.faults.fail_names {
            return Err(Error::CorruptEntry("generations table unreadable".into()));
        }
        self.inner.generation_names().await
    }

    async fn delete(&self, generation: &str) -> Result<bool, Error> {
        if self.faults.fail_delete == Some(generation) {
            return Err(Error::CorruptEntry(format!("{generation} is locked")));
        }
        self.inner.delete_generation(generation).await
    }

    async fn get(&self, generation: &str, key: &RequestKey) -> Result<Option<CachedResponse>, Error> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.inner.get_entry(generation, key).await
    }

    async fn put(&self, generation: &str, entry: CachedResponse) -> Result<(), Error> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        if self.faults.fail_writes {
            return Err(Error::InvalidInput("disk full".into()));
        }
        self.inner.put_entry(generation, &entry).await
    }

    async fn put_all(&self, generation: &str, entries: Vec<CachedResponse>) -> Result<usize, Error> {
        self.inner.put_entries(generation, &entries).await
    }

    async fn entry_count(&self, generation: &str) -> Result<u64, Error> {
        self.inner.entry_count(generation).await
    }
}

fn url(path: &str) -> Url {
    Url::parse(ORIGIN).unwrap().join(path).unwrap()
}

fn settings(version: &str, manifest: &[&str]) -> AgentSettings {
    AgentSettings {
        version: version.into(),
        manifest: manifest.iter().map(|s| s.to_string()).collect(),
        origin: Url::parse(ORIGIN).unwrap(),
        fallback_url: "/".into(),
        bypass: BypassRule::Patterns(vec!["supabase.co".into(), "/api".into()]),
        max_entry_bytes: 1024,
    }
}

struct Harness {
    agent: Arc<OfflineAgent>,
    bus: EventBus,
    store: Arc<ObservedStore>,
    network: Arc<FakeNetwork>,
    host: Arc<FakeHost>,
}

async fn harness_from(settings: AgentSettings, faults: Faults) -> Harness {
    let store = Arc::new(ObservedStore {
        inner: CacheDb::open_in_memory().await.unwrap(),
        gets: AtomicUsize::new(0),
        puts: AtomicUsize::new(0),
        faults,
    });
    let network = Arc::new(FakeNetwork::default());
    let host = Arc::new(FakeHost::default());
    let agent = Arc::new(OfflineAgent::new(settings, store.clone(), network.clone(), host.clone()).unwrap());
    let mut bus = EventBus::new();
    agent.register(&mut bus);
    Harness { agent, bus, store, network, host }
}

async fn harness_with(version: &str, manifest: &[&str], faults: Faults) -> Harness {
    harness_from(settings(version, manifest), faults).await
}

async fn harness(manifest: &[&str]) -> Harness {
    harness_with("v1", manifest, Faults::default()).await
}

fn served(disposition: FetchDisposition) -> Result<Served, Error> {
    match disposition {
        FetchDisposition::Responded(result) => result,
        FetchDisposition::Passthrough(request) => panic!("expected interception of {}", request.url),
    }
}

#[tokio::test]
async fn test_non_get_passes_through() {
    let h = harness(&[]).await;
    h.network.route("/form", 200, "ok");

    let request = Request::new("POST", url("/form"));
    let disposition = h.bus.dispatch_fetch(request.clone()).await;

    assert!(matches!(disposition, FetchDisposition::Passthrough(r) if r == request));
    assert_eq!(h.network.calls(), 0);
    assert_eq!(h.store.gets.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_bypass_never_touches_cache() {
    let h = harness(&[]).await;
    let request = Request::get(Url::parse("https://xyz.supabase.co/rest/v1/recipes").unwrap());

    let disposition = h.bus.dispatch_fetch(request).await;

    assert!(matches!(disposition, FetchDisposition::Passthrough(_)));
    assert_eq!(h.network.calls(), 0);
    assert_eq!(h.store.gets.load(Ordering::SeqCst), 0);
    assert_eq!(h.store.puts.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_bypassed_request_offline_gets_no_fallback() {
    let h = harness(&[]).await;
    h.network.route("/", 200, "<html>home</html>");
    served(h.bus.dispatch_fetch(Request::get(url("/"))).await).unwrap();
    h.agent.settle().await;
    h.network.go_offline();
    let gets_before = h.store.gets.load(Ordering::SeqCst);

    let disposition = h.bus.dispatch_fetch(Request::get(url("/api"))).await;

    let FetchDisposition::Passthrough(request) = disposition else {
        panic!("bypassed request must not be intercepted");
    };
    assert!(h.network.fetch(&request).await.is_err());
    assert_eq!(h.store.gets.load(Ordering::SeqCst), gets_before);
}

#[tokio::test]
async fn test_network_response_written_back() {
    let h = harness(&[]).await;
    h.network.route("/recipes.json", 200, "[1,2,3]");

    let first = served(h.bus.dispatch_fetch(Request::get(url("/recipes.json"))).await).unwrap();
    assert_eq!(first.source, ResponseSource::Network);
    assert_eq!(first.response.body, Bytes::from_static(b"[1,2,3]"));
    h.agent.settle().await;

    h.network.go_offline();
    let second = served(h.bus.dispatch_fetch(Request::get(url("/recipes.json"))).await).unwrap();

    assert_eq!(second.source, ResponseSource::Cache);
    assert_eq!(second.response.body, Bytes::from_static(b"[1,2,3]"));
    assert_eq!(second.response.status, 200);
}

#[tokio::test]
async fn test_error_status_is_cached_and_overwrites() {
    let h = harness(&[]).await;
    h.network.route("/menu", 200, "good");
    served(h.bus.dispatch_fetch(Request::get(url("/menu"))).await).unwrap();
    h.agent.settle().await;

    h.network.route("/menu", 500, "server error");
    let error_page = served(h.bus.dispatch_fetch(Request::get(url("/menu"))).await).unwrap();
    assert_eq!(error_page.source, ResponseSource::Network);
    assert_eq!(error_page.response.status, 500);
    h.agent.settle().await;

    h.network.go_offline();
    let cached = served(h.bus.dispatch_fetch(Request::get(url("/menu"))).await).unwrap();
    assert_eq!(cached.response.status, 500);
    assert_eq!(cached.response.body, Bytes::from_static(b"server error"));
}

#[tokio::test]
async fn test_offline_falls_back_to_root_document() {
    let h = harness(&[]).await;
    h.network.route("/", 200, "<html>home</html>");
    served(h.bus.dispatch_fetch(Request::get(url("/"))).await).unwrap();
    h.agent.settle().await;
    h.network.go_offline();

    let result = served(h.bus.dispatch_fetch(Request::get(url("/b.png"))).await).unwrap();

    assert_eq!(result.source, ResponseSource::Fallback);
    assert_eq!(result.response.body, Bytes::from_static(b"<html>home</html>"));
}

#[tokio::test]
async fn test_total_miss_fails_fetch() {
    let h = harness(&[]).await;
    h.network.go_offline();

    let result = served(h.bus.dispatch_fetch(Request::get(url("/b.png"))).await);

    assert!(matches!(result, Err(Error::TotalMiss(_))));
}

#[tokio::test]
async fn test_write_failure_does_not_fail_fetch() {
    let h = harness_with("v1", &[], Faults { fail_writes: true, ..Default::default() }).await;
    h.network.route("/a.js", 200, "console.log(1)");

    let result = served(h.bus.dispatch_fetch(Request::get(url("/a.js"))).await).unwrap();
    h.agent.settle().await;

    assert_eq!(result.source, ResponseSource::Network);
    assert_eq!(h.store.puts.load(Ordering::SeqCst), 1);
    assert_eq!(h.store.entry_count("v1").await.unwrap(), 0);
}

#[tokio::test]
async fn test_oversized_response_served_live_without_write_back() {
    let h = harness_from(AgentSettings { max_entry_bytes: 8, ..settings("v1", &["/"]) }, Faults::default()).await;
    h.network.route("/", 200, "<html>home</html>");
    h.network.route("/big.png", 200, "0123456789abcdef");
    h.bus.dispatch_install().await;
    h.bus.dispatch_activate().await;
    let puts_before = h.store.puts.load(Ordering::SeqCst);

    let result = served(h.bus.dispatch_fetch(Request::get(url("/big.png"))).await).unwrap();
    h.agent.settle().await;

    assert_eq!(result.source, ResponseSource::Network);
    assert_eq!(result.response.body, Bytes::from_static(b"0123456789abcdef"));
    assert_eq!(h.store.puts.load(Ordering::SeqCst), puts_before);
    assert!(h.store.inner.get_entry("v1", &RequestKey::get(url("/big.png"))).await.unwrap().is_none());
}

#[tokio::test]
async fn test_install_provisions_manifest() {
    let h = harness(&["/", "/a.js"]).await;
    h.network.route("/", 200, "<html>home</html>");
    h.network.route("/a.js", 200, "console.log(1)");

    h.bus.dispatch_install().await;

    assert_eq!(h.agent.last_provision(), Some(ProvisionStatus::Complete { stored: 2 }));
    assert!(h.host.skipped_waiting.load(Ordering::SeqCst));
    let root = h.store.inner.get_entry("v1", &RequestKey::get(url("/"))).await.unwrap().unwrap();
    let script = h.store.inner.get_entry("v1", &RequestKey::get(url("/a.js"))).await.unwrap().unwrap();
    assert_eq!(root.body, Bytes::from_static(b"<html>home</html>"));
    assert_eq!(script.body, Bytes::from_static(b"console.log(1)"));
}

#[tokio::test]
async fn test_install_with_one_failure_is_contained() {
    let h = harness(&["/", "/missing.js"]).await;
    h.network.route("/", 200, "<html>home</html>");

    h.bus.dispatch_install().await;

    let status = h.agent.last_provision().unwrap();
    assert!(matches!(status, ProvisionStatus::Failed { ref reason } if reason.contains("missing.js")));
    assert!(h.host.skipped_waiting.load(Ordering::SeqCst));
    assert_eq!(h.store.entry_count("v1").await.unwrap(), 0);
}

#[tokio::test]
async fn test_provision_rejects_error_status() {
    let h = harness(&["/", "/logo.png"]).await;
    h.network.route("/", 200, "<html>home</html>");
    h.network.route("/logo.png", 404, "not found");

    let result = h.agent.provision().await;

    assert!(matches!(result, Err(Error::ProvisionFailed(reason)) if reason.contains("404")));
    assert_eq!(h.store.entry_count("v1").await.unwrap(), 0);
}

#[tokio::test]
async fn test_activate_reclaims_stale_generations() {
    let h = harness_with("v2", &["/"], Faults::default()).await;
    h.network.route("/", 200, "<html>v2</html>");
    h.store.inner.open_generation("v1").await.unwrap();
    h.store.inner.open_generation("v0").await.unwrap();

    h.bus.dispatch_install().await;
    h.bus.dispatch_activate().await;

    assert_eq!(h.store.names().await.unwrap(), vec!["v2".to_string()]);
    let mut deleted = h.agent.last_reclaim();
    deleted.sort();
    assert_eq!(deleted, vec!["v0".to_string(), "v1".to_string()]);
    assert!(h.host.claimed.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_activate_survives_failed_delete() {
    let h = harness_with("v3", &[], Faults { fail_delete: Some("v1"), ..Default::default() }).await;
    h.store.inner.open_generation("v1").await.unwrap();
    h.store.inner.open_generation("v2").await.unwrap();
    h.store.inner.open_generation("v3").await.unwrap();

    h.bus.dispatch_activate().await;

    assert_eq!(h.agent.last_reclaim(), vec!["v2".to_string()]);
    assert_eq!(h.store.inner.generation_names().await.unwrap(), vec!["v1".to_string(), "v3".to_string()]);
    assert!(h.host.claimed.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_activate_survives_unreadable_generation_list() {
    let h = harness_with("v2", &[], Faults { fail_names: true, ..Default::default() }).await;
    h.store.inner.open_generation("v1").await.unwrap();

    h.bus.dispatch_activate().await;

    assert!(h.agent.last_reclaim().is_empty());
    assert_eq!(h.store.inner.generation_names().await.unwrap(), vec!["v1".to_string()]);
    assert!(h.host.claimed.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_reclaim_with_nothing_to_delete() {
    let h = harness(&[]).await;

    h.bus.dispatch_activate().await;

    assert!(h.agent.last_reclaim().is_empty());
    assert!(h.host.claimed.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_mediation_reads_only_active_generation() {
    let h = harness_with("v2", &[], Faults::default()).await;
    let stale = CachedResponse {
        key: RequestKey::get(url("/old.css")),
        response_url: url("/old.css"),
        status: 200,
        status_text: "OK".into(),
        headers: Vec::new(),
        body: Bytes::from_static(b"body{}"),
        stored_at: chrono::Utc::now().to_rfc3339(),
    };
    h.store.inner.put_entry("v1", &stale).await.unwrap();
    h.network.go_offline();

    let result = h.agent.mediate(Request::get(url("/old.css"))).await;

    assert!(matches!(result, Err(Error::TotalMiss(_))));
}

#[test]
fn test_invalid_manifest_entry_rejected() {
    let agent = OfflineAgent::new(
        settings("v1", &["ftp://files.example.com/a"]),
        Arc::new(NoStore),
        Arc::new(FakeNetwork::default()),
        Arc::new(FakeHost::default()),
    );
    assert!(matches!(agent, Err(Error::InvalidUrl(_))));
}

struct NoStore;

#[async_trait]
impl GenerationStore for NoStore {
    async fn open(&self, _: &str) -> Result<(), Error> {
        Ok(())
    }

    async fn names(&self) -> Result<Vec<String>, Error> {
        Ok(Vec::new())
    }

    async fn delete(&self, _: &str) -> Result<bool, Error> {
        Ok(false)
    }

    async fn get(&self, _: &str, _: &RequestKey) -> Result<Option<CachedResponse>, Error> {
        Ok(None)
    }

    async fn put(&self, _: &str, _: CachedResponse) -> Result<(), Error> {
        Ok(())
    }

    async fn put_all(&self, _: &str, entries: Vec<CachedResponse>) -> Result<usize, Error> {
        Ok(entries.len())
    }

    async fn entry_count(&self, _: &str) -> Result<u64, Error> {
        Ok(0)
    }
}
