//! Scripted network for worker tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use souq_sw::{CacheMode, Fetcher, Request, Response, ServiceWorkerError, WorkerConfig};
use url::Url;

pub const ORIGIN: &str = "https://souq.example/";

#[derive(Default)]
struct State {
    routes: Mutex<HashMap<String, (u16, Vec<u8>)>>,
    offline: Mutex<HashSet<String>>,
    requests: Mutex<Vec<(String, CacheMode)>>,
    calls: AtomicUsize,
}

/// A network that answers from a route table and counts every call.
#[derive(Clone, Default)]
pub struct MockFetcher {
    state: Arc<State>,
}

#[allow(dead_code)]
impl MockFetcher {
    pub fn new() -> Self {
        init_tracing();
        Self::default()
    }

    /// A network serving the default app shell.
    pub fn with_shell() -> Self {
        let fetcher = Self::new();
        fetcher.route("/", 200, "<html>root</html>");
        fetcher.route("/index.html", 200, "<html>shell</html>");
        fetcher.route("/manifest.json", 200, r#"{"name":"souq"}"#);
        fetcher.route("/icons/icon.svg", 200, "<svg/>");
        fetcher
    }

    pub fn route(&self, path: &str, status: u16, body: &str) {
        self.state
            .routes
            .lock()
            .unwrap()
            .insert(url(path).to_string(), (status, body.as_bytes().to_vec()));
    }

    /// Make requests for `path` fail at the transport level.
    pub fn fail(&self, path: &str) {
        self.state.offline.lock().unwrap().insert(url(path).to_string());
    }

    pub fn restore(&self, path: &str) {
        self.state.offline.lock().unwrap().remove(&url(path).to_string());
    }

    pub fn calls(&self) -> usize {
        self.state.calls.load(Ordering::SeqCst)
    }

    pub fn reset_calls(&self) {
        self.state.calls.store(0, Ordering::SeqCst);
        self.state.requests.lock().unwrap().clear();
    }

    pub fn requests(&self) -> Vec<(String, CacheMode)> {
        self.state.requests.lock().unwrap().clone()
    }
}

impl Fetcher for MockFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response, ServiceWorkerError> {
        self.state.calls.fetch_add(1, Ordering::SeqCst);
        let key = request.url.to_string();
        self.state
            .requests
            .lock()
            .unwrap()
            .push((key.clone(), request.cache));

        if self.state.offline.lock().unwrap().contains(&key) {
            return Err(ServiceWorkerError::network(format!("{key} unreachable")));
        }
        let route = self.state.routes.lock().unwrap().get(&key).cloned();
        Ok(match route {
            Some((status, body)) => Response::new(request.url.clone(), status, body),
            None => Response::new(request.url.clone(), 404, "not found"),
        })
    }
}

/// Route worker logs through the test harness; `RUST_LOG` selects the level.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn url(path: &str) -> Url {
    Url::parse(ORIGIN).unwrap().join(path).unwrap()
}

#[allow(dead_code)]
pub fn config(version: &str) -> WorkerConfig {
    WorkerConfig::for_scope(Url::parse(ORIGIN).unwrap()).with_version(version)
}
