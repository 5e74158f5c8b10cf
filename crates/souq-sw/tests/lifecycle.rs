//! Install, activate and update propagation.

mod common;

use common::{config, url, MockFetcher, ORIGIN};
use souq_sw::{
    ActivationPolicy, CacheMode, CacheStorage, Client, ClientMessage, Fetcher, Registration,
    RegistrationEvent, Request, Response, ServiceWorkerError, ServiceWorkerState, WorkerContext,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use url::Url;

fn scope() -> Url {
    Url::parse(ORIGIN).unwrap()
}

/// Parks the first `hold` fetches until the gate opens.
#[derive(Clone)]
struct GatedFetcher {
    inner: MockFetcher,
    hold: Arc<AtomicUsize>,
    parked: Arc<AtomicUsize>,
    gate: Arc<watch::Sender<bool>>,
}

impl GatedFetcher {
    fn new(inner: MockFetcher, hold: usize) -> Self {
        let (gate, _) = watch::channel(false);
        Self {
            inner,
            hold: Arc::new(AtomicUsize::new(hold)),
            parked: Arc::new(AtomicUsize::new(0)),
            gate: Arc::new(gate),
        }
    }

    async fn wait_parked(&self, count: usize) {
        while self.parked.load(Ordering::SeqCst) < count {
            tokio::task::yield_now().await;
        }
    }

    fn open(&self) {
        self.gate.send_replace(true);
    }
}

impl Fetcher for GatedFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response, ServiceWorkerError> {
        let held = self
            .hold
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if held {
            let mut gate = self.gate.subscribe();
            self.parked.fetch_add(1, Ordering::SeqCst);
            let _ = gate.wait_for(|open| *open).await;
        }
        self.inner.fetch(request).await
    }
}

#[tokio::test]
async fn test_install_caches_whole_shell_with_reload() {
    let fetcher = MockFetcher::with_shell();
    let (registration, _rx) = Registration::new(scope(), fetcher.clone());

    let worker = registration.register(config("v1")).await.unwrap();

    assert_eq!(worker.state().await, ServiceWorkerState::Activated);
    assert_eq!(
        registration.caches().entry_keys("souq-market-cache-v1").await,
        vec![
            "https://souq.example/".to_string(),
            "https://souq.example/icons/icon.svg".to_string(),
            "https://souq.example/index.html".to_string(),
            "https://souq.example/manifest.json".to_string(),
        ]
    );
    assert!(fetcher
        .requests()
        .iter()
        .all(|(_, mode)| *mode == CacheMode::Reload));
}

#[tokio::test]
async fn test_failed_shell_fetch_leaves_store_untouched() {
    let fetcher = MockFetcher::with_shell();
    fetcher.fail("/manifest.json");
    let (registration, mut rx) = Registration::new(scope(), fetcher.clone());

    let err = registration.register(config("v1")).await.unwrap_err();

    assert!(matches!(err, ServiceWorkerError::InstallFailed { ref url, .. } if url.ends_with("/manifest.json")));
    assert!(registration.caches().keys().await.is_empty());
    assert!(registration.active().await.is_none());
    assert!(registration.waiting().await.is_none());

    let mut saw_failure = false;
    let mut saw_redundant = false;
    while let Ok(event) = rx.try_recv() {
        match event {
            RegistrationEvent::InstallFailed { .. } => saw_failure = true,
            RegistrationEvent::StateChange {
                new_state: ServiceWorkerState::Redundant,
                ..
            } => saw_redundant = true,
            _ => {}
        }
    }
    assert!(saw_failure);
    assert!(saw_redundant);
}

#[tokio::test]
async fn test_non_ok_shell_response_fails_install() {
    let fetcher = MockFetcher::with_shell();
    fetcher.route("/icons/icon.svg", 500, "boom");
    let (registration, _rx) = Registration::new(scope(), fetcher);

    let err = registration.register(config("v1")).await.unwrap_err();
    assert!(err.to_string().contains("HTTP 500"));
    assert!(registration.caches().keys().await.is_empty());
}

#[tokio::test]
async fn test_failed_update_keeps_previous_version() {
    let fetcher = MockFetcher::with_shell();
    let (registration, _rx) = Registration::new(scope(), fetcher.clone());
    let v1 = registration.register(config("v1")).await.unwrap();

    fetcher.fail("/index.html");
    assert!(registration.register(config("v2")).await.is_err());

    let active = registration.active().await.unwrap();
    assert_eq!(active.id, v1.id);
    assert_eq!(
        registration.caches().keys().await,
        vec!["souq-market-cache-v1".to_string()]
    );
}

#[tokio::test]
async fn test_activation_evicts_old_generations() {
    let fetcher = MockFetcher::with_shell();
    let (registration, _rx) = Registration::new(scope(), fetcher);

    let v1 = registration.register(config("v1")).await.unwrap();
    registration
        .caches()
        .open("unrelated-leftover")
        .await;
    let v2 = registration.register(config("v2")).await.unwrap();

    assert_eq!(
        registration.caches().keys().await,
        vec!["souq-market-cache-v2".to_string()]
    );
    assert_eq!(v1.state().await, ServiceWorkerState::Redundant);
    assert_eq!(v2.state().await, ServiceWorkerState::Activated);
}

#[tokio::test]
async fn test_await_signal_waits_for_skip_waiting() {
    let fetcher = MockFetcher::with_shell();
    let (registration, _rx) = Registration::new(scope(), fetcher);

    let v1 = registration.register(config("v1")).await.unwrap();
    let v2 = registration
        .register(config("v2").with_activation(ActivationPolicy::AwaitSignal))
        .await
        .unwrap();

    assert_eq!(v2.state().await, ServiceWorkerState::Installed);
    assert_eq!(registration.active().await.unwrap().id, v1.id);
    assert_eq!(registration.caches().keys().await.len(), 2);

    registration
        .post_message(ClientMessage::from_json(r#"{"type":"SKIP_WAITING"}"#))
        .await
        .unwrap();

    assert_eq!(registration.active().await.unwrap().id, v2.id);
    assert!(registration.waiting().await.is_none());
    assert_eq!(v1.state().await, ServiceWorkerState::Redundant);
    assert_eq!(
        registration.caches().keys().await,
        vec!["souq-market-cache-v2".to_string()]
    );
}

#[tokio::test]
async fn test_first_install_activates_even_when_awaiting_signal() {
    let fetcher = MockFetcher::with_shell();
    let (registration, _rx) = Registration::new(scope(), fetcher);

    let worker = registration
        .register(config("v1").with_activation(ActivationPolicy::AwaitSignal))
        .await
        .unwrap();
    assert!(worker.is_active().await);
}

#[tokio::test]
async fn test_unknown_message_does_not_activate() {
    let fetcher = MockFetcher::with_shell();
    let (registration, _rx) = Registration::new(scope(), fetcher);

    registration.register(config("v1")).await.unwrap();
    let v2 = registration
        .register(config("v2").with_activation(ActivationPolicy::AwaitSignal))
        .await
        .unwrap();

    registration
        .post_message(ClientMessage::from_json(r#"{"type":"PING"}"#))
        .await
        .unwrap();
    assert_eq!(v2.state().await, ServiceWorkerState::Installed);
}

#[tokio::test]
async fn test_activation_claims_open_clients() {
    let fetcher = MockFetcher::with_shell();
    let (registration, mut rx) = Registration::new(scope(), fetcher);

    let page = Client::window(url("/posts/1"));
    let page_id = page.id.clone();
    registration.clients().write().await.add(page);

    let worker = registration.register(config("v1")).await.unwrap();

    let controller = registration.clients().read().await.get(&page_id).unwrap().controller;
    assert_eq!(controller, Some(worker.id));

    let mut changes = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let RegistrationEvent::ControllerChange { client_id, worker_id } = event {
            changes.push((client_id, worker_id));
        }
    }
    assert_eq!(changes, vec![(page_id, worker.id)]);
}

#[tokio::test]
async fn test_scope_mismatch_is_rejected() {
    let (registration, _rx) = Registration::new(scope(), MockFetcher::with_shell());
    let other = souq_sw::WorkerConfig::for_scope(Url::parse("https://other.example/").unwrap());
    assert!(matches!(
        registration.register(other).await,
        Err(ServiceWorkerError::RegistrationFailed(_))
    ));
}

#[tokio::test]
async fn test_unregister_makes_workers_redundant() {
    let (registration, _rx) = Registration::new(scope(), MockFetcher::with_shell());
    let page = Client::window(url("/home"));
    let page_id = page.id.clone();
    registration.clients().write().await.add(page);

    let worker = registration.register(config("v1")).await.unwrap();
    assert!(registration.unregister().await.unwrap());

    assert!(worker.is_redundant().await);
    assert!(registration.active().await.is_none());
    assert!(!registration.clients().read().await.get(&page_id).unwrap().is_controlled());
    assert!(!registration.unregister().await.unwrap());
}

#[tokio::test]
async fn test_restored_cache_storage_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("caches.json");

    let fetcher = MockFetcher::with_shell();
    let (registration, _rx) = Registration::new(scope(), fetcher.clone());
    registration.register(config("v1")).await.unwrap();
    registration.caches().save(&path).await.unwrap();

    let mut context = WorkerContext::new(Arc::new(fetcher.clone()));
    context.caches = Arc::new(CacheStorage::load(&path).await.unwrap());
    let (restarted, _rx) = Registration::with_context(scope(), context);
    assert_eq!(
        restarted.caches().keys().await,
        vec!["souq-market-cache-v1".to_string()]
    );

    fetcher.fail("/index.html");
    assert!(restarted.register(config("v1")).await.is_err());
    assert!(restarted
        .caches()
        .match_in("souq-market-cache-v1", &url("/index.html"))
        .await
        .is_some());
}

#[tokio::test]
async fn test_superseded_install_leaves_no_trace() {
    let fetcher = GatedFetcher::new(MockFetcher::with_shell(), 4);
    let (registration, mut events) = Registration::new(scope(), fetcher.clone());
    let registration = Arc::new(registration);

    let stalled = {
        let registration = Arc::clone(&registration);
        tokio::spawn(async move { registration.register(config("v2")).await })
    };
    fetcher.wait_parked(4).await;

    let newer = registration.register(config("v3")).await.unwrap();
    assert_eq!(newer.state().await, ServiceWorkerState::Activated);

    fetcher.open();
    let err = stalled.await.unwrap().unwrap_err();
    assert!(matches!(err, ServiceWorkerError::StateError(_)));

    assert!(registration.installing().await.is_none());
    assert!(registration.waiting().await.is_none());
    assert_eq!(registration.active().await.unwrap().version(), "v3");
    assert_eq!(
        registration.caches().keys().await,
        vec!["souq-market-cache-v3".to_string()]
    );

    let mut failed = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let RegistrationEvent::InstallFailed { version, .. } = event {
            failed.push(version);
        }
    }
    assert_eq!(failed, vec!["v2".to_string()]);
}
