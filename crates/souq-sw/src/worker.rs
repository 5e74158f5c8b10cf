//! The worker itself: per-version state plus the event dispatch table.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use url::Url;

use crate::cache::CacheStorage;
use crate::clients::Clients;
use crate::config::WorkerConfig;
use crate::error::{Result, ServiceWorkerError};
use crate::fetch::{Fetcher, Request};
use crate::lifecycle::{Activation, ClientMessage, ServiceWorkerId, ServiceWorkerState};
use crate::notification::{Notification, NotificationCenter, NotificationId};
use crate::push::PushMessage;
use crate::router::FetchOutcome;

/// Origin-wide resources every worker version shares.
pub struct WorkerContext<F> {
    pub caches: Arc<CacheStorage>,
    pub clients: Arc<RwLock<Clients>>,
    pub notifications: Arc<RwLock<NotificationCenter>>,
    pub fetcher: Arc<F>,
}

impl<F> WorkerContext<F> {
    pub fn new(fetcher: Arc<F>) -> Self {
        Self {
            caches: Arc::new(CacheStorage::new()),
            clients: Arc::new(RwLock::new(Clients::new())),
            notifications: Arc::new(RwLock::new(NotificationCenter::new())),
            fetcher,
        }
    }
}

impl<F> Clone for WorkerContext<F> {
    fn clone(&self) -> Self {
        Self {
            caches: Arc::clone(&self.caches),
            clients: Arc::clone(&self.clients),
            notifications: Arc::clone(&self.notifications),
            fetcher: Arc::clone(&self.fetcher),
        }
    }
}

/// Events delivered to a worker.
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    Install,
    Activate,
    Fetch(Request),
    Message(ClientMessage),
    Push(PushMessage),
    NotificationClick(NotificationId),
}

impl WorkerEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Install => "install",
            Self::Activate => "activate",
            Self::Fetch(_) => "fetch",
            Self::Message(_) => "message",
            Self::Push(_) => "push",
            Self::NotificationClick(_) => "notificationclick",
        }
    }
}

/// What a notification click resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickOutcome {
    /// An open window already showed the target; it was focused.
    Focused { client_id: String },
    /// No window matched; a new one was opened at `url`.
    Opened { client_id: String, url: Url },
}

/// Result of handling one event.
#[derive(Debug, Clone)]
pub enum EventOutcome {
    Installed { cached: usize },
    Activated(Activation),
    Fetch(FetchOutcome),
    NotificationShown(Notification),
    NotificationClicked(ClickOutcome),
    Done,
}

/// One version of the worker.
pub struct ServiceWorker<F> {
    pub id: ServiceWorkerId,
    pub(crate) config: Arc<WorkerConfig>,
    pub(crate) cache_name: String,
    state: RwLock<ServiceWorkerState>,
    skip_waiting: AtomicBool,
    pub(crate) caches: Arc<CacheStorage>,
    pub(crate) clients: Arc<RwLock<Clients>>,
    pub(crate) notifications: Arc<RwLock<NotificationCenter>>,
    pub(crate) fetcher: Arc<F>,
    pending: Mutex<Vec<JoinHandle<()>>>,
}

impl<F: Fetcher> ServiceWorker<F> {
    pub fn new(config: WorkerConfig, context: WorkerContext<F>) -> Self {
        let cache_name = config.cache_name();
        Self {
            id: ServiceWorkerId::new(),
            config: Arc::new(config),
            cache_name,
            state: RwLock::new(ServiceWorkerState::Parsed),
            skip_waiting: AtomicBool::new(false),
            caches: context.caches,
            clients: context.clients,
            notifications: context.notifications,
            fetcher: context.fetcher,
            pending: Mutex::new(Vec::new()),
        }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn version(&self) -> &str {
        &self.config.version
    }

    /// Name of the generation this worker owns.
    pub fn cache_name(&self) -> &str {
        &self.cache_name
    }

    pub async fn state(&self) -> ServiceWorkerState {
        *self.state.read().await
    }

    /// Move to `next`, rejecting transitions the lifecycle does not allow.
    pub async fn set_state(&self, next: ServiceWorkerState) -> Result<()> {
        let mut state = self.state.write().await;
        if !state.can_transition_to(next) {
            return Err(ServiceWorkerError::StateError(format!(
                "{} cannot move from {:?} to {:?}",
                self.id, *state, next
            )));
        }
        debug!(worker = %self.id, from = ?*state, to = ?next, "State change");
        *state = next;
        Ok(())
    }

    pub async fn is_active(&self) -> bool {
        self.state().await == ServiceWorkerState::Activated
    }

    pub async fn is_redundant(&self) -> bool {
        self.state().await == ServiceWorkerState::Redundant
    }

    /// Ask to be promoted from waiting without waiting for clients to close.
    pub fn skip_waiting(&self) {
        self.skip_waiting.store(true, Ordering::Release);
    }

    pub fn skip_waiting_requested(&self) -> bool {
        self.skip_waiting.load(Ordering::Acquire)
    }

    /// Keep the worker alive until `work` completes.
    pub async fn wait_until<Fut>(&self, work: Fut)
    where
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(work);
        let mut pending = self.pending.lock().await;
        pending.retain(|h| !h.is_finished());
        pending.push(handle);
    }

    /// Deferred tasks that have not been reaped yet.
    pub async fn pending_work(&self) -> usize {
        self.pending.lock().await.len()
    }

    /// Wait for every deferred task registered through `wait_until`.
    pub async fn settle(&self) {
        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.pending.lock().await);
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(worker = %self.id, error = %e, "Deferred work failed");
            }
        }
    }

    /// Dispatch an event to its handler.
    pub async fn dispatch(&self, event: WorkerEvent) -> Result<EventOutcome> {
        if self.is_redundant().await {
            return Err(ServiceWorkerError::StateError(format!(
                "{} is redundant and cannot handle {}",
                self.id,
                event.kind()
            )));
        }
        debug!(worker = %self.id, event = event.kind(), "Dispatching event");

        match event {
            WorkerEvent::Install => self
                .on_install()
                .await
                .map(|cached| EventOutcome::Installed { cached }),
            WorkerEvent::Activate => self.on_activate().await.map(EventOutcome::Activated),
            WorkerEvent::Fetch(request) => self.on_fetch(request).await.map(EventOutcome::Fetch),
            WorkerEvent::Message(message) => {
                self.on_message(&message);
                Ok(EventOutcome::Done)
            }
            WorkerEvent::Push(message) => self
                .on_push(&message)
                .await
                .map(EventOutcome::NotificationShown),
            WorkerEvent::NotificationClick(id) => self
                .on_notification_click(id)
                .await
                .map(EventOutcome::NotificationClicked),
        }
    }
}

impl<F> std::fmt::Debug for ServiceWorker<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceWorker")
            .field("id", &self.id)
            .field("cache_name", &self.cache_name)
            .finish_non_exhaustive()
    }
}
