//! Registration: the browser side of the worker lifecycle.
//!
//! Holds the `installing`, `waiting` and `active` slots for one scope and
//! the resources every version shares, and routes page events to the right
//! worker.

use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use tracing::{info, warn};
use url::Url;

use crate::cache::CacheStorage;
use crate::clients::Clients;
use crate::config::WorkerConfig;
use crate::error::{Result, ServiceWorkerError};
use crate::fetch::{Fetcher, Request, Response};
use crate::lifecycle::{ClientMessage, ServiceWorkerId, ServiceWorkerState};
use crate::notification::{Notification, NotificationCenter, NotificationId};
use crate::push::PushMessage;
use crate::router::FetchOutcome;
use crate::worker::{ClickOutcome, EventOutcome, ServiceWorker, WorkerContext, WorkerEvent};

/// Registration events, as a page would observe them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationEvent {
    /// A new version started installing.
    UpdateFound { version: String },
    StateChange {
        worker_id: ServiceWorkerId,
        version: String,
        new_state: ServiceWorkerState,
    },
    /// A client changed controller.
    ControllerChange {
        client_id: String,
        worker_id: ServiceWorkerId,
    },
    InstallFailed {
        version: String,
        error: ServiceWorkerError,
    },
}

struct Slots<F> {
    installing: Option<Arc<ServiceWorker<F>>>,
    waiting: Option<Arc<ServiceWorker<F>>>,
    active: Option<Arc<ServiceWorker<F>>>,
}

impl<F> Default for Slots<F> {
    fn default() -> Self {
        Self {
            installing: None,
            waiting: None,
            active: None,
        }
    }
}

/// A service worker registration for one scope.
pub struct Registration<F> {
    scope: Url,
    context: WorkerContext<F>,
    slots: RwLock<Slots<F>>,
    event_tx: mpsc::UnboundedSender<RegistrationEvent>,
}

impl<F: Fetcher> Registration<F> {
    /// Create an empty registration.
    pub fn new(scope: Url, fetcher: F) -> (Self, mpsc::UnboundedReceiver<RegistrationEvent>) {
        Self::with_context(scope, WorkerContext::new(Arc::new(fetcher)))
    }

    /// Create a registration over existing shared resources, e.g. a cache
    /// storage restored from disk.
    pub fn with_context(
        scope: Url,
        context: WorkerContext<F>,
    ) -> (Self, mpsc::UnboundedReceiver<RegistrationEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        (
            Self {
                scope,
                context,
                slots: RwLock::new(Slots::default()),
                event_tx,
            },
            event_rx,
        )
    }

    pub fn scope(&self) -> &Url {
        &self.scope
    }

    pub fn caches(&self) -> &Arc<CacheStorage> {
        &self.context.caches
    }

    pub fn clients(&self) -> &Arc<RwLock<Clients>> {
        &self.context.clients
    }

    pub fn notifications(&self) -> &Arc<RwLock<NotificationCenter>> {
        &self.context.notifications
    }

    pub async fn installing(&self) -> Option<Arc<ServiceWorker<F>>> {
        self.slots.read().await.installing.clone()
    }

    pub async fn waiting(&self) -> Option<Arc<ServiceWorker<F>>> {
        self.slots.read().await.waiting.clone()
    }

    pub async fn active(&self) -> Option<Arc<ServiceWorker<F>>> {
        self.slots.read().await.active.clone()
    }

    /// Install a new worker version.
    ///
    /// On success the worker is waiting, or active if it skipped waiting or
    /// nothing was active yet. On failure it is redundant and the previous
    /// workers are untouched.
    pub async fn register(&self, config: WorkerConfig) -> Result<Arc<ServiceWorker<F>>> {
        config.validate()?;
        if config.scope != self.scope {
            return Err(ServiceWorkerError::RegistrationFailed(format!(
                "scope {} does not match registration {}",
                config.scope, self.scope
            )));
        }

        let worker = Arc::new(ServiceWorker::new(config, self.context.clone()));
        info!(worker = %worker.id, version = worker.version(), "Installing service worker");
        self.emit(RegistrationEvent::UpdateFound {
            version: worker.version().to_string(),
        });

        let previous = self.slots.write().await.installing.replace(worker.clone());
        if let Some(previous) = previous {
            self.transition(&previous, ServiceWorkerState::Redundant).await?;
        }
        self.transition(&worker, ServiceWorkerState::Installing).await?;

        let installed = worker.dispatch(WorkerEvent::Install).await;
        worker.settle().await;
        {
            let mut slots = self.slots.write().await;
            if slots
                .installing
                .as_ref()
                .is_some_and(|current| Arc::ptr_eq(current, &worker))
            {
                slots.installing = None;
            }
        }

        let installed = match installed {
            Ok(_) if worker.is_redundant().await => {
                self.discard_generation(&worker).await;
                Err(ServiceWorkerError::StateError(format!(
                    "{} was superseded while installing",
                    worker.id
                )))
            }
            other => other,
        };
        if let Err(e) = installed {
            warn!(worker = %worker.id, error = %e, "Install failed");
            if !worker.is_redundant().await {
                self.transition(&worker, ServiceWorkerState::Redundant).await?;
            }
            self.emit(RegistrationEvent::InstallFailed {
                version: worker.version().to_string(),
                error: e.clone(),
            });
            return Err(e);
        }

        let replaced = self.slots.write().await.waiting.replace(worker.clone());
        if let Some(replaced) = replaced {
            self.transition(&replaced, ServiceWorkerState::Redundant).await?;
        }
        self.transition(&worker, ServiceWorkerState::Installed).await?;

        let nothing_active = self.slots.read().await.active.is_none();
        if worker.skip_waiting_requested() || nothing_active {
            self.activate().await?;
        }
        Ok(worker)
    }

    /// Promote the waiting worker.
    pub async fn activate(&self) -> Result<()> {
        let worker = self
            .slots
            .write()
            .await
            .waiting
            .take()
            .ok_or_else(|| ServiceWorkerError::StateError("no waiting worker".to_string()))?;

        self.transition(&worker, ServiceWorkerState::Activating).await?;
        let outcome = worker.dispatch(WorkerEvent::Activate).await;
        worker.settle().await;

        let previous = self.slots.write().await.active.replace(worker.clone());
        if let Some(previous) = previous {
            self.transition(&previous, ServiceWorkerState::Redundant).await?;
        }
        self.transition(&worker, ServiceWorkerState::Activated).await?;

        // A failed activate handler does not keep the worker from activating.
        match outcome {
            Ok(EventOutcome::Activated(activation)) => {
                for client_id in activation.claimed {
                    self.emit(RegistrationEvent::ControllerChange {
                        client_id,
                        worker_id: worker.id,
                    });
                }
            }
            Ok(_) => {}
            Err(e) => warn!(worker = %worker.id, error = %e, "Activate handler failed"),
        }
        info!(worker = %worker.id, version = worker.version(), "Service worker active");
        Ok(())
    }

    /// Post a message from a page. Goes to the waiting worker if there is
    /// one, else the active worker.
    pub async fn post_message(&self, message: ClientMessage) -> Result<()> {
        let (target, is_waiting) = {
            let slots = self.slots.read().await;
            match (&slots.waiting, &slots.active) {
                (Some(waiting), _) => (waiting.clone(), true),
                (None, Some(active)) => (active.clone(), false),
                (None, None) => {
                    return Err(ServiceWorkerError::NotFound("no worker to message".to_string()))
                }
            }
        };

        target.dispatch(WorkerEvent::Message(message)).await?;
        target.settle().await;

        if is_waiting && target.skip_waiting_requested() {
            self.activate().await?;
        }
        Ok(())
    }

    /// Route a fetch from a page through the active worker.
    pub async fn handle_fetch(&self, request: Request) -> Result<FetchOutcome> {
        let Some(worker) = self.active().await else {
            return Ok(FetchOutcome::Passthrough);
        };

        let controlled = match &request.client_id {
            Some(id) => self
                .context
                .clients
                .read()
                .await
                .get(id)
                .is_some_and(|c| c.controller == Some(worker.id)),
            None => !request.is_navigation() || worker.config().in_scope(&request.url),
        };
        if !controlled {
            return Ok(FetchOutcome::Passthrough);
        }

        match worker.dispatch(WorkerEvent::Fetch(request)).await? {
            EventOutcome::Fetch(outcome) => Ok(outcome),
            _ => Ok(FetchOutcome::Passthrough),
        }
    }

    /// Resolve a fetch end to end: the worker's answer, or the network when
    /// the worker passes.
    pub async fn fetch(&self, request: Request) -> Result<Response> {
        match self.handle_fetch(request.clone()).await? {
            FetchOutcome::Respond(response) => Ok(response),
            FetchOutcome::Passthrough => self.context.fetcher.fetch(&request).await,
        }
    }

    /// Deliver a push message to the active worker.
    pub async fn push(&self, message: PushMessage) -> Result<Notification> {
        let worker = self.require_active().await?;
        let outcome = worker.dispatch(WorkerEvent::Push(message)).await;
        worker.settle().await;
        match outcome? {
            EventOutcome::NotificationShown(notification) => Ok(notification),
            other => Err(ServiceWorkerError::StateError(format!(
                "unexpected push outcome {other:?}"
            ))),
        }
    }

    /// Deliver a notification click to the active worker.
    pub async fn notification_click(&self, id: NotificationId) -> Result<ClickOutcome> {
        let worker = self.require_active().await?;
        let outcome = worker.dispatch(WorkerEvent::NotificationClick(id)).await;
        worker.settle().await;
        match outcome? {
            EventOutcome::NotificationClicked(click) => Ok(click),
            other => Err(ServiceWorkerError::StateError(format!(
                "unexpected click outcome {other:?}"
            ))),
        }
    }

    /// Wait for deferred work of the active worker.
    pub async fn settle(&self) {
        if let Some(worker) = self.active().await {
            worker.settle().await;
        }
    }

    /// Unregister: every worker becomes redundant and clients lose their
    /// controller. Returns whether anything was registered.
    pub async fn unregister(&self) -> Result<bool> {
        let slots = std::mem::take(&mut *self.slots.write().await);
        let workers: Vec<_> = [slots.installing, slots.waiting, slots.active]
            .into_iter()
            .flatten()
            .collect();

        for worker in &workers {
            self.context.clients.write().await.release(worker.id);
            self.transition(worker, ServiceWorkerState::Redundant).await?;
        }
        Ok(!workers.is_empty())
    }

    /// Drop the generation a superseded install wrote, unless a live
    /// worker shares it.
    async fn discard_generation(&self, worker: &ServiceWorker<F>) {
        let in_use = {
            let slots = self.slots.read().await;
            let in_use = [&slots.installing, &slots.waiting, &slots.active]
                .into_iter()
                .flatten()
                .any(|live| live.cache_name() == worker.cache_name());
            in_use
        };
        if !in_use && self.context.caches.delete(worker.cache_name()).await {
            info!(worker = %worker.id, cache = worker.cache_name(), "Discarded superseded install");
        }
    }

    async fn require_active(&self) -> Result<Arc<ServiceWorker<F>>> {
        self.active()
            .await
            .ok_or_else(|| ServiceWorkerError::StateError("no active worker".to_string()))
    }

    async fn transition(&self, worker: &ServiceWorker<F>, state: ServiceWorkerState) -> Result<()> {
        worker.set_state(state).await?;
        self.emit(RegistrationEvent::StateChange {
            worker_id: worker.id,
            version: worker.version().to_string(),
            new_state: state,
        });
        Ok(())
    }

    fn emit(&self, event: RegistrationEvent) {
        let _ = self.event_tx.send(event);
    }
}
