//! Lifecycle controller: install, activate and the update message channel.
//!
//! ```text
//! Parsed ─→ Installing ─→ Installed (waiting) ─→ Activating ─→ Activated
//!               │                  │                               │
//!               └── shell failed ──┴──── superseded ───────────────┴─→ Redundant
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::cache::CacheEntry;
use crate::config::ActivationPolicy;
use crate::error::{Result, ServiceWorkerError};
use crate::fetch::{CacheMode, Fetcher, Request};
use crate::worker::ServiceWorker;

/// Unique identifier for a service worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServiceWorkerId(u64);

impl ServiceWorkerId {
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ServiceWorkerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ServiceWorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sw-{}", self.0)
    }
}

/// Service worker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ServiceWorkerState {
    /// Created, install not started.
    #[default]
    Parsed,
    /// Install event running.
    Installing,
    /// Installed, waiting for activation.
    Installed,
    /// Activate event running.
    Activating,
    /// Active and controlling pages.
    Activated,
    /// Replaced, or install failed.
    Redundant,
}

impl ServiceWorkerState {
    /// Whether moving to `next` is a legal transition.
    pub fn can_transition_to(self, next: ServiceWorkerState) -> bool {
        use ServiceWorkerState::*;
        matches!(
            (self, next),
            (Parsed, Installing)
                | (Installing, Installed)
                | (Installed, Activating)
                | (Activating, Activated)
                | (Parsed | Installing | Installed | Activating | Activated, Redundant)
        )
    }
}

/// Message posted from a controlled page to the worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientMessage {
    /// Promote the waiting worker without waiting for pages to close.
    SkipWaiting,
    #[serde(other)]
    Unknown,
}

impl ClientMessage {
    /// Parse a posted JSON message; anything unrecognised is `Unknown`.
    pub fn from_json(data: &str) -> Self {
        serde_json::from_str(data).unwrap_or(Self::Unknown)
    }
}

/// Summary of a successful activation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Activation {
    /// Generations deleted.
    pub evicted: Vec<String>,
    /// Clients whose controller became this worker.
    pub claimed: Vec<String>,
}

impl<F: Fetcher> ServiceWorker<F> {
    /// Populate this version's generation with the app shell.
    ///
    /// All shell responses are fetched before anything is written, so a
    /// single failure leaves the cache store untouched.
    pub(crate) async fn on_install(&self) -> Result<usize> {
        let urls = self.config.shell_urls()?;
        info!(
            worker = %self.id,
            cache = %self.cache_name,
            resources = urls.len(),
            "Caching app shell"
        );

        let fetches = urls.iter().map(|url| async move {
            let request = Request::get(url.clone()).cache_mode(CacheMode::Reload);
            let response = self.fetcher.fetch(&request).await.map_err(|e| {
                ServiceWorkerError::InstallFailed {
                    url: url.to_string(),
                    reason: e.to_string(),
                }
            })?;
            if !response.ok() {
                return Err(ServiceWorkerError::InstallFailed {
                    url: url.to_string(),
                    reason: format!("HTTP {}", response.status),
                });
            }
            Ok(CacheEntry::from_response(url, &response))
        });
        let entries = futures::future::try_join_all(fetches).await?;

        // A newer registration may have replaced this worker mid-install.
        if self.is_redundant().await {
            return Err(ServiceWorkerError::StateError(format!(
                "{} was superseded while installing",
                self.id
            )));
        }

        let cached = entries.len();
        self.caches.put_all(&self.cache_name, entries).await;
        debug!(worker = %self.id, cached, "App shell cached");

        match self.config.activation {
            ActivationPolicy::Immediate => self.skip_waiting(),
            ActivationPolicy::AwaitSignal => {
                debug!(worker = %self.id, "Waiting for SKIP_WAITING before activating")
            }
        }
        Ok(cached)
    }

    /// Evict superseded generations, then claim open clients.
    pub(crate) async fn on_activate(&self) -> Result<Activation> {
        let mut evicted = Vec::new();
        for name in self.caches.keys().await {
            if name != self.cache_name && self.caches.delete(&name).await {
                info!(worker = %self.id, cache = %name, "Deleting old cache");
                evicted.push(name);
            }
        }

        let claimed = self
            .clients
            .write()
            .await
            .claim(self.id, &self.config.scope);
        info!(worker = %self.id, claimed = claimed.len(), "Claiming clients");

        Ok(Activation { evicted, claimed })
    }

    pub(crate) fn on_message(&self, message: &ClientMessage) {
        match message {
            ClientMessage::SkipWaiting => {
                info!(worker = %self.id, "Received SKIP_WAITING, activating new worker");
                self.skip_waiting();
            }
            ClientMessage::Unknown => warn!(worker = %self.id, "Ignoring unrecognised client message"),
        }
    }
}
