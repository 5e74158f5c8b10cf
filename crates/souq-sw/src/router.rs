//! Request router: decides, per intercepted fetch, whether and how the
//! worker answers it.
//!
//! - cross-origin or non-GET: not intercepted, the page goes to the network
//! - navigation: always the cached shell document (SPA entry point)
//! - other same-origin GETs: the configured [`FetchStrategy`]

use http::Method;
use tracing::{debug, trace, warn};

use crate::cache::CacheEntry;
use crate::config::{FetchStrategy, WorkerConfig};
use crate::error::Result;
use crate::fetch::{Fetcher, Request, Response};
use crate::worker::ServiceWorker;

/// How the router classifies a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestClass {
    /// Left to default networking.
    Bypass,
    /// Top-level document load.
    Navigation,
    /// Same-origin GET for anything else.
    SubResource,
}

impl RequestClass {
    pub fn of(request: &Request, config: &WorkerConfig) -> Self {
        if request.url.origin() != config.origin() || request.method != Method::GET {
            Self::Bypass
        } else if request.is_navigation() {
            Self::Navigation
        } else {
            Self::SubResource
        }
    }
}

/// Result of a fetch event.
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    /// The worker answered.
    Respond(Response),
    /// The worker did not intercept; the request goes to the network as-is.
    Passthrough,
}

impl FetchOutcome {
    pub fn response(&self) -> Option<&Response> {
        match self {
            Self::Respond(response) => Some(response),
            Self::Passthrough => None,
        }
    }

    pub fn is_passthrough(&self) -> bool {
        matches!(self, Self::Passthrough)
    }
}

impl<F: Fetcher> ServiceWorker<F> {
    pub(crate) async fn on_fetch(&self, request: Request) -> Result<FetchOutcome> {
        let class = RequestClass::of(&request, &self.config);
        trace!(worker = %self.id, url = %request.url, method = %request.method, ?class, "Routing request");

        let response = match class {
            RequestClass::Bypass => return Ok(FetchOutcome::Passthrough),
            RequestClass::Navigation => self.serve_navigation().await?,
            RequestClass::SubResource => match self.config.strategy {
                FetchStrategy::CacheFirst => self.cache_first(&request).await?,
                FetchStrategy::NetworkFirst => self.network_first(&request).await?,
                FetchStrategy::StaleWhileRevalidate => self.stale_while_revalidate(&request).await?,
            },
        };
        Ok(FetchOutcome::Respond(response))
    }

    /// Shell document from the current generation, else from the network.
    async fn serve_navigation(&self) -> Result<Response> {
        let shell = self.config.navigation_fallback_url()?;
        if let Some(entry) = self.caches.match_in(&self.cache_name, &shell).await {
            return Ok(entry.to_response());
        }
        debug!(worker = %self.id, url = %shell, "Shell document not cached, fetching");
        self.fetcher.fetch(&Request::get(shell)).await
    }

    async fn cache_first(&self, request: &Request) -> Result<Response> {
        if let Some(entry) = self.caches.match_in(&self.cache_name, &request.url).await {
            return Ok(entry.to_response());
        }
        self.fetch_and_store(request).await
    }

    async fn network_first(&self, request: &Request) -> Result<Response> {
        match self.fetch_and_store(request).await {
            Ok(response) => Ok(response),
            Err(e) => {
                warn!(worker = %self.id, url = %request.url, error = %e, "Network request failed, trying cache");
                match self.caches.match_in(&self.cache_name, &request.url).await {
                    Some(entry) => Ok(entry.to_response()),
                    None => Err(e),
                }
            }
        }
    }

    async fn stale_while_revalidate(&self, request: &Request) -> Result<Response> {
        let Some(entry) = self.caches.match_in(&self.cache_name, &request.url).await else {
            return self.fetch_and_store(request).await;
        };

        let fetcher = self.fetcher.clone();
        let caches = self.caches.clone();
        let cache_name = self.cache_name.clone();
        let request = request.clone();
        self.wait_until(async move {
            match fetcher.fetch(&request).await {
                Ok(response) if response.is_cacheable() => {
                    caches
                        .put(&cache_name, CacheEntry::from_response(&request.url, &response))
                        .await;
                    trace!(url = %request.url, "Revalidated cached entry");
                }
                Ok(response) => {
                    debug!(url = %request.url, status = response.status, "Revalidation skipped")
                }
                Err(e) => warn!(url = %request.url, error = %e, "Revalidation failed"),
            }
        })
        .await;

        Ok(entry.to_response())
    }

    /// Live fetch; a 200 is snapshotted before the response is handed back.
    async fn fetch_and_store(&self, request: &Request) -> Result<Response> {
        let response = self.fetcher.fetch(request).await?;
        if response.is_cacheable() {
            self.caches
                .put(&self.cache_name, CacheEntry::from_response(&request.url, &response))
                .await;
        }
        Ok(response)
    }
}
