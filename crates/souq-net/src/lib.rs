//! # Souq Net
//!
//! HTTP transports for the Souq crates.
//!
//! - [`HttpFetcher`] is the live network behind the service worker's
//!   [`Fetcher`] seam.
//! - [`RestBackend`] talks to the hosted database's REST/RPC endpoint for
//!   `souq-client`.

use std::time::Duration;

use reqwest::Client;
use souq_sw::{CacheMode, Fetcher, Request, Response, ServiceWorkerError};
use thiserror::Error;
use tracing::{debug, info, trace};

pub mod rest;

pub use rest::RestBackend;

/// Errors that can occur in networking.
#[derive(Error, Debug)]
pub enum NetError {
    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),
}

impl From<url::ParseError> for NetError {
    fn from(err: url::ParseError) -> Self {
        Self::InvalidUrl(err.to_string())
    }
}

impl From<NetError> for ServiceWorkerError {
    fn from(err: NetError) -> Self {
        match err {
            NetError::InvalidUrl(msg) => ServiceWorkerError::InvalidUrl(msg),
            other => ServiceWorkerError::network(other.to_string()),
        }
    }
}

/// HTTP client configuration.
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// User agent string.
    pub user_agent: String,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Maximum redirects.
    pub max_redirects: usize,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            user_agent: format!("souq-sw/{}", env!("CARGO_PKG_VERSION")),
            timeout: Duration::from_secs(30),
            max_redirects: 10,
        }
    }
}

impl LoaderConfig {
    pub(crate) fn build_client(&self) -> Result<Client, NetError> {
        Client::builder()
            .user_agent(&self.user_agent)
            .timeout(self.timeout)
            .redirect(reqwest::redirect::Policy::limited(self.max_redirects))
            .build()
            .map_err(|e| NetError::RequestFailed(e.to_string()))
    }
}

/// Live network access for the service worker.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(config: LoaderConfig) -> Result<Self, NetError> {
        let client = config.build_client()?;
        info!(user_agent = %config.user_agent, timeout = ?config.timeout, "HttpFetcher initialized");
        Ok(Self { client })
    }

    async fn send(&self, request: &Request) -> Result<Response, NetError> {
        let mut builder = self
            .client
            .request(request.method.clone(), request.url.clone());

        for (name, value) in request.headers.iter() {
            builder = builder.header(name.as_str(), value.as_str());
        }

        if request.cache == CacheMode::Reload {
            builder = builder
                .header(http::header::CACHE_CONTROL, "no-cache")
                .header(http::header::PRAGMA, "no-cache");
        }

        let response = builder.send().await?;

        let url = response.url().clone();
        let status = response.status().as_u16();
        let headers: Vec<(String, String)> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response.bytes().await?;

        trace!(url = %url, status, body_len = body.len(), "Response received");

        let mut converted = Response::new(url, status, body.to_vec());
        for (name, value) in headers {
            converted = converted.header(&name, &value);
        }
        Ok(converted)
    }
}

impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &Request) -> souq_sw::Result<Response> {
        debug!(url = %request.url, method = %request.method, cache = ?request.cache, "Fetching resource");
        self.send(request).await.map_err(ServiceWorkerError::from)
    }
}
