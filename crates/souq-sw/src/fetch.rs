//! Request descriptors, response snapshots and the network seam.

use std::future::Future;

use hashbrown::HashMap;
use http::Method;
use url::Url;

use crate::error::Result;

/// Request mode, as reported by the page that issued the fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestMode {
    /// Top-level document load (address bar, link click, reload).
    Navigate,
    #[default]
    SameOrigin,
    Cors,
    NoCors,
}

/// HTTP cache mode for the outgoing request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheMode {
    #[default]
    Default,
    /// Bypass intermediary caches on the way out.
    Reload,
}

/// An intercepted outgoing request.
#[derive(Debug, Clone)]
pub struct Request {
    pub url: Url,
    pub method: Method,
    pub mode: RequestMode,
    pub cache: CacheMode,
    pub headers: HashMap<String, String>,
    /// Client that issued the request, `None` for navigations.
    pub client_id: Option<String>,
}

impl Request {
    /// Create a GET sub-resource request.
    pub fn get(url: Url) -> Self {
        Self {
            url,
            method: Method::GET,
            mode: RequestMode::SameOrigin,
            cache: CacheMode::Default,
            headers: HashMap::new(),
            client_id: None,
        }
    }

    /// Create a navigation request.
    pub fn navigate(url: Url) -> Self {
        Self {
            mode: RequestMode::Navigate,
            ..Self::get(url)
        }
    }

    /// Set the method.
    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Set the cache mode.
    pub fn cache_mode(mut self, cache: CacheMode) -> Self {
        self.cache = cache;
        self
    }

    /// Add a header.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.to_string());
        self
    }

    /// Attribute the request to a client.
    pub fn from_client(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    pub fn is_navigation(&self) -> bool {
        self.mode == RequestMode::Navigate
    }

    /// Key under which the request is stored: the URL without its fragment.
    pub fn cache_key(&self) -> String {
        cache_key(&self.url)
    }
}

/// Strip the fragment from a URL to form a cache key.
pub fn cache_key(url: &Url) -> String {
    let mut url = url.clone();
    url.set_fragment(None);
    url.into()
}

/// A response, either from the network or from a cache snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub url: Url,
    pub status: u16,
    pub status_text: String,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
    /// Whether the response was served from the cache store.
    pub from_cache: bool,
}

impl Response {
    /// Create a network response.
    pub fn new(url: Url, status: u16, body: impl Into<Vec<u8>>) -> Self {
        let status_text = http::StatusCode::from_u16(status)
            .ok()
            .and_then(|s| s.canonical_reason())
            .unwrap_or("")
            .to_string();
        Self {
            url,
            status,
            status_text,
            headers: HashMap::new(),
            body: body.into(),
            from_cache: false,
        }
    }

    /// Add a header.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.to_string());
        self
    }

    /// Check if the status is 2xx.
    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Only exact 200s are written into the cache store.
    pub fn is_cacheable(&self) -> bool {
        self.status == 200
    }

    /// Body as UTF-8 text (lossy).
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Network access for the worker.
///
/// Implementations perform a real fetch of `request`; a transport failure is
/// an `Err`, while any HTTP status (including 4xx/5xx) is an `Ok` response.
pub trait Fetcher: Send + Sync + 'static {
    fn fetch(&self, request: &Request) -> impl Future<Output = Result<Response>> + Send;
}
