//! Worker configuration.
//!
//! The version and fetch strategy are parameters of the build/deploy rather
//! than constants edited per release.

use std::path::Path;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Result, ServiceWorkerError};
use crate::push::NotificationDefaults;

/// Version baked in at build time via `SOUQ_SW_VERSION`, else the crate version.
pub const fn build_version() -> &'static str {
    match option_env!("SOUQ_SW_VERSION") {
        Some(version) => version,
        None => env!("CARGO_PKG_VERSION"),
    }
}

/// Retrieval strategy for same-origin GET sub-resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FetchStrategy {
    /// Serve from cache; on miss fetch and store 200s. Never revalidates.
    #[default]
    CacheFirst,
    /// Fetch and store 200s; fall back to cache when the network fails.
    NetworkFirst,
    /// Serve from cache and refresh the entry in the background.
    StaleWhileRevalidate,
}

/// What an installed worker does once its shell is cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActivationPolicy {
    /// Skip waiting straight away.
    #[default]
    Immediate,
    /// Stay waiting until a page posts `SKIP_WAITING`.
    AwaitSignal,
}

/// Configuration for one worker version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Deploy version; names the cache generation.
    pub version: String,

    /// Generation name prefix.
    pub cache_prefix: String,

    /// Registration scope; also defines the worker origin.
    pub scope: Url,

    /// App shell, relative to the scope.
    pub shell: Vec<String>,

    /// Document served for every navigation, relative to the scope.
    pub navigation_fallback: String,

    pub strategy: FetchStrategy,

    pub activation: ActivationPolicy,

    pub notifications: NotificationDefaults,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            version: build_version().to_string(),
            cache_prefix: "souq-market-cache".to_string(),
            scope: Url::parse("http://localhost/").expect("static scope URL is valid"),
            shell: vec![
                "./".to_string(),
                "./index.html".to_string(),
                "./manifest.json".to_string(),
                "./icons/icon.svg".to_string(),
            ],
            navigation_fallback: "./index.html".to_string(),
            strategy: FetchStrategy::default(),
            activation: ActivationPolicy::default(),
            notifications: NotificationDefaults::default(),
        }
    }
}

impl WorkerConfig {
    /// Default configuration for a scope.
    pub fn for_scope(scope: Url) -> Self {
        Self {
            scope,
            ..Self::default()
        }
    }

    /// Load and validate a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let config: Self = souq_common::load_config(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Set the version.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Set the fetch strategy.
    pub fn with_strategy(mut self, strategy: FetchStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Set the activation policy.
    pub fn with_activation(mut self, activation: ActivationPolicy) -> Self {
        self.activation = activation;
        self
    }

    /// Replace the shell manifest.
    pub fn with_shell<I, S>(mut self, shell: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.shell = shell.into_iter().map(Into::into).collect();
        self
    }

    /// Name of this version's cache generation.
    pub fn cache_name(&self) -> String {
        format!("{}-{}", self.cache_prefix, self.version)
    }

    /// Origin of the worker (scheme, host, port).
    pub fn origin(&self) -> url::Origin {
        self.scope.origin()
    }

    /// Shell URLs resolved against the scope.
    pub fn shell_urls(&self) -> Result<Vec<Url>> {
        self.shell
            .iter()
            .map(|path| self.scope.join(path).map_err(ServiceWorkerError::from))
            .collect()
    }

    /// The shell document served for navigations.
    pub fn navigation_fallback_url(&self) -> Result<Url> {
        Ok(self.scope.join(&self.navigation_fallback)?)
    }

    /// Whether `url` falls under the registration scope.
    pub fn in_scope(&self, url: &Url) -> bool {
        url.as_str().starts_with(self.scope.as_str())
    }

    /// Reject configurations that could never install.
    pub fn validate(&self) -> Result<()> {
        if self.version.trim().is_empty() {
            return Err(ServiceWorkerError::RegistrationFailed(
                "version must not be empty".to_string(),
            ));
        }
        if self.shell.is_empty() {
            return Err(ServiceWorkerError::RegistrationFailed(
                "shell manifest must list at least one resource".to_string(),
            ));
        }
        if !self.scope.path().ends_with('/') {
            return Err(ServiceWorkerError::RegistrationFailed(format!(
                "scope {} must end with '/'",
                self.scope
            )));
        }
        for url in self.shell_urls()? {
            if !self.in_scope(&url) {
                return Err(ServiceWorkerError::RegistrationFailed(format!(
                    "shell resource {url} is outside scope {}",
                    self.scope
                )));
            }
        }
        let fallback = self.navigation_fallback_url()?;
        if !self.in_scope(&fallback) {
            return Err(ServiceWorkerError::RegistrationFailed(format!(
                "navigation fallback {fallback} is outside scope {}",
                self.scope
            )));
        }
        Ok(())
    }
}
