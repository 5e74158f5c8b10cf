//! # Souq Service Worker
//!
//! The offline layer of the Souq web client: one background worker per
//! origin that caches the app shell, routes every fetch from controlled
//! pages, and turns push messages into system notifications.
//!
//! ## Features
//!
//! - **Lifecycle**: install (atomic shell population), activate (evict
//!   superseded generations, claim clients), `SKIP_WAITING` promotion
//! - **Cache Store**: versioned generations of request → response snapshots
//! - **Routing**: same-origin GET interception, SPA navigation fallback,
//!   configurable sub-resource strategy
//! - **Push**: payload parsing with localized defaults, click-to-focus
//!
//! ## Architecture
//!
//! ```text
//! Registration (one per scope)
//!     ├── installing ─┐
//!     ├── waiting     ├── ServiceWorker ── dispatch(WorkerEvent)
//!     ├── active ─────┘        ├── on_install / on_activate / on_message
//!     │                        ├── on_fetch ──→ Router strategies
//!     │                        └── on_push / on_notification_click
//!     │
//!     ├── CacheStorage ── "<prefix>-<version>" ── CacheEntry
//!     ├── Clients (windows, controller)
//!     ├── NotificationCenter
//!     └── Fetcher (network)
//! ```

pub mod cache;
pub mod clients;
pub mod config;
pub mod error;
pub mod fetch;
pub mod lifecycle;
pub mod notification;
pub mod push;
pub mod registration;
pub mod router;
pub mod worker;

pub use cache::{Cache, CacheEntry, CacheStats, CacheStorage};
pub use clients::{Client, ClientMatchOptions, ClientType, Clients};
pub use config::{build_version, ActivationPolicy, FetchStrategy, WorkerConfig};
pub use error::{Result, ServiceWorkerError};
pub use fetch::{CacheMode, Fetcher, Request, RequestMode, Response};
pub use lifecycle::{Activation, ClientMessage, ServiceWorkerId, ServiceWorkerState};
pub use notification::{Notification, NotificationCenter, NotificationData, NotificationId, NotificationOptions};
pub use push::{NotificationDefaults, NotificationPayload, PushMessage};
pub use registration::{Registration, RegistrationEvent};
pub use router::{FetchOutcome, RequestClass};
pub use worker::{ClickOutcome, EventOutcome, ServiceWorker, WorkerContext, WorkerEvent};
