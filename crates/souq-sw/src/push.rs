//! Push messages and notification clicks.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::{debug, info};
use url::Url;

use crate::clients::ClientMatchOptions;
use crate::error::{Result, ServiceWorkerError};
use crate::fetch::Fetcher;
use crate::notification::{Notification, NotificationData, NotificationId, NotificationOptions};
use crate::worker::{ClickOutcome, ServiceWorker};

/// An inbound push message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushMessage {
    pub data: Option<Vec<u8>>,
}

impl PushMessage {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self {
            data: Some(data.into()),
        }
    }

    /// A push with no payload.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Payload as UTF-8 text (lossy).
    pub fn text(&self) -> String {
        self.data
            .as_deref()
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
            .unwrap_or_default()
    }

    /// Payload as JSON.
    pub fn json(&self) -> std::result::Result<JsonValue, serde_json::Error> {
        serde_json::from_slice(self.data.as_deref().unwrap_or_default())
    }
}

/// Fixed values used when a push payload leaves a field out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationDefaults {
    /// Title when the payload is JSON without a title.
    pub title: String,
    /// Title when the payload is not JSON at all.
    pub fallback_title: String,
    pub body: String,
    pub url: String,
    pub icon: String,
    pub badge: String,
    pub vibrate: Vec<u32>,
}

impl Default for NotificationDefaults {
    fn default() -> Self {
        Self {
            title: "سوق محافظة الرقة".to_string(),
            fallback_title: "إشعار جديد".to_string(),
            body: "لديك إشعار جديد.".to_string(),
            url: "/".to_string(),
            icon: "./icons/icon.svg".to_string(),
            badge: "./icons/icon.svg".to_string(),
            vibrate: vec![200, 100, 200],
        }
    }
}

/// The resolved content of a notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationPayload {
    pub title: String,
    pub body: String,
    pub url: String,
}

impl NotificationPayload {
    /// Resolve a push message into notification content.
    ///
    /// JSON bodies contribute their `title`, `body` and `url` strings; missing
    /// or empty fields take the defaults. A body that is not JSON becomes the
    /// notification text under the fallback title.
    pub fn from_push(message: &PushMessage, defaults: &NotificationDefaults) -> Self {
        let (title, body, url) = match message.json() {
            Ok(value) => (
                string_field(&value, "title"),
                string_field(&value, "body"),
                string_field(&value, "url"),
            ),
            Err(_) => (
                Some(defaults.fallback_title.clone()),
                Some(message.text()).filter(|s| !s.is_empty()),
                None,
            ),
        };

        Self {
            title: title.unwrap_or_else(|| defaults.title.clone()),
            body: body.unwrap_or_else(|| defaults.body.clone()),
            url: url.unwrap_or_else(|| defaults.url.clone()),
        }
    }

    /// Options for display.
    pub fn options(&self, defaults: &NotificationDefaults) -> NotificationOptions {
        NotificationOptions {
            body: self.body.clone(),
            icon: defaults.icon.clone(),
            badge: defaults.badge.clone(),
            vibrate: defaults.vibrate.clone(),
            data: NotificationData {
                url: self.url.clone(),
            },
        }
    }
}

fn string_field(value: &JsonValue, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(JsonValue::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Whether a client at `client` already shows `target`.
///
/// Compares origin and path; query string and fragment are ignored, as is
/// a trailing slash.
pub fn same_target(client: &Url, target: &Url) -> bool {
    fn trimmed(path: &str) -> &str {
        match path.trim_end_matches('/') {
            "" => "/",
            p => p,
        }
    }
    client.origin() == target.origin() && trimmed(client.path()) == trimmed(target.path())
}

impl<F: Fetcher> ServiceWorker<F> {
    pub(crate) async fn on_push(&self, message: &PushMessage) -> Result<Notification> {
        let defaults = &self.config.notifications;
        let payload = NotificationPayload::from_push(message, defaults);
        debug!(worker = %self.id, title = %payload.title, url = %payload.url, "Push received");

        let notification = self
            .notifications
            .write()
            .await
            .show(payload.title.clone(), payload.options(defaults));
        Ok(notification)
    }

    pub(crate) async fn on_notification_click(&self, id: NotificationId) -> Result<ClickOutcome> {
        let notification = self
            .notifications
            .write()
            .await
            .close(id)
            .ok_or_else(|| ServiceWorkerError::NotFound(format!("notification {id:?}")))?;

        let raw = match notification.options.data.url.as_str() {
            "" => "/",
            url => url,
        };
        let origin_root = self.config.scope.join("/")?;
        let target = origin_root.join(raw)?;

        let mut clients = self.clients.write().await;
        let matched = clients
            .match_all(&ClientMatchOptions::all_windows())
            .into_iter()
            .find(|c| same_target(&c.url, &target))
            .map(|c| c.id.clone());

        match matched {
            Some(client_id) => {
                clients.focus(&client_id)?;
                info!(worker = %self.id, client = %client_id, url = %target, "Focused existing window");
                Ok(ClickOutcome::Focused { client_id })
            }
            None => {
                let client = clients.open_window(target.clone());
                info!(worker = %self.id, client = %client.id, url = %target, "Opened new window");
                Ok(ClickOutcome::Opened {
                    client_id: client.id,
                    url: target,
                })
            }
        }
    }
}
