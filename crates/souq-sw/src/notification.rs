//! System notifications shown by the worker.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Unique identifier for a shown notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NotificationId(u64);

impl NotificationId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// Data attached to every notification, read back on click.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationData {
    pub url: String,
}

/// Options passed to `showNotification`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationOptions {
    pub body: String,
    pub icon: String,
    pub badge: String,
    /// Vibration pattern in milliseconds (on, off, on, ...).
    pub vibrate: Vec<u32>,
    pub data: NotificationData,
}

/// A notification currently on screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub title: String,
    pub options: NotificationOptions,
}

/// The platform's notification tray for one origin.
#[derive(Debug, Default)]
pub struct NotificationCenter {
    shown: Vec<Notification>,
}

impl NotificationCenter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Display a notification.
    pub fn show(&mut self, title: impl Into<String>, options: NotificationOptions) -> Notification {
        let notification = Notification {
            id: NotificationId::new(),
            title: title.into(),
            options,
        };
        debug!(id = ?notification.id, title = %notification.title, "Showing notification");
        self.shown.push(notification.clone());
        notification
    }

    /// Dismiss a notification, returning it if it was still shown.
    pub fn close(&mut self, id: NotificationId) -> Option<Notification> {
        let index = self.shown.iter().position(|n| n.id == id)?;
        Some(self.shown.remove(index))
    }

    pub fn get(&self, id: NotificationId) -> Option<&Notification> {
        self.shown.iter().find(|n| n.id == id)
    }

    /// Notifications on screen, oldest first.
    pub fn shown(&self) -> &[Notification] {
        &self.shown
    }
}
