//! Clients API: the pages and workers an origin has open.

use std::sync::atomic::{AtomicU64, Ordering};

use hashbrown::HashMap;
use tracing::debug;
use url::Url;

use crate::error::{Result, ServiceWorkerError};
use crate::lifecycle::ServiceWorkerId;

/// Client type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClientType {
    #[default]
    Window,
    Worker,
    SharedWorker,
    All,
}

/// A client (open page or worker).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Client {
    pub id: String,
    pub url: Url,
    pub client_type: ClientType,
    pub focused: bool,
    /// Worker currently controlling this client.
    pub controller: Option<ServiceWorkerId>,
}

impl Client {
    /// A window client that no worker controls yet.
    pub fn window(url: Url) -> Self {
        Self {
            id: next_client_id(),
            url,
            client_type: ClientType::Window,
            focused: false,
            controller: None,
        }
    }

    pub fn is_controlled(&self) -> bool {
        self.controller.is_some()
    }
}

/// Options for `Clients::match_all`.
#[derive(Debug, Clone, Default)]
pub struct ClientMatchOptions {
    /// Also return clients not controlled by `controller`.
    pub include_uncontrolled: bool,
    pub client_type: ClientType,
    /// Worker asking; only its clients match unless `include_uncontrolled`.
    pub controller: Option<ServiceWorkerId>,
}

impl ClientMatchOptions {
    /// Every window, controlled or not.
    pub fn all_windows() -> Self {
        Self {
            include_uncontrolled: true,
            client_type: ClientType::Window,
            controller: None,
        }
    }
}

/// Registry of open clients.
#[derive(Debug, Default)]
pub struct Clients {
    clients: HashMap<String, Client>,
}

impl Clients {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a client by ID.
    pub fn get(&self, id: &str) -> Option<&Client> {
        self.clients.get(id)
    }

    /// Match clients, ordered by id.
    pub fn match_all(&self, options: &ClientMatchOptions) -> Vec<&Client> {
        let mut matched: Vec<&Client> = self
            .clients
            .values()
            .filter(|c| options.include_uncontrolled || (c.controller.is_some() && c.controller == options.controller))
            .filter(|c| match options.client_type {
                ClientType::All => true,
                t => c.client_type == t,
            })
            .collect();
        matched.sort_by(|a, b| a.id.cmp(&b.id));
        matched
    }

    /// Open a window at `url`; it starts focused and uncontrolled.
    pub fn open_window(&mut self, url: Url) -> Client {
        let mut client = Client::window(url);
        self.blur_all();
        client.focused = true;
        debug!(client = %client.id, url = %client.url, "Opened window");
        self.clients.insert(client.id.clone(), client.clone());
        client
    }

    /// Focus a window client.
    pub fn focus(&mut self, id: &str) -> Result<Client> {
        let client_type = self
            .clients
            .get(id)
            .map(|c| c.client_type)
            .ok_or_else(|| ServiceWorkerError::NotFound(format!("client {id}")))?;
        if client_type != ClientType::Window {
            return Err(ServiceWorkerError::StateError(
                "Can only focus window clients".to_string(),
            ));
        }
        self.blur_all();
        let client = self
            .clients
            .get_mut(id)
            .ok_or_else(|| ServiceWorkerError::NotFound(format!("client {id}")))?;
        client.focused = true;
        Ok(client.clone())
    }

    /// Take control of every client inside `scope`. Returns the ids whose
    /// controller changed.
    pub fn claim(&mut self, worker: ServiceWorkerId, scope: &Url) -> Vec<String> {
        let mut changed: Vec<String> = self
            .clients
            .values_mut()
            .filter(|c| c.url.as_str().starts_with(scope.as_str()))
            .filter(|c| c.controller != Some(worker))
            .map(|c| {
                c.controller = Some(worker);
                c.id.clone()
            })
            .collect();
        changed.sort();
        changed
    }

    /// Drop control from clients held by a worker that went away.
    pub fn release(&mut self, worker: ServiceWorkerId) {
        for client in self.clients.values_mut() {
            if client.controller == Some(worker) {
                client.controller = None;
            }
        }
    }

    pub fn add(&mut self, client: Client) {
        self.clients.insert(client.id.clone(), client);
    }

    pub fn remove(&mut self, id: &str) -> Option<Client> {
        self.clients.remove(id)
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    fn blur_all(&mut self) {
        for client in self.clients.values_mut() {
            client.focused = false;
        }
    }
}

fn next_client_id() -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(1);
    format!("client-{:06}", COUNTER.fetch_add(1, Ordering::Relaxed))
}
