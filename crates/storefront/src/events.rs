//! Messages from the storefront to live pages.
//!
//! A page becomes a live client by opening the `/api/events` stream. Messages
//! are broadcast to every client; messages addressed to one client carry its
//! id and are filtered out of the other streams.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

use pwa_commerce_core::ConnectivityStatus;

use crate::sync::notify::Notification;

/// Buffered messages per client before slow readers start lagging.
const CHANNEL_CAPACITY: usize = 64;

/// A message delivered to live pages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientMessage {
    /// A flush run delivered at least one operation; pages should reload the cart.
    SyncComplete { delivered: usize },
    /// Connectivity changed.
    Connectivity { status: ConnectivityStatus },
    /// Show a notification.
    Notification { notification: Notification },
    /// Bring the given client to the foreground.
    Focus { client_id: Uuid },
}

impl ClientMessage {
    /// Whether this message should be delivered to `client_id`.
    #[must_use]
    pub fn is_for(&self, client_id: Uuid) -> bool {
        match self {
            Self::Focus { client_id: target } => *target == client_id,
            _ => true,
        }
    }
}

/// A live page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClientInfo {
    pub id: Uuid,
    pub url: String,
    pub connected_at: DateTime<Utc>,
}

/// Broadcast channel plus the registry of live clients.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<EventBusInner>,
}

struct EventBusInner {
    sender: broadcast::Sender<ClientMessage>,
    clients: RwLock<HashMap<Uuid, ClientInfo>>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    /// Create a bus with no clients.
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(EventBusInner {
                sender,
                clients: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Send a message to every subscriber. Returns how many received it.
    pub fn publish(&self, message: ClientMessage) -> usize {
        // An error only means nobody is listening.
        self.inner.sender.send(message).unwrap_or(0)
    }

    /// Subscribe without registering as a client.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ClientMessage> {
        self.inner.sender.subscribe()
    }

    /// Register a live client open on `url`.
    ///
    /// The client stays registered until the returned handle is dropped.
    #[must_use]
    pub fn connect(&self, url: impl Into<String>) -> ClientHandle {
        let info = ClientInfo {
            id: Uuid::new_v4(),
            url: url.into(),
            connected_at: Utc::now(),
        };
        let receiver = self.inner.sender.subscribe();

        if let Ok(mut clients) = self.inner.clients.write() {
            clients.insert(info.id, info.clone());
        }
        tracing::debug!(client_id = %info.id, url = %info.url, "client connected");

        ClientHandle {
            info,
            receiver,
            bus: self.clone(),
        }
    }

    /// Snapshot of live clients, oldest first.
    #[must_use]
    pub fn clients(&self) -> Vec<ClientInfo> {
        let mut clients: Vec<_> = self
            .inner
            .clients
            .read()
            .map(|guard| guard.values().cloned().collect())
            .unwrap_or_default();
        clients.sort_by_key(|c| c.connected_at);
        clients
    }

    /// Number of live clients.
    #[must_use]
    pub fn client_count(&self) -> usize {
        self.inner
            .clients
            .read()
            .map(|guard| guard.len())
            .unwrap_or(0)
    }

    fn disconnect(&self, id: Uuid) {
        if let Ok(mut clients) = self.inner.clients.write() {
            clients.remove(&id);
        }
        tracing::debug!(client_id = %id, "client disconnected");
    }
}

/// Registration of one live client. Dropping it deregisters the client.
pub struct ClientHandle {
    info: ClientInfo,
    receiver: broadcast::Receiver<ClientMessage>,
    bus: EventBus,
}

impl ClientHandle {
    /// This client's id.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.info.id
    }

    /// Wait for the next message addressed to this client.
    ///
    /// Returns `None` once the bus is gone. Messages lost to lagging are
    /// skipped.
    pub async fn next_message(&mut self) -> Option<ClientMessage> {
        loop {
            match self.receiver.recv().await {
                Ok(message) if message.is_for(self.info.id) => return Some(message),
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(client_id = %self.info.id, skipped, "client lagging, messages dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

impl Drop for ClientHandle {
    fn drop(&mut self) {
        self.bus.disconnect(self.info.id);
    }
}
