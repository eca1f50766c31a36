//! User-visible notifications.
//!
//! Notifications are shown by the live pages, so showing one means
//! broadcasting it over the event bus. With no page open there is nobody to
//! show it to.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::instrument;

use crate::events::{ClientMessage, EventBus};

/// Icon used when a notification does not name one.
pub const DEFAULT_ICON: &str = "/vite.svg";

/// Errors that can occur when showing a notification.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum NotificationError {
    /// No live page is connected.
    #[error("no active clients to show the notification")]
    NoActiveClients,
}

/// Navigation target attached to a notification.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// A notification as shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub title: String,
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default)]
    pub data: NotificationData,
}

impl Notification {
    /// The notification shown after a flush run delivered operations.
    #[must_use]
    pub fn sync_complete() -> Self {
        Self {
            title: "Cart Synchronized".to_owned(),
            body: "Your cart has been synchronized with the server.".to_owned(),
            icon: Some(DEFAULT_ICON.to_owned()),
            data: NotificationData::default(),
        }
    }
}

/// Shows notifications on live pages.
#[derive(Clone)]
pub struct Notifier {
    bus: EventBus,
}

impl Notifier {
    /// Create a notifier publishing on `bus`.
    #[must_use]
    pub const fn new(bus: EventBus) -> Self {
        Self { bus }
    }

    /// Show a notification. Returns the number of pages that received it.
    ///
    /// # Errors
    ///
    /// Returns `NotificationError::NoActiveClients` if no page is listening.
    #[instrument(skip(self, notification), fields(title = %notification.title))]
    pub fn show(&self, notification: Notification) -> Result<usize, NotificationError> {
        match self.bus.publish(ClientMessage::Notification { notification }) {
            0 => Err(NotificationError::NoActiveClients),
            shown => Ok(shown),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_show_without_clients() {
        let notifier = Notifier::new(EventBus::new());
        assert_eq!(
            notifier.show(Notification::sync_complete()),
            Err(NotificationError::NoActiveClients)
        );
    }

    #[tokio::test]
    async fn test_show_reaches_client() {
        let bus = EventBus::new();
        let mut client = bus.connect("http://localhost/");
        let notifier = Notifier::new(bus);

        assert_eq!(notifier.show(Notification::sync_complete()), Ok(1));

        let Some(ClientMessage::Notification { notification }) = client.next_message().await else {
            panic!("expected a notification");
        };
        assert_eq!(notification.title, "Cart Synchronized");
    }
}
