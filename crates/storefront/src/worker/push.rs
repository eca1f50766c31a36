//! Push payloads, notification clicks and push subscription options.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::Serialize;
use serde_json::{Map, Value};
use url::Url;
use uuid::Uuid;

use crate::events::ClientInfo;
use crate::sync::notify::{DEFAULT_ICON, Notification, NotificationData};

/// Title used when a push payload does not name one.
pub const DEFAULT_TITLE: &str = "PWA Commerce";

/// Body used when a push payload does not name one.
pub const DEFAULT_BODY: &str = "New notification";

/// Build the notification for a push event.
///
/// The payload's top-level JSON fields replace the defaults one for one. A
/// payload that is not a JSON object, or whose fields have the wrong shape,
/// is logged and the defaults are shown instead.
#[must_use]
pub fn notification_from_push(payload: Option<&str>, origin: &Url) -> Notification {
    let mut fields = default_fields(origin);

    if let Some(payload) = payload {
        match serde_json::from_str::<Value>(payload) {
            Ok(Value::Object(overrides)) => fields.extend(overrides),
            Ok(other) => {
                tracing::error!(payload = %other, "push payload is not an object, using defaults");
            }
            Err(e) => {
                tracing::error!(error = %e, "error parsing push notification data, using defaults");
            }
        }
    }

    serde_json::from_value(Value::Object(fields)).unwrap_or_else(|e| {
        tracing::error!(error = %e, "push payload has invalid fields, using defaults");
        default_notification(origin)
    })
}

fn default_fields(origin: &Url) -> Map<String, Value> {
    let mut data = Map::new();
    data.insert("url".to_owned(), Value::String(origin_string(origin)));

    let mut fields = Map::new();
    fields.insert("title".to_owned(), Value::String(DEFAULT_TITLE.to_owned()));
    fields.insert("body".to_owned(), Value::String(DEFAULT_BODY.to_owned()));
    fields.insert("icon".to_owned(), Value::String(DEFAULT_ICON.to_owned()));
    fields.insert("data".to_owned(), Value::Object(data));
    fields
}

fn default_notification(origin: &Url) -> Notification {
    Notification {
        title: DEFAULT_TITLE.to_owned(),
        body: DEFAULT_BODY.to_owned(),
        icon: Some(DEFAULT_ICON.to_owned()),
        data: NotificationData {
            url: Some(origin_string(origin)),
        },
    }
}

fn origin_string(origin: &Url) -> String {
    origin.origin().ascii_serialization()
}

/// What a notification click does.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ClientAction {
    /// Bring an existing page to the foreground.
    Focus { client_id: Uuid },
    /// Open a new page.
    OpenWindow { url: String },
}

impl ClientAction {
    /// Pick the action for a click targeting `url`: focus the first client
    /// already on that URL, else open a new window.
    #[must_use]
    pub fn for_click(url: &str, clients: &[ClientInfo]) -> Self {
        clients
            .iter()
            .find(|client| client.url == url)
            .map_or_else(
                || Self::OpenWindow {
                    url: url.to_owned(),
                },
                |client| Self::Focus {
                    client_id: client.id,
                },
            )
    }
}

/// Options a page uses to subscribe to push.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PushOptions {
    pub user_visible_only: bool,
    /// Application server key, URL-safe base64 without padding.
    pub application_server_key: String,
}

impl PushOptions {
    #[must_use]
    pub fn new(application_server_key: &[u8]) -> Self {
        Self {
            user_visible_only: true,
            application_server_key: URL_SAFE_NO_PAD.encode(application_server_key),
        }
    }
}

/// Decode a VAPID public key given as URL-safe base64, padded or not.
///
/// # Errors
///
/// Returns `base64::DecodeError` if the key is not valid base64.
pub fn decode_application_server_key(key: &str) -> Result<Vec<u8>, base64::DecodeError> {
    URL_SAFE_NO_PAD.decode(key.trim().trim_end_matches('='))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn origin() -> Url {
        Url::parse("https://shop.test/some/page").unwrap()
    }

    #[test]
    fn test_push_without_payload_uses_defaults() {
        let notification = notification_from_push(None, &origin());
        assert_eq!(notification.title, "PWA Commerce");
        assert_eq!(notification.body, "New notification");
        assert_eq!(notification.icon.as_deref(), Some("/vite.svg"));
        assert_eq!(notification.data.url.as_deref(), Some("https://shop.test"));
    }

    #[test]
    fn test_push_payload_overrides_fields() {
        let notification = notification_from_push(
            Some(r#"{"title": "Sale", "data": {"url": "https://shop.test/sale"}}"#),
            &origin(),
        );
        assert_eq!(notification.title, "Sale");
        assert_eq!(notification.body, "New notification");
        assert_eq!(notification.data.url.as_deref(), Some("https://shop.test/sale"));
    }

    #[test]
    fn test_push_invalid_payload_falls_back() {
        let garbage = notification_from_push(Some("not json"), &origin());
        let wrong_shape = notification_from_push(Some(r#"{"title": 5}"#), &origin());
        assert_eq!(garbage, default_notification(&origin()));
        assert_eq!(wrong_shape, default_notification(&origin()));
    }

    #[test]
    fn test_click_focuses_matching_client() {
        let client = ClientInfo {
            id: Uuid::new_v4(),
            url: "https://shop.test/sale".to_owned(),
            connected_at: Utc::now(),
        };

        assert_eq!(
            ClientAction::for_click("https://shop.test/sale", std::slice::from_ref(&client)),
            ClientAction::Focus {
                client_id: client.id
            }
        );
        assert_eq!(
            ClientAction::for_click("https://shop.test/", &[client]),
            ClientAction::OpenWindow {
                url: "https://shop.test/".to_owned()
            }
        );
    }

    #[test]
    fn test_decode_key_with_and_without_padding() {
        let key = "BEl62iUYgUivxIkv69yViEuiBIa-Ib9-SkvMeAtA3LFgDzkrxZJjSgSnfckjBJuBkr3qBUYIHBQFLXYp5Nksh8U";
        let bytes = decode_application_server_key(key).unwrap();
        assert_eq!(bytes.len(), 65);
        assert_eq!(bytes[0], 0x04);

        let padded = decode_application_server_key("AQID").unwrap();
        assert_eq!(padded, [1, 2, 3]);
        assert_eq!(decode_application_server_key("AQ==").unwrap(), [1]);
        assert!(decode_application_server_key("not base64!").is_err());

        assert_eq!(PushOptions::new(&bytes).application_server_key, key);
    }
}
