//! Server-sent events for live pages.
//!
//! Each open stream registers a client on the event bus for as long as the
//! connection lasts. The first event names the client id; the rest are
//! [`ClientMessage`](crate::events::ClientMessage)s as JSON.

use std::convert::Infallible;

use axum::{
    extract::{Query, State},
    response::{
        Sse,
        sse::{Event, KeepAlive},
    },
};
use futures::Stream;
use serde::Deserialize;

use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    /// URL of the page opening the stream.
    pub url: Option<String>,
}

/// Open an event stream.
pub async fn stream(
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let url = query
        .url
        .unwrap_or_else(|| state.config().base_url.to_string());
    let mut client = state.bus().connect(url);

    let events = async_stream::stream! {
        yield Ok(Event::default().event("connected").data(client.id().to_string()));

        while let Some(message) = client.next_message().await {
            let json = serde_json::to_string(&message).unwrap_or_else(|_| {
                r#"{"type":"ERROR","message":"Failed to serialize event"}"#.to_string()
            });
            yield Ok(Event::default().data(json));
        }
    };

    Sse::new(events).keep_alive(KeepAlive::default())
}
