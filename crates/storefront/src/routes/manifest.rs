//! Web app manifest route handler.

use axum::{
    extract::State,
    http::header,
    response::{IntoResponse, Response},
};

use crate::state::AppState;

/// Serve the web app manifest.
pub async fn webmanifest(State(state): State<AppState>) -> Response {
    let start_url = state.config().base_url.path().to_string();

    let manifest = serde_json::json!({
        "name": "PWA Commerce",
        "short_name": "Commerce",
        "start_url": start_url,
        "scope": start_url,
        "icons": [
            {
                "src": "/icons/icon-192x192.png",
                "sizes": "192x192",
                "type": "image/png"
            },
            {
                "src": "/icons/icon-512x512.png",
                "sizes": "512x512",
                "type": "image/png"
            },
            {
                "src": "/vite.svg",
                "sizes": "any",
                "type": "image/svg+xml"
            }
        ],
        "theme_color": "#3b82f6",
        "background_color": "#ffffff",
        "display": "standalone"
    });

    (
        [(header::CONTENT_TYPE, "application/manifest+json")],
        manifest.to_string(),
    )
        .into_response()
}
