use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::handlers::{health, media_ws, webhook};
use crate::state::AppState;

/// Create the router for the webhook/media endpoint
///
/// All routes are called by external services (the carrier's webhook and
/// media-stream dialers) or by health probes; authentication is carried by
/// the webhook signature and the media-stream token respectively.
pub fn create_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/twiml", post(webhook::twiml_webhook))
        .route("/media-stream", get(media_ws::media_stream_handler))
        .layer(TraceLayer::new_for_http())
}
