//! Carrier media WebSocket endpoint.
//!
//! The carrier dials `GET /media-stream?token=<T>` with a WebSocket
//! upgrade. The token was minted at call initiation and binds the channel
//! to its call; an empty or unknown token is rejected before the upgrade
//! and creates no state.

use std::sync::Arc;

use axum::{
    extract::{
        Query, State,
        ws::{WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::core::pump::{self, OutboundUtterance};
use crate::core::registry::CallRecord;
use crate::state::AppState;

/// One utterance in flight at a time; the speak/listen exclusion upstream
/// means the channel never backs up.
const OUTBOUND_QUEUE: usize = 1;

#[derive(Debug, Deserialize)]
pub struct MediaStreamParams {
    #[serde(default)]
    token: String,
}

/// `GET /media-stream?token=<T>` with `Upgrade: websocket`
pub async fn media_stream_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<MediaStreamParams>,
    State(state): State<Arc<AppState>>,
) -> Response {
    if params.token.is_empty() {
        warn!("Media stream upgrade without token");
        return StatusCode::UNAUTHORIZED.into_response();
    }

    let Some(record) = state.registry.get_by_channel(&params.token) else {
        warn!("Media stream upgrade with unknown token");
        return StatusCode::UNAUTHORIZED.into_response();
    };

    ws.on_upgrade(move |socket| handle_media_socket(socket, record))
}

async fn handle_media_socket(socket: WebSocket, record: Arc<CallRecord>) {
    info!(call_id = %record.call_id, "Carrier media stream connected");

    let (outbound_tx, outbound_rx) = mpsc::channel::<OutboundUtterance>(OUTBOUND_QUEUE);
    record.bind_media_channel(outbound_tx);

    pump::run(socket, record.clone(), outbound_rx).await;

    info!(call_id = %record.call_id, "Carrier media stream closed");
}
