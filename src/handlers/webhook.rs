//! Carrier webhook handler.
//!
//! The carrier posts call lifecycle events here. The response body doubles
//! as the stream-connect instruction document for dialects that start
//! media streaming from the webhook reply.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use tracing::{debug, info, warn};

use crate::carrier::{EMPTY_DOCUMENT, WebhookEvent};
use crate::state::AppState;

/// `POST /twiml`
pub async fn twiml_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let driver = state.orchestrator.carrier();

    let header_sig = headers
        .get(driver.signature_header())
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let full_url = state.config.webhook_url().unwrap_or_default();

    if !driver.verify_signature(header_sig, &full_url, &body) {
        if state.config.strict_signatures {
            warn!("Rejecting webhook with invalid signature");
            return StatusCode::FORBIDDEN.into_response();
        }
        // Tunnels can rewrite what the signature covers; in permissive mode
        // a mismatch is logged and the event is still processed.
        warn!("Webhook signature mismatch, continuing in permissive mode");
    }

    let event = match driver.parse_event(&body) {
        Ok(event) => event,
        Err(e) => {
            warn!("Ignoring malformed webhook body: {e}");
            return xml_response(EMPTY_DOCUMENT.to_string());
        }
    };

    handle_event(&state, &event).await;

    // Dialects that stream via the webhook reply need the media URL of the
    // matching call; without a match there is nothing to instruct.
    let document = match event
        .carrier_call_id()
        .and_then(|id| state.registry.get_by_carrier_id(id))
        .and_then(|record| state.config.media_ws_url(&record.media_token).ok())
    {
        Some(ws_url) => driver.stream_connect_response(&ws_url),
        None => EMPTY_DOCUMENT.to_string(),
    };

    xml_response(document)
}

async fn handle_event(state: &Arc<AppState>, event: &WebhookEvent) {
    match event {
        WebhookEvent::CallInitiated { carrier_call_id } => {
            debug!(carrier_call_id = %carrier_call_id, "Call initiated");
        }
        WebhookEvent::CallAnswered { carrier_call_id } => {
            info!(carrier_call_id = %carrier_call_id, "Call answered");
        }
        event if event.ends_call() => {
            let carrier_call_id = event.carrier_call_id().unwrap_or_default();
            match state.registry.get_by_carrier_id(carrier_call_id) {
                Some(record) => {
                    info!(call_id = %record.call_id, ?event, "Call ended by carrier");
                    record.mark_hung_up();
                }
                None => debug!(carrier_call_id = %carrier_call_id, "Hangup for unknown call"),
            }
        }
        WebhookEvent::StreamingStarted { carrier_call_id } => {
            let Some(record) = state.registry.get_by_carrier_id(carrier_call_id) else {
                debug!(carrier_call_id = %carrier_call_id, "Streaming event for unknown call");
                return;
            };
            record.mark_streaming_ready();

            match state.config.media_ws_url(&record.media_token) {
                Ok(ws_url) => {
                    if let Err(e) = state
                        .orchestrator
                        .carrier()
                        .start_streaming(carrier_call_id, &ws_url)
                        .await
                    {
                        warn!(call_id = %record.call_id, "Failed to start media stream: {e}");
                    }
                }
                Err(e) => warn!(call_id = %record.call_id, "No media URL for stream start: {e}"),
            }
        }
        WebhookEvent::StreamingStopped { carrier_call_id } => {
            debug!(carrier_call_id = %carrier_call_id, "Streaming stopped");
        }
        WebhookEvent::Unknown { event_type } => {
            debug!(event_type = %event_type, "Unhandled webhook event");
        }
        _ => {}
    }
}

fn xml_response(document: String) -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/xml")],
        document,
    )
        .into_response()
}
