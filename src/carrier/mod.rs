//! Telephony carrier drivers.
//!
//! Two REST/webhook dialects are supported behind one interface: Telnyx
//! (JSON REST, streaming started by an explicit API call) and Twilio
//! (form-encoded REST, streaming started by the instruction document the
//! webhook returns). Dispatch is a tagged union over the two drivers.

mod telnyx;
mod twilio;

pub use telnyx::TelnyxDriver;
pub use twilio::TwilioDriver;

use async_trait::async_trait;

use crate::config::{CarrierProvider, ServerConfig};
use crate::errors::call_error::CallResult;

/// Empty success document returned when a webhook needs no instructions.
pub const EMPTY_DOCUMENT: &str =
    r#"<?xml version="1.0" encoding="UTF-8"?><Response></Response>"#;

/// Carrier-side call lifecycle events delivered over the webhook channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookEvent {
    CallInitiated { carrier_call_id: String },
    CallAnswered { carrier_call_id: String },
    CallHungUp { carrier_call_id: String },
    CallBusy { carrier_call_id: String },
    CallNoAnswer { carrier_call_id: String },
    CallFailed { carrier_call_id: String },
    StreamingStarted { carrier_call_id: String },
    StreamingStopped { carrier_call_id: String },
    Unknown { event_type: String },
}

impl WebhookEvent {
    /// Carrier call id the event refers to, where one applies.
    pub fn carrier_call_id(&self) -> Option<&str> {
        match self {
            WebhookEvent::CallInitiated { carrier_call_id }
            | WebhookEvent::CallAnswered { carrier_call_id }
            | WebhookEvent::CallHungUp { carrier_call_id }
            | WebhookEvent::CallBusy { carrier_call_id }
            | WebhookEvent::CallNoAnswer { carrier_call_id }
            | WebhookEvent::CallFailed { carrier_call_id }
            | WebhookEvent::StreamingStarted { carrier_call_id }
            | WebhookEvent::StreamingStopped { carrier_call_id } => Some(carrier_call_id),
            WebhookEvent::Unknown { .. } => None,
        }
    }

    /// True for the terminal call outcomes (hangup, busy, no answer, failed).
    pub fn ends_call(&self) -> bool {
        matches!(
            self,
            WebhookEvent::CallHungUp { .. }
                | WebhookEvent::CallBusy { .. }
                | WebhookEvent::CallNoAnswer { .. }
                | WebhookEvent::CallFailed { .. }
        )
    }
}

/// Common surface of the two carrier dialects.
#[async_trait]
pub trait CarrierDriver: Send + Sync {
    /// Place an outbound call; returns the carrier-assigned call id.
    async fn initiate(&self, to: &str, from: &str, webhook_url: &str) -> CallResult<String>;

    /// Terminate the call on the carrier side.
    async fn hangup(&self, carrier_call_id: &str) -> CallResult<()>;

    /// Ask the carrier to open its media WebSocket toward `ws_url`.
    /// A no-op for dialects that start streaming via the webhook response.
    async fn start_streaming(&self, carrier_call_id: &str, ws_url: &str) -> CallResult<()>;

    /// Document returned from the webhook telling the carrier how to reach
    /// the media stream.
    fn stream_connect_response(&self, ws_url: &str) -> String;

    /// Verify the webhook signature over the full request URL and raw body.
    /// Returns `true` when no verification material is configured; the
    /// strict/permissive policy is applied by the webhook handler.
    fn verify_signature(&self, header_sig: &str, full_url: &str, body: &[u8]) -> bool;

    /// Parse a webhook body. `Err` means the body was malformed for this
    /// dialect; unknown-but-well-formed events come back as
    /// [`WebhookEvent::Unknown`].
    fn parse_event(&self, body: &[u8]) -> CallResult<WebhookEvent>;

    /// Request header carrying this dialect's webhook signature.
    fn signature_header(&self) -> &'static str;
}

/// Tagged union over the supported drivers.
pub enum Carrier {
    Telnyx(TelnyxDriver),
    Twilio(TwilioDriver),
}

impl Carrier {
    pub fn from_config(config: &ServerConfig) -> CallResult<Self> {
        match config.provider {
            CarrierProvider::Telnyx => Ok(Carrier::Telnyx(TelnyxDriver::new(
                config.carrier_secret.clone(),
                config.carrier_account_id.clone(),
                config.carrier_public_key.clone(),
            )?)),
            CarrierProvider::Twilio => Ok(Carrier::Twilio(TwilioDriver::new(
                config.carrier_account_id.clone(),
                config.carrier_secret.clone(),
            ))),
        }
    }

    pub fn driver(&self) -> &dyn CarrierDriver {
        match self {
            Carrier::Telnyx(driver) => driver,
            Carrier::Twilio(driver) => driver,
        }
    }
}
