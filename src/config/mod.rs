//! Configuration for the call orchestrator
//!
//! Configuration is read once from environment variables (with `.env`
//! support) at startup and never mutated afterwards. The one exception is
//! the public base URL, which may be provided late by the tunnel
//! collaborator: it can be set exactly once and is frozen from then on.

use std::str::FromStr;
use std::sync::OnceLock;

mod env;
mod validation;

pub use validation::validate_phone_number;

use crate::errors::call_error::{CallError, CallResult};

/// Telephony carrier dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CarrierProvider {
    Telnyx,
    Twilio,
}

impl CarrierProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            CarrierProvider::Telnyx => "telnyx",
            CarrierProvider::Twilio => "twilio",
        }
    }
}

impl FromStr for CarrierProvider {
    type Err = CallError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "telnyx" => Ok(CarrierProvider::Telnyx),
            "twilio" => Ok(CarrierProvider::Twilio),
            other => Err(CallError::MissingConfiguration(format!(
                "PHONE_PROVIDER must be 'telnyx' or 'twilio', got '{other}'"
            ))),
        }
    }
}

/// Synthesis voice. Six named voices are supported by the speech service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Voice {
    Alloy,
    Echo,
    Fable,
    #[default]
    Onyx,
    Nova,
    Shimmer,
}

impl Voice {
    pub fn as_str(&self) -> &'static str {
        match self {
            Voice::Alloy => "alloy",
            Voice::Echo => "echo",
            Voice::Fable => "fable",
            Voice::Onyx => "onyx",
            Voice::Nova => "nova",
            Voice::Shimmer => "shimmer",
        }
    }

    pub fn all() -> [Voice; 6] {
        [
            Voice::Alloy,
            Voice::Echo,
            Voice::Fable,
            Voice::Onyx,
            Voice::Nova,
            Voice::Shimmer,
        ]
    }
}

impl FromStr for Voice {
    type Err = CallError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "alloy" => Ok(Voice::Alloy),
            "echo" => Ok(Voice::Echo),
            "fable" => Ok(Voice::Fable),
            "onyx" => Ok(Voice::Onyx),
            "nova" => Ok(Voice::Nova),
            "shimmer" => Ok(Voice::Shimmer),
            other => Err(CallError::MissingConfiguration(format!(
                "TTS_VOICE '{other}' is not supported (valid: alloy, echo, fable, onyx, nova, shimmer)"
            ))),
        }
    }
}

/// Server configuration
///
/// Contains everything needed to run the orchestrator:
/// - Carrier settings (provider, account id, secret, caller id)
/// - Speech service settings (API key, voice, models, timing)
/// - Endpoint settings (listen port, public base URL)
#[derive(Debug, Clone)]
pub struct ServerConfig {
    // Carrier settings
    pub provider: CarrierProvider,
    pub carrier_account_id: String,
    pub carrier_secret: String,
    /// Base64 public key used to verify variant T webhook signatures.
    pub carrier_public_key: Option<String>,
    pub from_number: String,
    pub user_number: String,

    // Speech service settings
    pub openai_api_key: String,
    pub tts_voice: Voice,
    pub tts_model: String,
    pub stt_model: String,
    pub stt_silence_ms: u64,
    pub transcript_timeout_ms: u64,

    // Endpoint settings
    pub port: u16,
    /// Consumed by the tunnel collaborator, not by the core.
    pub tunnel_auth_token: Option<String>,
    /// Reject webhooks with bad signatures instead of logging and continuing.
    pub strict_signatures: bool,
    /// Public base URL, late-bound once (e.g. after the tunnel comes up).
    pub public_url: OnceLock<String>,
}

impl ServerConfig {
    /// Local listen address.
    pub fn address(&self) -> String {
        format!("0.0.0.0:{}", self.port)
    }

    /// Freeze the public base URL. Fails if it was already set.
    pub fn set_public_url(&self, url: String) -> CallResult<()> {
        let url = url.trim_end_matches('/').to_string();
        self.public_url
            .set(url)
            .map_err(|_| CallError::ProviderError("public URL is already set".to_string()))
    }

    /// Public base URL, if bound yet.
    pub fn public_url(&self) -> CallResult<&str> {
        self.public_url
            .get()
            .map(String::as_str)
            .ok_or_else(|| CallError::MissingConfiguration("PUBLIC_URL".to_string()))
    }

    /// Webhook URL handed to the carrier at call creation.
    pub fn webhook_url(&self) -> CallResult<String> {
        Ok(format!("{}/twiml", self.public_url()?))
    }

    /// Media WebSocket URL for a given channel token, derived from the
    /// public URL (`https` becomes `wss`).
    pub fn media_ws_url(&self, token: &str) -> CallResult<String> {
        let base = self.public_url()?;
        let ws_base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            base.to_string()
        };
        Ok(format!("{ws_base}/media-stream?token={token}"))
    }
}
