//! Telnyx Call Control driver.
//!
//! JSON REST with bearer auth. The media stream is attached by an explicit
//! API call once the carrier reports streaming readiness over the webhook
//! channel; the webhook response itself carries no instructions.

use async_trait::async_trait;
use base64::prelude::*;
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use serde_json::{Value, json};
use tracing::{debug, warn};

use super::{CarrierDriver, EMPTY_DOCUMENT, WebhookEvent};
use crate::errors::call_error::{CallError, CallResult};

pub const TELNYX_API_BASE: &str = "https://api.telnyx.com/v2";

pub struct TelnyxDriver {
    client: reqwest::Client,
    api_base: String,
    api_key: String,
    connection_id: String,
    public_key: Option<VerifyingKey>,
}

impl TelnyxDriver {
    pub fn new(
        api_key: String,
        connection_id: String,
        public_key_b64: Option<String>,
    ) -> CallResult<Self> {
        let public_key = match public_key_b64 {
            Some(encoded) => Some(parse_public_key(&encoded)?),
            None => None,
        };

        Ok(Self {
            client: reqwest::Client::new(),
            api_base: TELNYX_API_BASE.to_string(),
            api_key,
            connection_id,
            public_key,
        })
    }

    async fn post_json(&self, url: String, body: Value) -> CallResult<Value> {
        let resp = self
            .client
            .post(url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(CallError::ProviderError(format!(
                "carrier returned {status}: {text}"
            )));
        }

        resp.json().await.map_err(CallError::from)
    }
}

fn parse_public_key(encoded: &str) -> CallResult<VerifyingKey> {
    let bytes = BASE64_STANDARD
        .decode(encoded.trim())
        .map_err(|e| CallError::MissingConfiguration(format!("CARRIER_PUBLIC_KEY: {e}")))?;
    let bytes: [u8; 32] = bytes.try_into().map_err(|_| {
        CallError::MissingConfiguration("CARRIER_PUBLIC_KEY: expected 32 bytes".to_string())
    })?;
    VerifyingKey::from_bytes(&bytes)
        .map_err(|e| CallError::MissingConfiguration(format!("CARRIER_PUBLIC_KEY: {e}")))
}

#[async_trait]
impl CarrierDriver for TelnyxDriver {
    async fn initiate(&self, to: &str, from: &str, webhook_url: &str) -> CallResult<String> {
        let body = json!({
            "to": to,
            "from": from,
            "webhook_url": webhook_url,
            "webhook_url_method": "POST",
            "connection_id": self.connection_id,
        });
        let resp = self.post_json(format!("{}/calls", self.api_base), body).await?;

        resp["data"]["call_control_id"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| {
                CallError::ProviderError("carrier response had no call_control_id".to_string())
            })
    }

    async fn hangup(&self, carrier_call_id: &str) -> CallResult<()> {
        self.post_json(
            format!("{}/calls/{carrier_call_id}/actions/hangup", self.api_base),
            json!({}),
        )
        .await?;
        Ok(())
    }

    async fn start_streaming(&self, carrier_call_id: &str, ws_url: &str) -> CallResult<()> {
        self.post_json(
            format!("{}/calls/{carrier_call_id}/actions/stream", self.api_base),
            json!({
                "stream_url": ws_url,
                "stream_track": "inbound",
                "format": "ULAW",
                "sample_rate": 8000,
            }),
        )
        .await?;
        Ok(())
    }

    fn stream_connect_response(&self, _ws_url: &str) -> String {
        EMPTY_DOCUMENT.to_string()
    }

    fn verify_signature(&self, header_sig: &str, _full_url: &str, body: &[u8]) -> bool {
        let Some(key) = &self.public_key else {
            debug!("No carrier public key configured, skipping signature check");
            return true;
        };

        let Ok(sig_bytes) = BASE64_STANDARD.decode(header_sig.trim()) else {
            warn!("Webhook signature header is not valid base64");
            return false;
        };
        let Ok(sig_bytes) = <[u8; 64]>::try_from(sig_bytes.as_slice()) else {
            warn!("Webhook signature has wrong length");
            return false;
        };

        key.verify(body, &Signature::from_bytes(&sig_bytes)).is_ok()
    }

    fn parse_event(&self, body: &[u8]) -> CallResult<WebhookEvent> {
        let value: Value = serde_json::from_slice(body)
            .map_err(|e| CallError::ProviderError(format!("malformed webhook body: {e}")))?;

        let event_type = value["data"]["event_type"]
            .as_str()
            .ok_or_else(|| CallError::ProviderError("webhook body had no event_type".to_string()))?
            .to_string();
        let carrier_call_id = value["data"]["payload"]["call_control_id"]
            .as_str()
            .unwrap_or_default()
            .to_string();

        Ok(match event_type.as_str() {
            "call.initiated" => WebhookEvent::CallInitiated { carrier_call_id },
            "call.answered" => WebhookEvent::CallAnswered { carrier_call_id },
            "call.hangup" => WebhookEvent::CallHungUp { carrier_call_id },
            "streaming.started" => WebhookEvent::StreamingStarted { carrier_call_id },
            "streaming.stopped" => WebhookEvent::StreamingStopped { carrier_call_id },
            _ => WebhookEvent::Unknown { event_type },
        })
    }

    fn signature_header(&self) -> &'static str {
        "telnyx-signature-ed25519"
    }
}
