//! Twilio Programmable Voice driver.
//!
//! Form-encoded REST with HTTP Basic auth. Streaming is started by the
//! instruction document returned from the webhook, so `start_streaming` is
//! a no-op for this dialect.

use std::collections::HashMap;

use async_trait::async_trait;
use base64::prelude::*;
use hmac::{Hmac, Mac};
use serde_json::Value;
use sha1::Sha1;
use tracing::warn;

use super::{CarrierDriver, WebhookEvent};
use crate::errors::call_error::{CallError, CallResult};

pub const TWILIO_API_BASE: &str = "https://api.twilio.com/2010-04-01";

type HmacSha1 = Hmac<Sha1>;

pub struct TwilioDriver {
    client: reqwest::Client,
    api_base: String,
    account_sid: String,
    auth_token: String,
}

impl TwilioDriver {
    pub fn new(account_sid: String, auth_token: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: TWILIO_API_BASE.to_string(),
            account_sid,
            auth_token,
        }
    }

    async fn post_form(&self, url: String, form: &[(&str, &str)]) -> CallResult<Value> {
        let resp = self
            .client
            .post(url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(form)
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

#[async_trait]
impl CarrierDriver for TwilioDriver {
    async fn initiate(&self, to: &str, from: &str, webhook_url: &str) -> CallResult<String> {
        let url = format!("{}/Accounts/{}/Calls.json", self.api_base, self.account_sid);
        let resp = self
            .post_form(url, &[("To", to), ("From", from), ("Url", webhook_url)])
            .await?;

        resp["sid"].as_str().map(str::to_string).ok_or_else(|| {
            CallError::ProviderError("carrier response had no call sid".to_string())
        })
    }

    async fn hangup(&self, carrier_call_id: &str) -> CallResult<()> {
        let url = format!(
            "{}/Accounts/{}/Calls/{carrier_call_id}.json",
            self.api_base, self.account_sid
        );
        self.post_form(url, &[("Status", "completed")]).await?;
        Ok(())
    }

    async fn start_streaming(&self, _carrier_call_id: &str, _ws_url: &str) -> CallResult<()> {
        // Streaming starts from the webhook response document.
        Ok(())
    }

    fn stream_connect_response(&self, ws_url: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?><Response><Start><Stream url="{ws_url}"/></Start><Pause length="60"/></Response>"#
        )
    }

    fn verify_signature(&self, header_sig: &str, full_url: &str, body: &[u8]) -> bool {
        let Ok(mut mac) = HmacSha1::new_from_slice(self.auth_token.as_bytes()) else {
            warn!("Failed to initialize webhook signature verifier");
            return false;
        };
        mac.update(full_url.as_bytes());
        mac.update(body);
        let expected = BASE64_STANDARD.encode(mac.finalize().into_bytes());

        expected == header_sig.trim()
    }

    fn parse_event(&self, body: &[u8]) -> CallResult<WebhookEvent> {
        let params: HashMap<String, String> = serde_urlencoded::from_bytes(body)
            .map_err(|e| CallError::ProviderError(format!("malformed webhook body: {e}")))?;

        let status = params
            .get("CallStatus")
            .ok_or_else(|| CallError::ProviderError("webhook body had no CallStatus".to_string()))?
            .clone();
        let carrier_call_id = params.get("CallSid").cloned().unwrap_or_default();

        Ok(match status.as_str() {
            "queued" | "initiated" => WebhookEvent::CallInitiated { carrier_call_id },
            "ringing" | "in-progress" => WebhookEvent::CallAnswered { carrier_call_id },
            "completed" => WebhookEvent::CallHungUp { carrier_call_id },
            "busy" => WebhookEvent::CallBusy { carrier_call_id },
            "no-answer" => WebhookEvent::CallNoAnswer { carrier_call_id },
            "failed" => WebhookEvent::CallFailed { carrier_call_id },
            _ => WebhookEvent::Unknown { event_type: status },
        })
    }

    fn signature_header(&self) -> &'static str {
        "x-twilio-signature"
    }
}
