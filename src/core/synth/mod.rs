//! One-shot speech synthesis against the speech service REST endpoint.
//!
//! Each utterance is a single request returning raw PCM16 at 24 kHz mono.
//! No caching and no retries; a failed synthesis surfaces directly to the
//! tool caller.

use serde_json::json;
use tracing::debug;

use crate::config::Voice;
use crate::errors::call_error::{CallError, CallResult};

pub const SPEECH_API_BASE: &str = "https://api.openai.com/v1";

pub struct Synthesizer {
    client: reqwest::Client,
    api_base: String,
    api_key: String,
    model: String,
    voice: Voice,
}

impl Synthesizer {
    pub fn new(api_key: String, model: String, voice: Voice) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: SPEECH_API_BASE.to_string(),
            api_key,
            model,
            voice,
        }
    }

    /// Synthesize `text` to PCM16 @ 24 kHz mono.
    pub async fn synthesize(&self, text: &str) -> CallResult<Vec<u8>> {
        let resp = self
            .client
            .post(format!("{}/audio/speech", self.api_base))
            .bearer_auth(&self.api_key)
            .json(&json!({
                "model": self.model,
                "input": text,
                "voice": self.voice.as_str(),
                "response_format": "pcm",
            }))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(CallError::SynthesisError(format!("{status}: {body}")));
        }

        let audio = resp.bytes().await?;
        debug!(bytes = audio.len(), "Synthesized utterance");
        Ok(audio.to_vec())
    }
}
