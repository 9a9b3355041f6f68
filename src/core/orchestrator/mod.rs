//! Call orchestrator.
//!
//! Drives the per-call state machine across the three I/O legs (carrier
//! REST/webhooks, carrier media WebSocket, transcription WebSocket) and
//! implements the four operations the tool surface exposes. Each operation
//! looks synchronous to the caller but internally waits on call-state
//! transitions, streaming readiness and transcript completion.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::oneshot;
use tracing::{info, warn};

use crate::audio::{pcm16_to_mulaw, resample_24k_to_8k};
use crate::carrier::{Carrier, CarrierDriver};
use crate::config::ServerConfig;
use crate::core::pump::OutboundUtterance;
use crate::core::registry::{CallRecord, CallRegistry, CallState, Speaker};
use crate::core::synth::Synthesizer;
use crate::core::transcribe::{SttConfig, TranscriptionSession};
use crate::errors::call_error::{CallError, CallResult};

/// How long `initiate` waits for the media path to come up.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Tail-audio grace between the closing line and the carrier hangup.
const HANGUP_GRACE: Duration = Duration::from_secs(2);

pub struct CallOrchestrator {
    config: Arc<ServerConfig>,
    registry: Arc<CallRegistry>,
    carrier: Carrier,
    synthesizer: Synthesizer,
}

impl CallOrchestrator {
    pub fn new(config: Arc<ServerConfig>, registry: Arc<CallRegistry>) -> CallResult<Self> {
        let carrier = Carrier::from_config(&config)?;
        let synthesizer = Synthesizer::new(
            config.openai_api_key.clone(),
            config.tts_model.clone(),
            config.tts_voice,
        );
        Ok(Self {
            config,
            registry,
            carrier,
            synthesizer,
        })
    }

    pub fn registry(&self) -> &Arc<CallRegistry> {
        &self.registry
    }

    pub fn carrier(&self) -> &dyn CarrierDriver {
        self.carrier.driver()
    }

    /// Place a call, speak the opening message, and return the user's first
    /// reply together with the new call id.
    pub async fn initiate(&self, message: &str) -> CallResult<(String, String)> {
        if self.registry.has_live_call() {
            return Err(CallError::ProviderError(
                "one active call at a time".to_string(),
            ));
        }

        let call_id = self.registry.mint_call_id();
        let media_token = uuid::Uuid::new_v4().simple().to_string();
        let record = Arc::new(CallRecord::new(
            call_id.clone(),
            self.config.user_number.clone(),
            media_token,
        ));
        self.registry.insert(record.clone());

        info!(call_id = %call_id, to = %record.user_number, "Initiating call");

        match self.dial_and_greet(&record, message).await {
            Ok(reply) => Ok((call_id, reply)),
            Err(e) => {
                // A failed initiate leaves no state behind.
                if let Some(carrier_id) = record.carrier_call_id()
                    && let Err(hangup_err) = self.carrier().hangup(&carrier_id).await
                {
                    warn!(call_id = %call_id, "Hangup after failed initiate: {hangup_err}");
                }
                self.teardown(&record).await;
                Err(e)
            }
        }
    }

    async fn dial_and_greet(&self, record: &Arc<CallRecord>, message: &str) -> CallResult<String> {
        let _turn = record.turn_lock.lock().await;

        let stt = Arc::new(
            TranscriptionSession::connect(
                SttConfig::new(
                    self.config.openai_api_key.clone(),
                    self.config.stt_model.clone(),
                    self.config.stt_silence_ms,
                ),
                None,
            )
            .await?,
        );
        record.attach_stt(stt);

        let webhook_url = self.config.webhook_url()?;
        record.set_state(CallState::Dialing);
        let carrier_id = self
            .carrier()
            .initiate(&record.user_number, &self.config.from_number, &webhook_url)
            .await?;
        info!(call_id = %record.call_id, carrier_call_id = %carrier_id, "Carrier accepted call");
        record.set_carrier_call_id(carrier_id.clone());
        self.registry.index_carrier_id(&carrier_id, &record.call_id);

        record.set_state(CallState::Streaming);
        record.wait_until_media_ready(CONNECT_TIMEOUT).await?;
        record.set_state(CallState::Idle);

        self.speak_turn(record, message).await?;
        self.listen_turn(record).await
    }

    /// One more conversational turn on an established call.
    pub async fn continue_call(&self, call_id: &str, message: &str) -> CallResult<String> {
        let record = self.lookup(call_id)?;
        let result = async {
            if record.hung_up() {
                return Err(CallError::CallHungUp);
            }
            let _turn = record.turn_lock.lock().await;
            if record.hung_up() {
                return Err(CallError::CallHungUp);
            }
            self.speak_turn(&record, message).await?;
            self.listen_turn(&record).await
        }
        .await;

        self.reap_if_hung_up(&record, &result).await;
        result
    }

    /// Speak without consuming a reply.
    pub async fn speak(&self, call_id: &str, message: &str) -> CallResult<()> {
        let record = self.lookup(call_id)?;
        let result = async {
            if record.hung_up() {
                return Err(CallError::CallHungUp);
            }
            let _turn = record.turn_lock.lock().await;
            if record.hung_up() {
                return Err(CallError::CallHungUp);
            }
            self.speak_turn(&record, message).await
        }
        .await;

        self.reap_if_hung_up(&record, &result).await;
        result
    }

    /// Speak a closing line, hang up, release every per-call resource, and
    /// return the call duration in seconds.
    pub async fn end(&self, call_id: &str, message: &str) -> CallResult<u64> {
        let record = self.lookup(call_id)?;

        {
            let _turn = record.turn_lock.lock().await;
            if !record.hung_up() {
                // The goodbye is best effort; the hangup is not.
                if let Err(e) = self.speak_turn(&record, message).await {
                    warn!(call_id = %record.call_id, "Closing line failed: {e}");
                }
                tokio::time::sleep(HANGUP_GRACE).await;
            }
            record.set_state(CallState::Closing);

            if let Some(carrier_id) = record.carrier_call_id()
                && let Err(e) = self.carrier().hangup(&carrier_id).await
            {
                warn!(call_id = %record.call_id, "Carrier hangup failed: {e}");
            }
        }

        self.teardown(&record).await;
        record.set_state(CallState::Closed);

        let duration = record.elapsed_secs();
        info!(call_id = %record.call_id, duration_secs = duration, "Call ended");
        Ok(duration)
    }

    fn lookup(&self, call_id: &str) -> CallResult<Arc<CallRecord>> {
        self.registry
            .get(call_id)
            .ok_or_else(|| CallError::CallNotFound(call_id.to_string()))
    }

    /// Synthesize, downsample, encode and pace one utterance out to the
    /// carrier. Holds the call in `Speaking` until the pump has drained it.
    async fn speak_turn(&self, record: &Arc<CallRecord>, text: &str) -> CallResult<()> {
        record.set_state(CallState::Speaking);
        let result = self.speak_inner(record, text).await;
        if result.is_ok() {
            record.log_line(Speaker::Agent, text);
        }
        if !record.hung_up() {
            record.set_state(CallState::Idle);
        }
        result
    }

    async fn speak_inner(&self, record: &Arc<CallRecord>, text: &str) -> CallResult<()> {
        let pcm24k = self.synthesizer.synthesize(text).await?;
        let ulaw = pcm16_to_mulaw(&resample_24k_to_8k(&pcm24k));

        let sender = record.media_sender().ok_or(CallError::CallHungUp)?;
        let (done_tx, done_rx) = oneshot::channel();
        sender
            .send(OutboundUtterance {
                audio: Bytes::from(ulaw),
                done: done_tx,
            })
            .await
            .map_err(|_| CallError::CallHungUp)?;

        done_rx.await.map_err(|_| CallError::CallHungUp)?
    }

    /// Block until the user finishes a turn, per the configured transcript
    /// timeout.
    async fn listen_turn(&self, record: &Arc<CallRecord>) -> CallResult<String> {
        record.set_state(CallState::Listening);
        let stt = record
            .stt()
            .ok_or_else(|| CallError::TranscriptionError("no transcription session".to_string()))?;

        let wait = Duration::from_millis(self.config.transcript_timeout_ms);
        let result = stt.wait_for_transcript(wait).await;

        if let Ok(text) = &result {
            record.log_line(Speaker::User, text);
        }
        if !record.hung_up() {
            record.set_state(CallState::Idle);
        }
        result
    }

    /// A turn that failed because the far side hung up releases the call's
    /// resources immediately; other failures leave the call usable.
    async fn reap_if_hung_up<T>(&self, record: &Arc<CallRecord>, result: &CallResult<T>) {
        if matches!(result, Err(CallError::CallHungUp)) {
            self.teardown(record).await;
        }
    }

    async fn teardown(&self, record: &Arc<CallRecord>) {
        if let Some(stt) = record.take_stt() {
            stt.close().await;
        }
        record.close_media_channel();
        self.registry.remove(&record.call_id);
    }
}
