//! Transcription session WebSocket client.
//!
//! A spawned connection task owns the socket; audio goes in through a
//! bounded channel, turn results come out through an unbounded one. Exactly
//! one `wait_for_transcript` may be outstanding at a time.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::sync::{Mutex, Notify, mpsc, oneshot};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::handshake::client::generate_key;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use tracing::{debug, error, info, warn};

use super::messages::{RealtimeEvent, audio_append, session_update};
use crate::errors::call_error::{CallError, CallResult};

pub const REALTIME_URL: &str = "wss://api.openai.com/v1/realtime?intent=transcription";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Type alias for the partial-hypothesis callback.
pub type PartialCallback = Arc<dyn Fn(String) + Send + Sync>;

/// Configuration for a transcription session.
#[derive(Debug, Clone)]
pub struct SttConfig {
    pub api_key: String,
    pub model: String,
    pub silence_ms: u64,
    pub url: String,
}

impl SttConfig {
    pub fn new(api_key: String, model: String, silence_ms: u64) -> Self {
        Self {
            api_key,
            model,
            silence_ms,
            url: REALTIME_URL.to_string(),
        }
    }
}

/// Outcome of one user turn, as delivered by the receive loop.
type TurnResult = CallResult<String>;

/// Live transcription session.
///
/// Single-writer: audio is forwarded frame-by-frame to the connection task.
/// Single-reader: the connection task is the only consumer of the socket.
pub struct TranscriptionSession {
    silence_ms: u64,
    audio_tx: mpsc::Sender<Bytes>,
    shutdown_tx: parking_lot::Mutex<Option<oneshot::Sender<()>>>,
    transcript_rx: Mutex<mpsc::UnboundedReceiver<TurnResult>>,
    connection_handle: parking_lot::Mutex<Option<tokio::task::JoinHandle<()>>>,
    hung_up: AtomicBool,
    hangup_notify: Notify,
}

impl TranscriptionSession {
    /// Open the WebSocket, configure the session, and wait for the service
    /// to acknowledge it.
    pub async fn connect(
        config: SttConfig,
        on_partial: Option<PartialCallback>,
    ) -> CallResult<Self> {
        let request = tokio_tungstenite::tungstenite::http::Request::builder()
            .method("GET")
            .uri(&config.url)
            .header("Host", "api.openai.com")
            .header("Upgrade", "websocket")
            .header("Connection", "upgrade")
            .header("Sec-WebSocket-Key", generate_key())
            .header("Sec-WebSocket-Version", "13")
            .header("Authorization", format!("Bearer {}", config.api_key))
            .header("OpenAI-Beta", "realtime=v1")
            .body(())
            .map_err(|e| {
                CallError::TranscriptionError(format!("failed to build WebSocket request: {e}"))
            })?;

        let (ws_stream, _response) = connect_async(request).await.map_err(|e| {
            CallError::TranscriptionError(format!("failed to connect to speech service: {e}"))
        })?;

        info!("Connected to transcription WebSocket");

        let (mut ws_sink, mut ws_stream) = ws_stream.split();

        // Configure μ-law input and server VAD before any audio flows.
        ws_sink
            .send(Message::Text(
                session_update(&config.model, config.silence_ms).into(),
            ))
            .await
            .map_err(|e| {
                CallError::TranscriptionError(format!("failed to configure session: {e}"))
            })?;

        let (audio_tx, mut audio_rx) = mpsc::channel::<Bytes>(32);
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let (result_tx, result_rx) = mpsc::unbounded_channel::<TurnResult>();
        let (connected_tx, connected_rx) = oneshot::channel::<()>();

        let connection_handle = tokio::spawn(async move {
            let mut connected_tx = Some(connected_tx);

            loop {
                tokio::select! {
                    // Forward μ-law audio to the service
                    Some(audio) = audio_rx.recv() => {
                        if let Err(e) = ws_sink.send(Message::Text(audio_append(&audio).into())).await {
                            let err = CallError::TranscriptionError(format!("failed to send audio: {e}"));
                            error!("{err}");
                            let _ = result_tx.send(Err(err));
                            break;
                        }
                        debug!("Sent {} bytes of audio to transcription", audio.len());
                    }

                    // Handle incoming messages
                    message = ws_stream.next() => {
                        match message {
                            Some(Ok(Message::Text(text))) => {
                                match RealtimeEvent::parse(&text) {
                                    Ok(RealtimeEvent::SessionCreated) => {
                                        if let Some(tx) = connected_tx.take() {
                                            let _ = tx.send(());
                                        }
                                    }
                                    Ok(RealtimeEvent::TranscriptCompleted { transcript }) => {
                                        info!(transcript = %transcript, "Final transcript");
                                        if result_tx.send(Ok(transcript)).is_err() {
                                            warn!("Failed to deliver transcript, channel closed");
                                        }
                                    }
                                    Ok(RealtimeEvent::TranscriptFailed { message })
                                    | Ok(RealtimeEvent::Error { message }) => {
                                        warn!(message = %message, "Transcription error from service");
                                        let _ = result_tx.send(Err(CallError::TranscriptionError(message)));
                                    }
                                    Ok(RealtimeEvent::TranscriptDelta { delta }) => {
                                        if let Some(cb) = &on_partial {
                                            cb(delta);
                                        }
                                    }
                                    Ok(RealtimeEvent::SpeechStarted) => debug!("Speech started"),
                                    Ok(RealtimeEvent::SpeechStopped) => debug!("Speech stopped"),
                                    Ok(RealtimeEvent::Unknown { event_type }) => {
                                        debug!(event_type = %event_type, "Unhandled realtime event");
                                    }
                                    Err(e) => warn!("Failed to parse realtime message: {e}"),
                                }
                            }
                            Some(Ok(Message::Close(frame))) => {
                                info!("Transcription WebSocket closed: {frame:?}");
                                break;
                            }
                            Some(Ok(_)) => debug!("Ignoring non-text realtime frame"),
                            Some(Err(e)) => {
                                let err = CallError::TranscriptionError(format!("WebSocket error: {e}"));
                                error!("{err}");
                                let _ = result_tx.send(Err(err));
                                break;
                            }
                            None => {
                                info!("Transcription WebSocket stream ended");
                                break;
                            }
                        }
                    }

                    // Handle shutdown signal
                    _ = &mut shutdown_rx => {
                        debug!("Shutting down transcription session");
                        let _ = ws_sink.send(Message::Close(None)).await;
                        break;
                    }
                }
            }
        });

        let session = Self {
            silence_ms: config.silence_ms,
            audio_tx,
            shutdown_tx: parking_lot::Mutex::new(Some(shutdown_tx)),
            transcript_rx: Mutex::new(result_rx),
            connection_handle: parking_lot::Mutex::new(Some(connection_handle)),
            hung_up: AtomicBool::new(false),
            hangup_notify: Notify::new(),
        };

        // Wait for the session acknowledgment before accepting audio.
        match timeout(CONNECT_TIMEOUT, connected_rx).await {
            Ok(Ok(())) => {
                info!("Transcription session established");
                Ok(session)
            }
            Ok(Err(_)) => {
                session.close().await;
                Err(CallError::TranscriptionError(
                    "connection closed before session was created".to_string(),
                ))
            }
            Err(_) => {
                session.close().await;
                Err(CallError::TranscriptionError(
                    "timed out waiting for session creation".to_string(),
                ))
            }
        }
    }

    /// Forward a chunk of μ-law audio to the service.
    pub async fn send_audio(&self, audio: Bytes) -> CallResult<()> {
        self.audio_tx
            .send(audio)
            .await
            .map_err(|_| CallError::TranscriptionError("session is closed".to_string()))
    }

    /// Default per-turn wait: ten silence windows.
    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.silence_ms * 10)
    }

    /// Wait for the next final transcript.
    ///
    /// Races the service against the given timeout and the hangup signal.
    /// A timeout leaves the socket open so a later turn can still succeed.
    /// Only one wait may be outstanding at a time.
    pub async fn wait_for_transcript(&self, wait: Duration) -> CallResult<String> {
        if wait.is_zero() {
            return Err(CallError::CallTimeout);
        }
        if self.hung_up.load(Ordering::Acquire) {
            return Err(CallError::CallHungUp);
        }

        let mut rx = self.transcript_rx.try_lock().map_err(|_| {
            CallError::TranscriptionError("a transcript wait is already in progress".to_string())
        })?;

        tokio::select! {
            result = rx.recv() => match result {
                Some(turn) => turn,
                None => Err(CallError::TranscriptionError(
                    "transcription stream ended".to_string(),
                )),
            },
            _ = self.hangup_notify.notified() => Err(CallError::CallHungUp),
            _ = tokio::time::sleep(wait) => Err(CallError::CallTimeout),
        }
    }

    /// Fail the pending (and any future) transcript wait with `CallHungUp`.
    pub fn notify_hangup(&self) {
        self.hung_up.store(true, Ordering::Release);
        self.hangup_notify.notify_one();
    }

    /// Close the socket and reap the connection task.
    pub async fn close(&self) {
        if let Some(tx) = self.shutdown_tx.lock().take() {
            let _ = tx.send(());
        }
        let handle = self.connection_handle.lock().take();
        if let Some(handle) = handle {
            let _ = timeout(CLOSE_TIMEOUT, handle).await;
        }
        debug!("Transcription session closed");
    }
}

impl Drop for TranscriptionSession {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.lock().take() {
            let _ = tx.send(());
        }
    }
}

#[cfg(test)]
impl TranscriptionSession {
    /// Session with no socket behind it, for exercising the wait semantics.
    fn detached(silence_ms: u64) -> (Self, mpsc::UnboundedSender<TurnResult>) {
        let (audio_tx, _audio_rx) = mpsc::channel(32);
        let (result_tx, result_rx) = mpsc::unbounded_channel();
        let session = Self {
            silence_ms,
            audio_tx,
            shutdown_tx: parking_lot::Mutex::new(None),
            transcript_rx: Mutex::new(result_rx),
            connection_handle: parking_lot::Mutex::new(None),
            hung_up: AtomicBool::new(false),
            hangup_notify: Notify::new(),
        };
        (session, result_tx)
    }
}
