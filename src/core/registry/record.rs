//! Mutable per-call state.
//!
//! A `CallRecord` is shared between the orchestrator, the webhook handler
//! and the media pump, all keyed by `call_id`; there are no back-pointers.
//! Everything mutable sits behind interior mutability so the record can be
//! read from any task. `hung_up` is monotonic: it only ever flips to true.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use tokio::sync::{Notify, mpsc};
use tracing::debug;

use crate::core::pump::OutboundUtterance;
use crate::core::transcribe::TranscriptionSession;
use crate::errors::call_error::{CallError, CallResult};

/// Per-call state machine position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    Creating,
    Dialing,
    Streaming,
    Idle,
    Speaking,
    Listening,
    Closing,
    Closed,
}

/// Who said a transcript line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Speaker {
    Agent,
    User,
}

pub struct CallRecord {
    pub call_id: String,
    pub user_number: String,
    /// Token binding the carrier media WebSocket to this call.
    pub media_token: String,
    started: Instant,

    state: RwLock<CallState>,
    carrier_call_id: RwLock<Option<String>>,
    stream_sid: RwLock<Option<String>>,
    streaming_ready: AtomicBool,
    ws_bound: AtomicBool,
    hung_up: AtomicBool,

    /// Ordered conversation log; observability only, never surfaced whole.
    transcript_log: Mutex<Vec<(Speaker, String)>>,

    /// Serializes speak/listen so a call is always half-duplex.
    pub turn_lock: tokio::sync::Mutex<()>,

    connect_notify: Notify,
    media_tx: RwLock<Option<mpsc::Sender<OutboundUtterance>>>,
    stt: RwLock<Option<Arc<TranscriptionSession>>>,
}

impl CallRecord {
    pub fn new(call_id: String, user_number: String, media_token: String) -> Self {
        Self {
            call_id,
            user_number,
            media_token,
            started: Instant::now(),
            state: RwLock::new(CallState::Creating),
            carrier_call_id: RwLock::new(None),
            stream_sid: RwLock::new(None),
            streaming_ready: AtomicBool::new(false),
            ws_bound: AtomicBool::new(false),
            hung_up: AtomicBool::new(false),
            transcript_log: Mutex::new(Vec::new()),
            turn_lock: tokio::sync::Mutex::new(()),
            connect_notify: Notify::new(),
            media_tx: RwLock::new(None),
            stt: RwLock::new(None),
        }
    }

    pub fn state(&self) -> CallState {
        *self.state.read()
    }

    pub fn set_state(&self, state: CallState) {
        debug!(call_id = %self.call_id, ?state, "Call state");
        *self.state.write() = state;
    }

    pub fn carrier_call_id(&self) -> Option<String> {
        self.carrier_call_id.read().clone()
    }

    pub fn set_carrier_call_id(&self, id: String) {
        *self.carrier_call_id.write() = Some(id);
    }

    pub fn stream_sid(&self) -> Option<String> {
        self.stream_sid.read().clone()
    }

    /// Record the stream sid from a `start` control frame and wake the
    /// connection waiter.
    pub fn set_stream_sid(&self, sid: String) {
        *self.stream_sid.write() = Some(sid);
        self.connect_notify.notify_waiters();
    }

    /// Variant T reports streaming readiness over the webhook channel.
    pub fn mark_streaming_ready(&self) {
        self.streaming_ready.store(true, Ordering::Release);
        self.connect_notify.notify_waiters();
    }

    pub fn streaming_ready(&self) -> bool {
        self.streaming_ready.load(Ordering::Acquire)
    }

    pub fn hung_up(&self) -> bool {
        self.hung_up.load(Ordering::Acquire)
    }

    /// Flip the monotonic hangup flag, move to `Closing`, and wake both the
    /// connection waiter and any pending transcript wait.
    pub fn mark_hung_up(&self) {
        if self.hung_up.swap(true, Ordering::AcqRel) {
            return;
        }
        if self.state() != CallState::Closed {
            self.set_state(CallState::Closing);
        }
        if let Some(stt) = self.stt() {
            stt.notify_hangup();
        }
        self.connect_notify.notify_waiters();
    }

    /// Bind the carrier media channel once the WebSocket is accepted.
    pub fn bind_media_channel(&self, tx: mpsc::Sender<OutboundUtterance>) {
        *self.media_tx.write() = Some(tx);
        self.ws_bound.store(true, Ordering::Release);
        self.connect_notify.notify_waiters();
    }

    /// Drop the media sender; the pump's writer closes the socket when the
    /// channel drains.
    pub fn close_media_channel(&self) {
        *self.media_tx.write() = None;
    }

    pub fn media_sender(&self) -> Option<mpsc::Sender<OutboundUtterance>> {
        self.media_tx.read().clone()
    }

    pub fn attach_stt(&self, session: Arc<TranscriptionSession>) {
        *self.stt.write() = Some(session);
    }

    pub fn stt(&self) -> Option<Arc<TranscriptionSession>> {
        self.stt.read().clone()
    }

    pub fn take_stt(&self) -> Option<Arc<TranscriptionSession>> {
        self.stt.write().take()
    }

    /// True once the media path is usable: the WebSocket is bound and the
    /// carrier has either assigned a stream sid or confirmed streaming.
    pub fn media_ready(&self) -> bool {
        self.ws_bound.load(Ordering::Acquire)
            && (self.stream_sid.read().is_some() || self.streaming_ready())
    }

    /// Wait until the media path is ready, the call hangs up, or the
    /// deadline passes.
    pub async fn wait_until_media_ready(&self, timeout: Duration) -> CallResult<()> {
        let deadline = tokio::time::Instant::now() + timeout;
        let mut notified = std::pin::pin!(self.connect_notify.notified());
        loop {
            // Register interest before checking so a notify between the
            // check and the await cannot be lost.
            notified.as_mut().enable();
            if self.hung_up() {
                return Err(CallError::CallHungUp);
            }
            if self.media_ready() {
                return Ok(());
            }
            if tokio::time::timeout_at(deadline, notified.as_mut())
                .await
                .is_err()
            {
                return Err(CallError::CallTimeout);
            }
            notified.set(self.connect_notify.notified());
        }
    }

    pub fn log_line(&self, speaker: Speaker, text: &str) {
        self.transcript_log
            .lock()
            .push((speaker, text.to_string()));
    }

    pub fn transcript_log(&self) -> Vec<(Speaker, String)> {
        self.transcript_log.lock().clone()
    }

    pub fn elapsed_secs(&self) -> u64 {
        self.started.elapsed().as_secs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> CallRecord {
        CallRecord::new(
            "call-0-1700000000".to_string(),
            "+15559876543".to_string(),
            "tok-1".to_string(),
        )
    }

    #[test]
    fn test_hung_up_is_monotonic() {
        let rec = record();
        assert!(!rec.hung_up());
        rec.mark_hung_up();
        assert!(rec.hung_up());
        // A second hangup is a no-op, the flag never flips back
        rec.mark_hung_up();
        assert!(rec.hung_up());
        assert_eq!(rec.state(), CallState::Closing);
    }

    #[test]
    fn test_media_ready_requires_ws_and_stream() {
        let rec = record();
        assert!(!rec.media_ready());

        let (tx, _rx) = mpsc::channel(1);
        rec.bind_media_channel(tx);
        assert!(!rec.media_ready(), "WS alone is not enough");

        rec.set_stream_sid("MZ123".to_string());
        assert!(rec.media_ready());
        assert_eq!(rec.stream_sid().as_deref(), Some("MZ123"));
    }

    #[test]
    fn test_media_ready_via_streaming_ready() {
        let rec = record();
        let (tx, _rx) = mpsc::channel(1);
        rec.bind_media_channel(tx);
        rec.mark_streaming_ready();
        assert!(rec.media_ready(), "streaming.started also completes the path");
    }

    #[tokio::test]
    async fn test_wait_until_media_ready_times_out() {
        let rec = record();
        assert!(matches!(
            rec.wait_until_media_ready(Duration::from_millis(30)).await,
            Err(CallError::CallTimeout)
        ));
    }

    #[tokio::test]
    async fn test_wait_until_media_ready_wakes_on_bind() {
        let rec = Arc::new(record());
        let waiter = {
            let rec = rec.clone();
            tokio::spawn(async move { rec.wait_until_media_ready(Duration::from_secs(5)).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        let (tx, _rx) = mpsc::channel(1);
        rec.bind_media_channel(tx);
        rec.set_stream_sid("MZ1".to_string());

        assert!(waiter.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_wait_until_media_ready_fails_on_hangup() {
        let rec = Arc::new(record());
        let waiter = {
            let rec = rec.clone();
            tokio::spawn(async move { rec.wait_until_media_ready(Duration::from_secs(5)).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        rec.mark_hung_up();

        assert!(matches!(
            waiter.await.unwrap(),
            Err(CallError::CallHungUp)
        ));
    }

    #[test]
    fn test_transcript_log_orders_lines() {
        let rec = record();
        rec.log_line(Speaker::Agent, "Hello.");
        rec.log_line(Speaker::User, "Go ahead.");
        let log = rec.transcript_log();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0], (Speaker::Agent, "Hello.".to_string()));
        assert_eq!(log[1], (Speaker::User, "Go ahead.".to_string()));
    }
}
