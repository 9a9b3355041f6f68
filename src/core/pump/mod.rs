//! Per-call media pump.
//!
//! Shuttles audio between the carrier WebSocket and the transcription
//! session for the lifetime of a call. Outbound utterances arrive whole,
//! get split into 20 ms frames and paced onto the socket; inbound frames
//! are demultiplexed into audio (forwarded to the transcription session)
//! and control messages (`start`, `stop`, `connected`, `mark`).

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use bytes::Bytes;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::audio::{FRAME_BYTES, extract_inbound_audio, make_media_message, parse_control};
use crate::core::registry::CallRecord;
use crate::errors::call_error::{CallError, CallResult};

/// Pacing between outbound frames. Slightly under the 20 ms of audio each
/// frame carries, so the carrier-side jitter buffer never runs dry.
pub const FRAME_INTERVAL: Duration = Duration::from_millis(18);

/// Grace after the last frame so the carrier can flush its buffer.
pub const FLUSH_TAIL: Duration = Duration::from_millis(200);

/// One whole utterance of μ-law audio, acknowledged when fully paced out.
pub struct OutboundUtterance {
    pub audio: Bytes,
    pub done: oneshot::Sender<CallResult<()>>,
}

/// Run the pump until the carrier closes the socket or the outbound
/// channel is dropped. The caller owns the socket; this function owns both
/// halves for the duration of the call.
pub async fn run(
    socket: WebSocket,
    record: Arc<CallRecord>,
    mut outbound_rx: mpsc::Receiver<OutboundUtterance>,
) {
    let (mut sink, mut stream) = socket.split();

    // Writer task: the single writer on the carrier socket.
    let writer_record = record.clone();
    let writer = tokio::spawn(async move {
        while let Some(utterance) = outbound_rx.recv().await {
            let result = send_utterance(&mut sink, &writer_record, &utterance.audio).await;
            let failed = result.is_err();
            let _ = utterance.done.send(result);
            if failed {
                break;
            }
        }
        // Channel closed: the call is over, close our half of the socket.
        let _ = sink.send(Message::Close(None)).await;
    });

    // Reader loop: the single reader on the carrier socket.
    while let Some(message) = stream.next().await {
        match message {
            Ok(Message::Text(text)) => handle_frame(text.as_bytes(), &record).await,
            Ok(Message::Close(frame)) => {
                debug!(call_id = %record.call_id, "Carrier closed media stream: {frame:?}");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                warn!(call_id = %record.call_id, "Media stream error: {e}");
                break;
            }
        }
    }

    record.mark_hung_up();
    writer.abort();
    info!(call_id = %record.call_id, "Media pump stopped");
}

async fn send_utterance(
    sink: &mut SplitSink<WebSocket, Message>,
    record: &Arc<CallRecord>,
    audio: &[u8],
) -> CallResult<()> {
    let mut chunks = audio.chunks(FRAME_BYTES).peekable();
    while let Some(chunk) = chunks.next() {
        let stream_sid = record.stream_sid();
        let frame = make_media_message(chunk, stream_sid.as_deref());
        sink.send(Message::Text(frame.into()))
            .await
            .map_err(|e| CallError::NetworkError(format!("media send failed: {e}")))?;
        if chunks.peek().is_some() {
            tokio::time::sleep(FRAME_INTERVAL).await;
        }
    }
    tokio::time::sleep(FLUSH_TAIL).await;
    Ok(())
}

async fn handle_frame(raw: &[u8], record: &Arc<CallRecord>) {
    if let Some(audio) = extract_inbound_audio(raw) {
        if let Some(stt) = record.stt()
            && let Err(e) = stt.send_audio(Bytes::from(audio)).await
        {
            warn!(call_id = %record.call_id, "Dropping inbound audio: {e}");
        }
        return;
    }

    match parse_control(raw) {
        Some(control) => match control.event.as_str() {
            "start" => {
                if let Some(sid) = control.stream_sid {
                    info!(call_id = %record.call_id, stream_sid = %sid, "Media stream started");
                    record.set_stream_sid(sid);
                }
            }
            "stop" => {
                info!(call_id = %record.call_id, "Carrier signaled stop");
                record.mark_hung_up();
            }
            "connected" | "mark" => debug!(event = %control.event, "Control frame"),
            other => debug!(event = %other, "Unhandled control frame"),
        },
        None => debug!(call_id = %record.call_id, "Unparseable media frame"),
    }
}
