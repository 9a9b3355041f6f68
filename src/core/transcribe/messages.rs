//! Wire messages for the realtime transcription WebSocket.

use base64::prelude::*;
use serde_json::{Value, json};

/// Session configuration sent immediately after the socket opens: μ-law
/// input and server-side voice activity detection with the configured
/// silence window.
pub fn session_update(model: &str, silence_ms: u64) -> String {
    json!({
        "type": "transcription_session.update",
        "session": {
            "input_audio_format": "g711_ulaw",
            "input_audio_transcription": { "model": model },
            "turn_detection": {
                "type": "server_vad",
                "threshold": 0.5,
                "prefix_padding_ms": 300,
                "silence_duration_ms": silence_ms,
            },
        },
    })
    .to_string()
}

/// Append a chunk of μ-law audio to the service-side input buffer.
pub fn audio_append(ulaw: &[u8]) -> String {
    json!({
        "type": "input_audio_buffer.append",
        "audio": BASE64_STANDARD.encode(ulaw),
    })
    .to_string()
}

/// Messages received from the transcription service, dispatched by `type`.
#[derive(Debug, Clone, PartialEq)]
pub enum RealtimeEvent {
    SessionCreated,
    TranscriptCompleted { transcript: String },
    TranscriptFailed { message: String },
    TranscriptDelta { delta: String },
    SpeechStarted,
    SpeechStopped,
    Error { message: String },
    Unknown { event_type: String },
}

impl RealtimeEvent {
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        let value: Value = serde_json::from_str(text)?;
        let event_type = value["type"].as_str().unwrap_or_default();

        Ok(match event_type {
            "transcription_session.created" | "session.created" => RealtimeEvent::SessionCreated,
            "conversation.item.input_audio_transcription.completed" => {
                RealtimeEvent::TranscriptCompleted {
                    transcript: value["transcript"].as_str().unwrap_or_default().to_string(),
                }
            }
            "conversation.item.input_audio_transcription.failed" => {
                RealtimeEvent::TranscriptFailed {
                    message: value["error"]["message"]
                        .as_str()
                        .unwrap_or("transcription failed")
                        .to_string(),
                }
            }
            "conversation.item.input_audio_transcription.delta" => RealtimeEvent::TranscriptDelta {
                delta: value["delta"].as_str().unwrap_or_default().to_string(),
            },
            "input_audio_buffer.speech_started" => RealtimeEvent::SpeechStarted,
            "input_audio_buffer.speech_stopped" => RealtimeEvent::SpeechStopped,
            "error" => RealtimeEvent::Error {
                message: value["error"]["message"]
                    .as_str()
                    .unwrap_or("unknown error")
                    .to_string(),
            },
            other => RealtimeEvent::Unknown {
                event_type: other.to_string(),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_update_shape() {
        let msg = session_update("gpt-4o-transcribe", 800);
        let v: Value = serde_json::from_str(&msg).unwrap();
        assert_eq!(v["type"], "transcription_session.update");
        assert_eq!(v["session"]["input_audio_format"], "g711_ulaw");
        assert_eq!(v["session"]["turn_detection"]["type"], "server_vad");
        assert_eq!(v["session"]["turn_detection"]["threshold"], 0.5);
        assert_eq!(v["session"]["turn_detection"]["prefix_padding_ms"], 300);
        assert_eq!(v["session"]["turn_detection"]["silence_duration_ms"], 800);
        assert_eq!(
            v["session"]["input_audio_transcription"]["model"],
            "gpt-4o-transcribe"
        );
    }

    #[test]
    fn test_audio_append_encodes_base64() {
        let msg = audio_append(&[0xFF, 0x7F, 0x00]);
        let v: Value = serde_json::from_str(&msg).unwrap();
        assert_eq!(v["type"], "input_audio_buffer.append");
        let decoded = BASE64_STANDARD
            .decode(v["audio"].as_str().unwrap())
            .unwrap();
        assert_eq!(decoded, vec![0xFF, 0x7F, 0x00]);
    }

    #[test]
    fn test_parse_transcript_completed() {
        let event = RealtimeEvent::parse(
            r#"{"type":"conversation.item.input_audio_transcription.completed","transcript":"Go ahead."}"#,
        )
        .unwrap();
        assert_eq!(
            event,
            RealtimeEvent::TranscriptCompleted {
                transcript: "Go ahead.".to_string()
            }
        );
    }

    #[test]
    fn test_parse_transcript_failed() {
        let event = RealtimeEvent::parse(
            r#"{"type":"conversation.item.input_audio_transcription.failed","error":{"message":"audio too short"}}"#,
        )
        .unwrap();
        assert_eq!(
            event,
            RealtimeEvent::TranscriptFailed {
                message: "audio too short".to_string()
            }
        );
    }

    #[test]
    fn test_parse_speech_markers_and_unknown() {
        assert_eq!(
            RealtimeEvent::parse(r#"{"type":"input_audio_buffer.speech_started"}"#).unwrap(),
            RealtimeEvent::SpeechStarted
        );
        assert_eq!(
            RealtimeEvent::parse(r#"{"type":"input_audio_buffer.speech_stopped"}"#).unwrap(),
            RealtimeEvent::SpeechStopped
        );
        assert_eq!(
            RealtimeEvent::parse(r#"{"type":"rate_limits.updated"}"#).unwrap(),
            RealtimeEvent::Unknown {
                event_type: "rate_limits.updated".to_string()
            }
        );
        assert!(RealtimeEvent::parse("not json").is_err());
    }
}
