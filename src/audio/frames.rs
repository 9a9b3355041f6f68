//! Carrier media-frame plumbing.
//!
//! The carrier WebSocket carries JSON text frames in both directions. Media
//! frames wrap base64 μ-law payloads; everything else on the socket is a
//! small control message (`start`, `stop`, `connected`, `mark`).

use base64::prelude::*;
use serde::Deserialize;
use serde_json::json;

/// One outbound media frame: 20 ms of 8 kHz mono μ-law audio.
pub const FRAME_BYTES: usize = 160;

#[derive(Debug, Deserialize)]
struct InboundMedia {
    #[serde(default)]
    track: Option<String>,
    #[serde(default)]
    payload: Option<String>,
}

#[derive(Debug, Deserialize)]
struct InboundFrame {
    #[serde(default)]
    media: Option<InboundMedia>,
}

/// Non-media control message on the carrier WebSocket.
#[derive(Debug, Deserialize)]
pub struct ControlFrame {
    pub event: String,
    #[serde(rename = "streamSid")]
    pub stream_sid: Option<String>,
}

/// Pull the inbound-track audio out of a carrier frame.
///
/// Returns `None` for non-JSON input, frames without a media object, frames
/// whose track is not `"inbound"`, and undecodable payloads. None of those
/// are errors; the caller falls back to control-message handling.
pub fn extract_inbound_audio(msg: &[u8]) -> Option<Vec<u8>> {
    let frame: InboundFrame = serde_json::from_slice(msg).ok()?;
    let media = frame.media?;
    if media.track.as_deref() != Some("inbound") {
        return None;
    }
    BASE64_STANDARD.decode(media.payload?).ok()
}

/// Build an outbound media frame, echoing the stream sid when one is known.
pub fn make_media_message(audio: &[u8], stream_sid: Option<&str>) -> String {
    let mut msg = json!({
        "event": "media",
        "media": { "payload": BASE64_STANDARD.encode(audio) },
    });
    if let Some(sid) = stream_sid {
        msg["streamSid"] = json!(sid);
    }
    msg.to_string()
}

/// Parse a carrier control message. `None` means the frame was not JSON.
pub fn parse_control(msg: &[u8]) -> Option<ControlFrame> {
    serde_json::from_slice(msg).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inject_track(msg: &str, track: &str) -> String {
        let mut v: serde_json::Value = serde_json::from_str(msg).unwrap();
        v["media"]["track"] = json!(track);
        v.to_string()
    }

    #[test]
    fn test_media_roundtrip_inbound_track() {
        let audio: Vec<u8> = (0..160).map(|i| i as u8).collect();
        let msg = inject_track(&make_media_message(&audio, None), "inbound");
        assert_eq!(extract_inbound_audio(msg.as_bytes()).unwrap(), audio);
    }

    #[test]
    fn test_media_roundtrip_other_track_ignored() {
        let audio = vec![1u8, 2, 3];
        let outbound = inject_track(&make_media_message(&audio, None), "outbound");
        assert!(extract_inbound_audio(outbound.as_bytes()).is_none());

        // No track at all
        let untagged = make_media_message(&audio, None);
        assert!(extract_inbound_audio(untagged.as_bytes()).is_none());
    }

    #[test]
    fn test_extract_tolerates_garbage() {
        assert!(extract_inbound_audio(b"not json at all").is_none());
        assert!(extract_inbound_audio(b"{}").is_none());
        assert!(extract_inbound_audio(br#"{"media":{"track":"inbound","payload":"%%%"}}"#).is_none());
    }

    #[test]
    fn test_make_media_message_stream_sid() {
        let with_sid = make_media_message(&[0u8; 4], Some("MZ123"));
        let v: serde_json::Value = serde_json::from_str(&with_sid).unwrap();
        assert_eq!(v["event"], "media");
        assert_eq!(v["streamSid"], "MZ123");

        let without: serde_json::Value =
            serde_json::from_str(&make_media_message(&[0u8; 4], None)).unwrap();
        assert!(without.get("streamSid").is_none());
    }

    #[test]
    fn test_parse_control_frames() {
        let start = parse_control(br#"{"event":"start","streamSid":"MZ123"}"#).unwrap();
        assert_eq!(start.event, "start");
        assert_eq!(start.stream_sid.as_deref(), Some("MZ123"));

        let stop = parse_control(br#"{"event":"stop"}"#).unwrap();
        assert_eq!(stop.event, "stop");
        assert!(stop.stream_sid.is_none());

        assert!(parse_control(b"\x01\x02").is_none());
    }
}
