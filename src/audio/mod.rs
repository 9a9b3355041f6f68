//! Audio codec primitives for the telephony leg.
//!
//! Everything in here is a pure function: G.711 μ-law encoding, 24 kHz to
//! 8 kHz decimation, and the JSON media-frame plumbing used on the carrier
//! WebSocket.

mod frames;
mod mulaw;

pub use frames::{ControlFrame, FRAME_BYTES, extract_inbound_audio, make_media_message, parse_control};
pub use mulaw::{pcm16_to_mulaw, resample_24k_to_8k};
