//! Realtime speech-to-text session against the speech service.
//!
//! One session lives for the duration of a call. Audio flows in as μ-law
//! frames; final transcripts come out one per user turn, delimited by
//! server-side voice activity detection.

mod client;
mod messages;

pub use client::{PartialCallback, SttConfig, TranscriptionSession};
pub use messages::RealtimeEvent;
