//! HTTP and WebSocket request handlers
//!
//! - `health` - Health check endpoint
//! - `webhook` - Carrier webhook endpoint (`POST /twiml`)
//! - `media_ws` - Carrier media WebSocket endpoint (`GET /media-stream`)

pub mod health;
pub mod media_ws;
pub mod webhook;
