//! Binary wire codec for tunnel frames.
//!
//! # Responsibilities
//! - Define the `Frame`/`Request`/`Response` types exchanged over the websocket
//! - Encode/decode frames with a stable binary schema
//! - Reject oversized or malformed frames at the decode boundary
//!
//! # Design Decisions
//! - Bincode with fixint encoding: both sides compile from the same types,
//!   so a serde-derived schema is stable without a separate IDL
//! - Deserialization is size-bounded; a peer cannot make us allocate
//!   unboundedly from a short prefix
//! - The payload is a tagged enum: a decoded frame unambiguously carries
//!   either a request or a response, and unknown tags fail the decode

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use bincode::Options;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Largest frame either side will decode. Covers the body plus headers with
/// room to spare; anything bigger kills the session.
pub const MAX_FRAME_SIZE: u64 = 64 * 1024 * 1024;

/// A correlated exchange travelling over the tunnel websocket.
///
/// `message_id` ties exactly one request to exactly one response. It is
/// generated by the relay server before the request frame is sent downstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    pub message_id: String,
    pub payload: Payload,
}

/// Frame payload. The server only ever sends `Request` and only ever expects
/// `Response` back; the client mirrors that.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Payload {
    Request(Request),
    Response(Response),
}

/// An external HTTP request, flattened for transport to the downstream client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    /// Mirrors the enclosing frame's `message_id` so the client can key its
    /// traffic log by the same id the server correlates on.
    pub id: String,
    pub method: String,
    /// Path plus query string, e.g. `/api/items?page=2`.
    pub path: String,
    pub body: Vec<u8>,
    /// Cookie pairs joined as `name=value; `, the shape of a `Cookie` header.
    pub cookies: String,
    pub headers: HashMap<String, String>,
    /// Unix milliseconds at frame construction.
    pub timestamp: i64,
}

/// The local upstream's answer, flattened for transport back to the server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub id: String,
    pub status_code: i32,
    pub body: Vec<u8>,
    /// Multi-valued headers are comma-joined per name.
    pub headers: HashMap<String, String>,
    /// Unix milliseconds at response receipt.
    pub timestamp: i64,
}

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("frame encode failed: {0}")]
    Encode(bincode::Error),
    #[error("frame decode failed: {0}")]
    Decode(bincode::Error),
}

fn bincode_options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_limit(MAX_FRAME_SIZE)
        .with_fixint_encoding()
}

/// Encode a frame for a binary websocket message.
pub fn encode(frame: &Frame) -> Result<Vec<u8>, CodecError> {
    bincode_options().serialize(frame).map_err(CodecError::Encode)
}

/// Decode a binary websocket message into a frame.
///
/// Any failure here is fatal to the session that produced the bytes.
pub fn decode(bytes: &[u8]) -> Result<Frame, CodecError> {
    bincode_options().deserialize(bytes).map_err(CodecError::Decode)
}

/// Current wall clock as Unix milliseconds, the timestamp unit used across
/// frames and the traffic log.
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
