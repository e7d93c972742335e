//! Length-prefixed frame encoding and decoding.
//!
//! Every message on the wire is `~m~{len}~m~{body}`. A single WebSocket text
//! message may carry several frames back to back. Heartbeats are frames whose
//! body is `~h~{n}`; they are not JSON and must be echoed unchanged.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use tracing::debug;

use crate::Result;
use crate::models::{Call, Packet};

static FRAME_HEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"~m~\d+~m~").expect("static pattern"));

static HEARTBEAT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^~m~\d+~m~~h~\d+$").expect("static pattern"));

/// Wraps `body` in a frame header. The length is the body's character count.
pub fn frame(body: &str) -> String {
    format!("~m~{}~m~{}", body.chars().count(), body)
}

/// Serializes a call as compact `{"m":..,"p":..}` JSON.
///
/// # Errors
///
/// Returns [`TvFeedError::Json`](crate::TvFeedError::Json) if a parameter
/// cannot be serialized.
pub fn build_call(method: &str, params: &[Value]) -> Result<String> {
    let call = Call {
        m: method,
        p: params,
    };
    Ok(serde_json::to_string(&call)?)
}

/// Builds a complete framed call ready to send.
///
/// # Errors
///
/// See [`build_call`].
pub fn encode_call(method: &str, params: &[Value]) -> Result<String> {
    Ok(frame(&build_call(method, params)?))
}

/// Splits a raw socket message into frame bodies, in order, dropping empty
/// fragments. Text with no frame header yields nothing.
pub fn deframe(raw: &str) -> Vec<&str> {
    if !FRAME_HEADER.is_match(raw) {
        return Vec::new();
    }
    FRAME_HEADER
        .split(raw)
        .filter(|part| !part.is_empty())
        .collect()
}

/// Returns `true` if `raw` is a heartbeat frame.
pub fn is_heartbeat(raw: &str) -> bool {
    HEARTBEAT.is_match(raw)
}

/// Decodes a raw socket message into packets.
///
/// A heartbeat becomes a single [`Packet::Heartbeat`] carrying the raw text.
/// Fragments that are not valid JSON are skipped.
pub fn decode_message(raw: &str) -> Vec<Packet> {
    if is_heartbeat(raw) {
        return vec![Packet::Heartbeat(raw.to_string())];
    }

    deframe(raw)
        .into_iter()
        .filter_map(|part| match serde_json::from_str::<Value>(part) {
            Ok(value) => Some(Packet::from_value(value)),
            Err(_) => {
                let preview: String = part.chars().take(80).collect();
                debug!(fragment = %preview, "Non-JSON fragment skipped");
                None
            }
        })
        .collect()
}
