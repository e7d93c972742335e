//! Typed models for the vendor streaming protocol.
//!
//! Contains the outgoing call shape, the [`Packet`] tagged union every
//! incoming fragment is decoded into, and re-exports of the candle, quote
//! and response envelope types.

pub mod candle;
pub mod quote;
pub mod response;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use candle::SeriesEntry;
use quote::QuoteValues;

/// Series id the chart session publishes OHLCV candles under.
pub const SERIES_ID: &str = "sds_1";

/// Incoming method names consumed by the demultiplexer.
pub enum Method {
    /// OHLCV snapshot for a chart series.
    TimescaleUpdate,
    /// Indicator study data update (wire name: `"du"`).
    DataUpdate,
    /// Quote session delta (wire name: `"qsd"`).
    QuoteSessionData,
}

impl Method {
    /// Returns the wire-format method name sent by the vendor.
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::TimescaleUpdate => "timescale_update",
            Method::DataUpdate => "du",
            Method::QuoteSessionData => "qsd",
        }
    }
}

/// An outgoing remote call, serialized as `{"m": method, "p": params}`.
#[derive(Serialize)]
pub struct Call<'a> {
    pub m: &'a str,
    pub p: &'a [Value],
}

/// One decoded packet from a demultiplexed frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    /// Candles for [`SERIES_ID`], in the order the vendor sent them.
    TimescaleUpdate(Vec<SeriesEntry>),
    /// Per-study indicator arrays.
    StudyUpdate(Vec<StudySeries>),
    /// Latest quote snapshot for one symbol.
    QuoteDelta(QuoteDelta),
    /// Keep-alive frame, carried verbatim so it can be echoed.
    Heartbeat(String),
    /// Any other packet; holds the `m` field when present.
    Unknown(Option<String>),
}

/// Data points published for one study id inside a `du` packet.
#[derive(Debug, Clone, PartialEq)]
pub struct StudySeries {
    pub study_id: String,
    pub entries: Vec<SeriesEntry>,
}

/// Payload of a `qsd` packet.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct QuoteDelta {
    /// Fully qualified symbol (`EXCHANGE:SYMBOL`).
    #[serde(rename = "n", default)]
    pub name: Option<String>,
    /// Vendor status flag, `"ok"` on success.
    #[serde(rename = "s", default)]
    pub status: Option<String>,
    #[serde(rename = "v", default)]
    pub values: QuoteValues,
}

impl Packet {
    /// Decodes a parsed JSON fragment into a [`Packet`], routing on its `m`
    /// field.
    ///
    /// Shapes that do not match the expected layout for their method decode
    /// to an empty payload rather than failing.
    pub fn from_value(value: Value) -> Self {
        let method = value.get("m").and_then(Value::as_str).map(String::from);
        let body = value.get("p").and_then(|p| p.get(1));

        match method.as_deref() {
            Some(m) if m == Method::TimescaleUpdate.as_str() => {
                let entries = body
                    .and_then(|b| b.get(SERIES_ID))
                    .and_then(|s| s.get("s"))
                    .map(parse_entries)
                    .unwrap_or_default();
                Packet::TimescaleUpdate(entries)
            }
            Some(m) if m == Method::DataUpdate.as_str() => {
                let mut studies = Vec::new();
                if let Some(map) = body.and_then(Value::as_object) {
                    for (key, val) in map {
                        if let Some(st) = val.get("st") {
                            studies.push(StudySeries {
                                study_id: key.clone(),
                                entries: parse_entries(st),
                            });
                        }
                    }
                }
                Packet::StudyUpdate(studies)
            }
            Some(m) if m == Method::QuoteSessionData.as_str() => {
                match body.filter(|b| b.is_object()).cloned() {
                    Some(b) => match serde_json::from_value::<QuoteDelta>(b) {
                        Ok(delta) => Packet::QuoteDelta(delta),
                        Err(e) => {
                            debug!(error = %e, "Unreadable quote delta");
                            Packet::Unknown(method)
                        }
                    },
                    None => Packet::Unknown(method),
                }
            }
            _ => Packet::Unknown(method),
        }
    }
}

/// Parses an array of `{i, v}` entries, dropping any that do not fit.
fn parse_entries(array: &Value) -> Vec<SeriesEntry> {
    let Some(items) = array.as_array() else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| match serde_json::from_value(item.clone()) {
            Ok(entry) => Some(entry),
            Err(e) => {
                debug!(error = %e, "Skipping malformed series entry");
                None
            }
        })
        .collect()
}
