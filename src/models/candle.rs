//! OHLCV candle and indicator point models.

use std::collections::BTreeMap;

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

/// One `{i, v}` entry of a vendor series array.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SeriesEntry {
    /// Vendor-assigned position within the series.
    pub i: i64,
    /// `[timestamp, value0, value1, ...]`.
    pub v: Vec<f64>,
}

/// A single OHLCV candlestick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ohlcv {
    pub index: i64,
    /// Candle open time in Unix seconds.
    pub timestamp: f64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    /// Only present when the vendor sent a sixth value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<f64>,
}

impl Ohlcv {
    /// Builds a candle from a series entry, or `None` if the entry carries
    /// fewer than five values.
    pub fn from_entry(entry: &SeriesEntry) -> Option<Self> {
        let v = &entry.v;
        if v.len() < 5 {
            return None;
        }
        Some(Self {
            index: entry.i,
            timestamp: v[0],
            open: v[1],
            high: v[2],
            low: v[3],
            close: v[4],
            volume: v.get(5).copied(),
        })
    }
}

/// One indicator data point.
///
/// Serializes as `{"index": .., "timestamp": .., "0": v0, "1": v1, ...}`.
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorPoint {
    pub index: i64,
    pub timestamp: f64,
    pub values: Vec<f64>,
}

impl IndicatorPoint {
    /// Builds a point from a series entry, or `None` if it has no timestamp.
    pub fn from_entry(entry: &SeriesEntry) -> Option<Self> {
        let (timestamp, values) = entry.v.split_first()?;
        Some(Self {
            index: entry.i,
            timestamp: *timestamp,
            values: values.to_vec(),
        })
    }
}

impl Serialize for IndicatorPoint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len() + 2))?;
        map.serialize_entry("index", &self.index)?;
        map.serialize_entry("timestamp", &self.timestamp)?;
        for (i, value) in self.values.iter().enumerate() {
            map.serialize_entry(&i.to_string(), value)?;
        }
        map.end()
    }
}

/// Result of a candle fetch.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CandleData {
    pub ohlcv: Vec<Ohlcv>,
    /// Indicator points keyed by the caller's script id.
    pub indicators: BTreeMap<String, Vec<IndicatorPoint>>,
}
