//! Quote session models.

use serde::{Deserialize, Serialize};

/// The `v` object of a `qsd` packet. The vendor only sends fields that
/// changed, so every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct QuoteValues {
    pub exchange: Option<String>,
    pub short_name: Option<String>,
    /// Last traded price.
    pub lp: Option<f64>,
    pub volume: Option<f64>,
    /// Absolute change.
    pub ch: Option<f64>,
    /// Percentage change.
    pub chp: Option<f64>,
    pub high_price: Option<f64>,
    pub low_price: Option<f64>,
    pub open_price: Option<f64>,
    pub prev_close_price: Option<f64>,
    pub bid: Option<f64>,
    pub ask: Option<f64>,
}

/// A normalized live price update.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceUpdate {
    pub exchange: String,
    pub symbol: String,
    pub price: Option<f64>,
    pub volume: Option<f64>,
    pub change: Option<f64>,
    pub change_percent: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub open: Option<f64>,
    pub prev_close: Option<f64>,
    pub bid: Option<f64>,
    pub ask: Option<f64>,
}

impl PriceUpdate {
    /// Maps vendor quote fields onto a [`PriceUpdate`], falling back to the
    /// requested exchange and symbol when the delta omits them.
    pub fn from_quote(values: QuoteValues, exchange: &str, symbol: &str) -> Self {
        Self {
            exchange: values.exchange.unwrap_or_else(|| exchange.to_string()),
            symbol: values.short_name.unwrap_or_else(|| symbol.to_string()),
            price: values.lp,
            volume: values.volume,
            change: values.ch,
            change_percent: values.chp,
            high: values.high_price,
            low: values.low_price,
            open: values.open_price,
            prev_close: values.prev_close_price,
            bid: values.bid,
            ask: values.ask,
        }
    }
}
