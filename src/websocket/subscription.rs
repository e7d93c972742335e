//! Symbol and indicator study registration on an initialized session pair.

use std::collections::HashMap;

use serde_json::{Map, Value, json};
use tracing::{error, info};

use super::{Sessions, WsWriter, send_call};
use crate::Result;
use crate::models::SERIES_ID;
use crate::rest::VendorApi;

/// Human timeframe → protocol resolution.
pub const TIMEFRAMES: [(&str, &str); 10] = [
    ("1m", "1"),
    ("5m", "5"),
    ("15m", "15"),
    ("30m", "30"),
    ("1h", "60"),
    ("2h", "120"),
    ("4h", "240"),
    ("1d", "1D"),
    ("1w", "1W"),
    ("1M", "1M"),
];

/// Resolution used for timeframes missing from [`TIMEFRAMES`].
pub const DEFAULT_RESOLUTION: &str = "1";

const SYMBOL_REF: &str = "sds_sym_1";
const SERIES_REF: &str = "s1";

/// Study ids are `st9`, `st10`, ... in request order.
const FIRST_STUDY_NUMBER: usize = 9;

const STUDY_SCRIPT: &str = "Script@tv-scripting-101!";

const VOLUME_STUDY_ID: &str = "st1";
const VOLUME_STUDY_SCRIPT: &str = "Volume@tv-basicstudies-246";

/// Resolution and depth of the series behind a raw OHLCV watch.
const WATCH_TIMEFRAME: &str = "1m";
const WATCH_CANDLE_COUNT: usize = 10;

/// An indicator script to attach to the chart session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndicatorSpec {
    /// Script id, e.g. `"STD;RSI"`.
    pub script_id: String,
    /// Script version, e.g. `"37.0"`.
    pub script_version: String,
}

impl IndicatorSpec {
    pub fn new(script_id: impl Into<String>, script_version: impl Into<String>) -> Self {
        Self {
            script_id: script_id.into(),
            script_version: script_version.into(),
        }
    }
}

/// Maps study ids assigned during registration back to script ids.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StudyTable {
    names: HashMap<String, String>,
}

impl StudyTable {
    /// Records the study at request position `position` and returns its id.
    pub fn register(&mut self, position: usize, script_id: &str) -> String {
        let study_id = study_id(position);
        self.names.insert(study_id.clone(), script_id.to_string());
        study_id
    }

    /// Script id for `study_id`, if it was registered.
    pub fn name_for(&self, study_id: &str) -> Option<&str> {
        self.names.get(study_id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Study id for the indicator at `position`.
pub fn study_id(position: usize) -> String {
    format!("st{}", FIRST_STUDY_NUMBER + position)
}

/// Maps a human timeframe (`"1h"`) to its protocol value (`"60"`), falling
/// back to [`DEFAULT_RESOLUTION`].
pub fn map_timeframe(timeframe: &str) -> &'static str {
    TIMEFRAMES
        .iter()
        .find(|(human, _)| *human == timeframe)
        .map_or(DEFAULT_RESOLUTION, |(_, protocol)| *protocol)
}

/// `=`-prefixed JSON symbol descriptor used by `quote_add_symbols` and
/// `resolve_symbol`.
pub fn symbol_descriptor(exchange_symbol: &str) -> String {
    format!(
        "={}",
        json!({"adjustment": "splits", "symbol": exchange_symbol})
    )
}

/// Calls that attach a symbol to both sessions.
pub fn symbol_calls(
    sessions: &Sessions,
    exchange_symbol: &str,
    timeframe: &str,
    candle_count: usize,
) -> Vec<(&'static str, Vec<Value>)> {
    let descriptor = symbol_descriptor(exchange_symbol);

    vec![
        (
            "quote_add_symbols",
            vec![json!(sessions.quote), json!(descriptor)],
        ),
        (
            "resolve_symbol",
            vec![json!(sessions.chart), json!(SYMBOL_REF), json!(descriptor)],
        ),
        (
            "create_series",
            vec![
                json!(sessions.chart),
                json!(SERIES_ID),
                json!(SERIES_REF),
                json!(SYMBOL_REF),
                json!(map_timeframe(timeframe)),
                json!(candle_count),
                json!(""),
            ],
        ),
        (
            "quote_fast_symbols",
            vec![json!(sessions.quote), json!(exchange_symbol)],
        ),
    ]
}

/// Registers a symbol on the quote and chart sessions at the given
/// timeframe and candle depth.
///
/// # Errors
///
/// Returns a [`TvFeedError`](crate::TvFeedError) if any send fails.
pub async fn add_symbol(
    write: &mut WsWriter,
    sessions: &Sessions,
    exchange_symbol: &str,
    timeframe: &str,
    candle_count: usize,
) -> Result<()> {
    for (method, params) in symbol_calls(sessions, exchange_symbol, timeframe, candle_count) {
        send_call(write, method, &params).await?;
    }
    info!(
        symbol = exchange_symbol,
        timeframe,
        candle_count,
        "Symbol added to sessions"
    );

    Ok(())
}

/// Registers a symbol on the quote session only, for live quotes.
///
/// # Errors
///
/// Returns a [`TvFeedError`](crate::TvFeedError) if any send fails.
pub async fn add_quote_symbol(
    write: &mut WsWriter,
    quote_session: &str,
    exchange_symbol: &str,
) -> Result<()> {
    let descriptor = symbol_descriptor(exchange_symbol);
    send_call(
        write,
        "quote_add_symbols",
        &[json!(quote_session), json!(descriptor)],
    )
    .await?;
    send_call(
        write,
        "quote_fast_symbols",
        &[json!(quote_session), json!(exchange_symbol)],
    )
    .await?;
    info!(symbol = exchange_symbol, "Symbol added to quote session");

    Ok(())
}

/// Calls that attach a symbol to both sessions at one-minute resolution with
/// the built-in volume study, for raw OHLCV streaming.
pub fn ohlcv_watch_calls(
    sessions: &Sessions,
    exchange_symbol: &str,
) -> Vec<(&'static str, Vec<Value>)> {
    let mut calls = symbol_calls(
        sessions,
        exchange_symbol,
        WATCH_TIMEFRAME,
        WATCH_CANDLE_COUNT,
    );
    calls.push((
        "create_study",
        vec![
            json!(sessions.chart),
            json!(VOLUME_STUDY_ID),
            json!(VOLUME_STUDY_ID),
            json!(SERIES_ID),
            json!(VOLUME_STUDY_SCRIPT),
            json!({"length": 20, "col_prev_close": "false"}),
        ],
    ));
    calls.push(("quote_hibernate_all", vec![json!(sessions.quote)]));
    calls
}

/// Calls that put several symbols on the quote session.
///
/// The vendor expects the first symbol announced with a currency/session
/// descriptor before the full list is added.
pub fn watchlist_calls(
    quote_session: &str,
    exchange_symbols: &[String],
) -> Vec<(&'static str, Vec<Value>)> {
    let first = exchange_symbols.first().map(String::as_str).unwrap_or_default();
    let descriptor = format!(
        "={}",
        json!({
            "adjustment": "splits",
            "currency-id": "USD",
            "session": "regular",
            "symbol": first,
        })
    );

    let mut symbols = vec![json!(quote_session)];
    symbols.extend(exchange_symbols.iter().map(|s| json!(s)));

    vec![
        (
            "quote_add_symbols",
            vec![json!(quote_session), json!(descriptor)],
        ),
        (
            "quote_fast_symbols",
            vec![json!(quote_session), json!(descriptor)],
        ),
        ("quote_add_symbols", symbols.clone()),
        ("quote_fast_symbols", symbols),
    ]
}

/// Registers a symbol for raw OHLCV streaming.
///
/// # Errors
///
/// Returns a [`TvFeedError`](crate::TvFeedError) if any send fails.
pub async fn add_ohlcv_watch(
    write: &mut WsWriter,
    sessions: &Sessions,
    exchange_symbol: &str,
) -> Result<()> {
    for (method, params) in ohlcv_watch_calls(sessions, exchange_symbol) {
        send_call(write, method, &params).await?;
    }
    info!(symbol = exchange_symbol, "Symbol added with volume study");

    Ok(())
}

/// Registers a watchlist of symbols on the quote session.
///
/// # Errors
///
/// Returns a [`TvFeedError`](crate::TvFeedError) if any send fails.
pub async fn add_watchlist(
    write: &mut WsWriter,
    quote_session: &str,
    exchange_symbols: &[String],
) -> Result<()> {
    for (method, params) in watchlist_calls(quote_session, exchange_symbols) {
        send_call(write, method, &params).await?;
    }
    info!(count = exchange_symbols.len(), "Watchlist added to quote session");

    Ok(())
}

/// Attaches indicator studies to the chart session.
///
/// Indicators whose metadata cannot be fetched are logged and skipped; their
/// study id is not reused.
///
/// # Errors
///
/// Returns a [`TvFeedError`](crate::TvFeedError) if a send fails.
pub async fn add_indicators<A: VendorApi>(
    write: &mut WsWriter,
    sessions: &Sessions,
    api: &A,
    indicators: &[IndicatorSpec],
) -> Result<StudyTable> {
    let mut table = StudyTable::default();

    for (position, indicator) in indicators.iter().enumerate() {
        info!(
            position = position + 1,
            total = indicators.len(),
            script_id = indicator.script_id,
            script_version = indicator.script_version,
            "Processing indicator"
        );

        let meta_info = match api
            .fetch_study_metadata(&indicator.script_id, &indicator.script_version)
            .await
        {
            Ok(meta) => meta,
            Err(e) => {
                error!(
                    script_id = indicator.script_id,
                    script_version = indicator.script_version,
                    "Failed to fetch indicator metadata: {e}"
                );
                continue;
            }
        };

        let mut params = prepare_study_params(&indicator.script_id, &meta_info, &sessions.chart);
        params[1] = json!(table.register(position, &indicator.script_id));

        send_call(write, "create_study", &params).await?;
        send_call(write, "quote_hibernate_all", &[json!(sessions.quote)]).await?;
    }

    Ok(table)
}

/// Builds the `create_study` parameter list from a script's `metaInfo`.
///
/// The study id slot (index 1) holds the `st9` placeholder; callers patch it
/// with the id they assign.
pub fn prepare_study_params(script_id: &str, meta_info: &Value, chart_session: &str) -> Vec<Value> {
    let pine_version = meta_info
        .pointer("/pine/version")
        .cloned()
        .unwrap_or_else(|| json!("1.0"));
    let inputs = meta_info
        .get("inputs")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();
    let first_input = inputs
        .first()
        .and_then(|input| input.get("defval"))
        .cloned()
        .unwrap_or_else(|| json!(""));

    let mut options = Map::new();
    options.insert("text".into(), first_input);
    options.insert("pineId".into(), json!(script_id));
    options.insert("pineVersion".into(), pine_version);
    options.insert(
        "pineFeatures".into(),
        json!({"v": r#"{"indicator":1,"plot":1,"ta":1}"#, "f": true, "t": "text"}),
    );
    options.insert("__profile".into(), json!({"v": false, "f": true, "t": "bool"}));

    for input in inputs {
        let Some(id) = input.get("id").and_then(Value::as_str) else {
            continue;
        };
        if id.starts_with("in_") {
            options.insert(
                id.to_string(),
                json!({
                    "v": input.get("defval").cloned().unwrap_or(Value::Null),
                    "f": true,
                    "t": input.get("type").cloned().unwrap_or(Value::Null),
                }),
            );
        }
    }

    vec![
        json!(chart_session),
        json!(study_id(0)),
        json!("st1"),
        json!(SERIES_ID),
        json!(STUDY_SCRIPT),
        Value::Object(options),
    ]
}
