//! Input checks run before any network I/O.

use crate::Result;
use crate::error::TvFeedError;
use crate::websocket::subscription::TIMEFRAMES;

/// Exchanges accepted by [`Validator::default`].
const KNOWN_EXCHANGES: &[&str] = &[
    "BINANCE",
    "BINANCEUS",
    "BITFINEX",
    "BITGET",
    "BITMEX",
    "BITSTAMP",
    "BYBIT",
    "COINBASE",
    "CRYPTO",
    "GEMINI",
    "HTX",
    "KRAKEN",
    "KUCOIN",
    "MEXC",
    "OKX",
    "POLONIEX",
    "NASDAQ",
    "NYSE",
    "AMEX",
    "OTC",
    "CBOE",
    "CME",
    "CME_MINI",
    "CBOT",
    "COMEX",
    "NYMEX",
    "ICEUS",
    "ICEEUR",
    "EUREX",
    "LSE",
    "XETR",
    "FWB",
    "EURONEXT",
    "SIX",
    "TSX",
    "ASX",
    "NSE",
    "BSE",
    "TSE",
    "HKEX",
    "SSE",
    "SZSE",
    "KRX",
    "FX",
    "FX_IDC",
    "OANDA",
    "FXCM",
    "SAXO",
    "TVC",
    "SP",
    "DJ",
    "INDEX",
    "ECONOMICS",
];

/// How many exchanges an invalid-exchange error lists.
const ERROR_SAMPLE: usize = 10;

/// Close matches offered for a mistyped exchange.
const MAX_SUGGESTIONS: usize = 5;

/// Minimum similarity, `1 - distance / longer_len`, for a suggestion.
const SUGGESTION_CUTOFF: f64 = 0.6;

/// Checks exchange, symbol and timeframe arguments.
#[derive(Debug, Clone)]
pub struct Validator {
    exchanges: Vec<String>,
}

impl Default for Validator {
    fn default() -> Self {
        Self::new(KNOWN_EXCHANGES.iter().copied())
    }
}

impl Validator {
    /// A validator accepting exactly the given exchanges.
    pub fn new<I, S>(exchanges: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            exchanges: exchanges.into_iter().map(Into::into).collect(),
        }
    }

    /// # Errors
    ///
    /// Returns [`TvFeedError::Validation`] if the exchange is unknown. Matching
    /// ignores case.
    pub fn validate_exchange(&self, exchange: &str) -> Result<()> {
        if self
            .exchanges
            .iter()
            .any(|known| known.eq_ignore_ascii_case(exchange))
        {
            return Ok(());
        }

        let suggestions = self.suggest_exchanges(exchange);
        let hint = if suggestions.is_empty() {
            String::new()
        } else {
            format!(" Did you mean one of: {}?", suggestions.join(", "))
        };
        let sample = self
            .exchanges
            .iter()
            .take(ERROR_SAMPLE)
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(", ");
        Err(TvFeedError::Validation(format!(
            "Invalid exchange: '{exchange}'.{hint} Valid exchanges include: {sample}, ..."
        )))
    }

    /// Known exchanges closest to `exchange`, best match first.
    pub fn suggest_exchanges(&self, exchange: &str) -> Vec<&str> {
        let wanted = exchange.to_uppercase();
        let mut scored: Vec<(f64, &str)> = self
            .exchanges
            .iter()
            .filter_map(|known| {
                let score = similarity(&wanted, &known.to_uppercase());
                (score >= SUGGESTION_CUTOFF).then_some((score, known.as_str()))
            })
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));
        scored
            .into_iter()
            .take(MAX_SUGGESTIONS)
            .map(|(_, known)| known)
            .collect()
    }

    /// # Errors
    ///
    /// Returns [`TvFeedError::Validation`] if the symbol is blank.
    pub fn validate_symbol(&self, exchange: &str, symbol: &str) -> Result<()> {
        if symbol.trim().is_empty() {
            return Err(TvFeedError::Validation(format!(
                "Symbol must be a non-empty string for exchange '{exchange}'."
            )));
        }
        Ok(())
    }

    /// # Errors
    ///
    /// Returns [`TvFeedError::Validation`] if the timeframe has no protocol
    /// resolution.
    pub fn validate_timeframe(&self, timeframe: &str) -> Result<()> {
        if TIMEFRAMES.iter().any(|(human, _)| *human == timeframe) {
            return Ok(());
        }

        let valid = TIMEFRAMES
            .iter()
            .map(|(human, _)| *human)
            .collect::<Vec<_>>()
            .join(", ");
        Err(TvFeedError::Validation(format!(
            "Invalid timeframe: '{timeframe}'. Valid timeframes: {valid}"
        )))
    }
}

/// `1 - levenshtein(a, b) / max(len)`, in `0.0..=1.0`.
fn similarity(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let longest = a.len().max(b.len());
    if longest == 0 {
        return 1.0;
    }

    let mut row: Vec<usize> = (0..=b.len()).collect();
    for (i, ca) in a.iter().enumerate() {
        let mut diagonal = row[0];
        row[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitute = diagonal + usize::from(ca != cb);
            diagonal = row[j + 1];
            row[j + 1] = substitute.min(row[j] + 1).min(diagonal + 1);
        }
    }

    1.0 - row[b.len()] as f64 / longest as f64
}
