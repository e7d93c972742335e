//! Vendor REST lookups used around the streaming session.
//!
//! The streamer only needs two of them, symbol validation and indicator
//! metadata translation, so those sit behind the [`VendorApi`] trait and
//! can be swapped out in tests. The indicator listing and search helpers are
//! plain methods on [`HttpVendorApi`].

use std::future::Future;
use std::time::Duration;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info, warn};

use crate::Result;
use crate::error::TvFeedError;

const SYMBOL_URL: &str = "https://scanner.tradingview.com/symbol";
const PINE_TRANSLATE_URL: &str = "https://pine-facade.tradingview.com/pine-facade/translate";
const PINE_LIST_URL: &str = "https://pine-facade.tradingview.com/pine-facade/list?filter=standard";
const SCRIPT_SEARCH_URL: &str = "https://www.tradingview.com/pubscripts-suggest-json/";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);
const LIST_TIMEOUT: Duration = Duration::from_secs(10);
const VALIDATION_ATTEMPTS: u32 = 3;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Request/response lookups the streamer depends on.
pub trait VendorApi: Send + Sync {
    /// Confirms that `exchange:symbol` exists.
    fn validate_symbol(
        &self,
        exchange: &str,
        symbol: &str,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Returns the `metaInfo` object for a script.
    fn fetch_study_metadata(
        &self,
        script_id: &str,
        script_version: &str,
    ) -> impl Future<Output = Result<Value>> + Send;
}

/// A built-in indicator usable with candle streaming.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorInfo {
    #[serde(rename(deserialize = "scriptName"), default)]
    pub name: Option<String>,
    #[serde(rename(deserialize = "scriptIdPart"), default)]
    pub id: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
}

/// A public script returned by the indicator search.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScriptSuggestion {
    pub script_name: String,
    pub image_url: String,
    pub author: String,
    pub agree_count: u64,
    pub is_recommended: bool,
    pub script_id_part: String,
    pub version: Option<String>,
}

/// [`VendorApi`] backed by the vendor's public HTTP endpoints.
#[derive(Debug, Clone)]
pub struct HttpVendorApi {
    client: reqwest::Client,
}

impl HttpVendorApi {
    /// Builds the HTTP client.
    ///
    /// # Errors
    ///
    /// Returns [`TvFeedError::Http`] if the client cannot be constructed.
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self { client })
    }

    /// Fetches the list of standard built-in indicators.
    ///
    /// Failures are logged and yield an empty list.
    pub async fn available_indicators(&self) -> Vec<IndicatorInfo> {
        let result: Result<Vec<IndicatorInfo>> = async move {
            let response = self
                .client
                .get(PINE_LIST_URL)
                .timeout(LIST_TIMEOUT)
                .send()
                .await?
                .error_for_status()?;
            Ok::<_, TvFeedError>(response.json().await?)
        }
        .await;

        match result {
            Ok(list) => {
                info!(count = list.len(), "Fetched standard indicators");
                list
            }
            Err(e) => {
                error!("Error fetching available indicators: {e}");
                Vec::new()
            }
        }
    }

    /// Searches public scripts whose name or author contains `query`.
    ///
    /// Failures are logged and yield an empty list.
    pub async fn search_indicators(&self, query: &str) -> Vec<ScriptSuggestion> {
        let result: Result<Value> = async move {
            let request = self.search_request(query)?;
            let response = self.client.execute(request).await?.error_for_status()?;
            Ok::<_, TvFeedError>(response.json().await?)
        }
        .await;

        match result {
            Ok(body) => filter_suggestions(query, &body),
            Err(e) => {
                error!("Error searching indicators: {e}");
                Vec::new()
            }
        }
    }

    /// Script search request with `query` percent-encoded.
    fn search_request(&self, query: &str) -> reqwest::Result<reqwest::Request> {
        self.client
            .get(SCRIPT_SEARCH_URL)
            .query(&[("search", query)])
            .build()
    }
}

impl VendorApi for HttpVendorApi {
    async fn validate_symbol(&self, exchange: &str, symbol: &str) -> Result<()> {
        if exchange.trim().is_empty() || symbol.trim().is_empty() {
            return Err(TvFeedError::Validation(
                "exchange and symbol cannot be empty".into(),
            ));
        }

        let exchange_symbol = format!("{exchange}:{symbol}");
        let query = [
            ("symbol", exchange_symbol.as_str()),
            ("fields", "market"),
            ("no_404", "false"),
        ];

        for attempt in 1..=VALIDATION_ATTEMPTS {
            let outcome = self
                .client
                .get(SYMBOL_URL)
                .query(&query)
                .send()
                .await
                .and_then(reqwest::Response::error_for_status);

            match outcome {
                Ok(_) => return Ok(()),
                Err(e) if e.status() == Some(StatusCode::NOT_FOUND) => {
                    return Err(TvFeedError::Validation(format!(
                        "Invalid exchange:symbol '{exchange}:{symbol}'"
                    )));
                }
                Err(e) => {
                    warn!(
                        attempt,
                        exchange, symbol, "Symbol validation attempt failed: {e}"
                    );
                }
            }
        }

        Err(TvFeedError::Validation(format!(
            "Invalid exchange:symbol '{exchange}:{symbol}' after {VALIDATION_ATTEMPTS} attempts"
        )))
    }

    async fn fetch_study_metadata(&self, script_id: &str, script_version: &str) -> Result<Value> {
        let url = format!("{PINE_TRANSLATE_URL}/{script_id}/{script_version}");
        let body: Value = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        meta_info(body, script_id)
    }
}

/// Extracts `result.metaInfo` from a translate response.
fn meta_info(mut body: Value, script_id: &str) -> Result<Value> {
    match body.pointer_mut("/result/metaInfo").map(Value::take) {
        Some(meta) if meta.is_object() => Ok(meta),
        _ => Err(TvFeedError::MalformedMessage(format!(
            "missing metaInfo for script '{script_id}'"
        ))),
    }
}

/// Keeps search results whose script name or author contains `query`,
/// ignoring case.
fn filter_suggestions(query: &str, body: &Value) -> Vec<ScriptSuggestion> {
    let needle = query.to_lowercase();
    let Some(results) = body.get("results").and_then(Value::as_array) else {
        return Vec::new();
    };

    results
        .iter()
        .filter_map(|item| {
            let str_field = |key: &str| {
                item.get(key)
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string()
            };
            let script_name = str_field("scriptName");
            let author = item
                .pointer("/author/username")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();

            if !script_name.to_lowercase().contains(&needle)
                && !author.to_lowercase().contains(&needle)
            {
                return None;
            }

            Some(ScriptSuggestion {
                image_url: str_field("imageUrl"),
                agree_count: item.get("agreeCount").and_then(Value::as_u64).unwrap_or(0),
                is_recommended: item
                    .get("isRecommended")
                    .and_then(Value::as_bool)
                    .unwrap_or(false),
                script_id_part: str_field("scriptIdPart"),
                version: item.get("version").and_then(Value::as_str).map(String::from),
                script_name,
                author,
            })
        })
        .collect()
}
