//! Application configuration loaded from environment variables.
//!
//! Every variable is optional:
//! - `TVFEED_WEBSOCKET_URL`: overrides the default streaming endpoint
//! - `TVFEED_JWT_TOKEN`: JWT for authenticated indicator access
//! - `TVFEED_EXPORT_FORMAT`: `json` or `csv`; setting it enables export
//! - `TVFEED_EXPORT_DIR`: directory for exported files (default `export`)

use std::path::PathBuf;

use crate::export::ExportFormat;

/// Default streaming endpoint with the chart query parameters.
pub const DEFAULT_WEBSOCKET_URL: &str =
    "wss://data.tradingview.com/socket.io/websocket?from=chart%2F&type=chart";

/// JWT sentinel accepted by the vendor for anonymous access.
pub const ANONYMOUS_TOKEN: &str = "unauthorized_user_token";

const DEFAULT_EXPORT_DIR: &str = "export";

/// Top-level application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub stream: StreamConfig,
    pub export: Option<ExportConfig>,
}

/// Settings for opening a streaming connection.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub websocket_url: String,
    pub jwt_token: String,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            websocket_url: DEFAULT_WEBSOCKET_URL.to_string(),
            jwt_token: ANONYMOUS_TOKEN.to_string(),
        }
    }
}

/// Where and how fetched results are written to disk.
#[derive(Debug, Clone)]
pub struct ExportConfig {
    pub format: ExportFormat,
    pub directory: PathBuf,
}

/// Loads the application configuration from environment variables.
///
/// # Errors
///
/// Returns [`TvFeedError::Config`](crate::TvFeedError::Config) if
/// `TVFEED_EXPORT_FORMAT` names an unsupported format.
pub fn fetch_config() -> crate::Result<AppConfig> {
    let websocket_url = non_empty_var("TVFEED_WEBSOCKET_URL")
        .unwrap_or_else(|| DEFAULT_WEBSOCKET_URL.to_string());
    let jwt_token =
        non_empty_var("TVFEED_JWT_TOKEN").unwrap_or_else(|| ANONYMOUS_TOKEN.to_string());

    let export = match non_empty_var("TVFEED_EXPORT_FORMAT") {
        Some(format) => Some(ExportConfig {
            format: format.parse()?,
            directory: non_empty_var("TVFEED_EXPORT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_EXPORT_DIR)),
        }),
        None => None,
    };

    Ok(AppConfig {
        stream: StreamConfig {
            websocket_url,
            jwt_token,
        },
        export,
    })
}

/// Returns the value of an environment variable if it exists and is non-empty.
fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}
