//! Quote/chart session creation and the setup handshake.

use rand::Rng;
use serde_json::{Value, json};
use tracing::info;

use super::{WsWriter, send_call};
use crate::Result;

/// Prefix of quote session ids.
pub const QUOTE_SESSION_PREFIX: &str = "qs_";

/// Prefix of chart session ids.
pub const CHART_SESSION_PREFIX: &str = "cs_";

const SESSION_SUFFIX_LEN: usize = 12;

/// Fields the vendor includes in every quote snapshot. Order and spelling
/// must match the vendor client.
pub const QUOTE_FIELDS: [&str; 31] = [
    "ch",
    "chp",
    "current_session",
    "description",
    "local_description",
    "language",
    "exchange",
    "fractional",
    "is_tradable",
    "lp",
    "lp_time",
    "minmov",
    "minmove2",
    "original_name",
    "pricescale",
    "pro_name",
    "short_name",
    "type",
    "update_mode",
    "volume",
    "currency_code",
    "rchp",
    "rtc",
    "high_price",
    "low_price",
    "open_price",
    "prev_close_price",
    "bid",
    "ask",
    "bid_size",
    "ask_size",
];

/// Quote and chart session ids owned by one connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sessions {
    pub quote: String,
    pub chart: String,
}

impl Sessions {
    /// Generates a fresh pair of session ids.
    pub fn generate() -> Self {
        Self {
            quote: generate_session(QUOTE_SESSION_PREFIX),
            chart: generate_session(CHART_SESSION_PREFIX),
        }
    }
}

/// Returns `prefix` followed by 12 random lowercase ASCII letters.
pub fn generate_session(prefix: &str) -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..SESSION_SUFFIX_LEN)
        .map(|_| char::from(rng.gen_range(b'a'..=b'z')))
        .collect();
    format!("{prefix}{suffix}")
}

/// Ordered setup calls that initialize vendor-side session state.
pub fn handshake_calls(sessions: &Sessions, jwt_token: &str) -> Vec<(&'static str, Vec<Value>)> {
    let mut fields = vec![json!(sessions.quote)];
    fields.extend(QUOTE_FIELDS.iter().map(|f| json!(f)));

    vec![
        ("set_auth_token", vec![json!(jwt_token)]),
        ("set_locale", vec![json!("en"), json!("US")]),
        (
            "chart_create_session",
            vec![json!(sessions.chart), json!("")],
        ),
        ("quote_create_session", vec![json!(sessions.quote)]),
        ("quote_set_fields", fields),
        ("quote_hibernate_all", vec![json!(sessions.quote)]),
    ]
}

/// Sends the setup sequence for `sessions`.
///
/// # Errors
///
/// Returns a [`TvFeedError`](crate::TvFeedError) if any send fails.
pub async fn initialize(write: &mut WsWriter, sessions: &Sessions, jwt_token: &str) -> Result<()> {
    for (method, params) in handshake_calls(sessions, jwt_token) {
        send_call(write, method, &params).await?;
    }
    info!(
        quote_session = sessions.quote,
        chart_session = sessions.chart,
        "Sessions initialized"
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_id_format() {
        for prefix in [QUOTE_SESSION_PREFIX, CHART_SESSION_PREFIX] {
            let id = generate_session(prefix);
            assert!(id.starts_with(prefix));
            assert_eq!(id.len(), 15);
            assert!(id[3..].chars().all(|c| c.is_ascii_lowercase()));
        }
    }

    #[test]
    fn generated_sessions_differ() {
        let sessions = Sessions::generate();
        assert_ne!(sessions.quote, sessions.chart);
        assert_ne!(generate_session("qs_"), generate_session("qs_"));
    }

    #[test]
    fn handshake_order_and_params() {
        let sessions = Sessions {
            quote: "qs_aaaaaaaaaaaa".into(),
            chart: "cs_bbbbbbbbbbbb".into(),
        };
        let calls = handshake_calls(&sessions, "unauthorized_user_token");
        let methods: Vec<_> = calls.iter().map(|(m, _)| *m).collect();

        assert_eq!(
            methods,
            vec![
                "set_auth_token",
                "set_locale",
                "chart_create_session",
                "quote_create_session",
                "quote_set_fields",
                "quote_hibernate_all",
            ]
        );
        assert_eq!(calls[0].1, vec![json!("unauthorized_user_token")]);
        assert_eq!(calls[2].1, vec![json!("cs_bbbbbbbbbbbb"), json!("")]);

        let fields = &calls[4].1;
        assert_eq!(fields.len(), QUOTE_FIELDS.len() + 1);
        assert_eq!(fields[0], json!("qs_aaaaaaaaaaaa"));
        assert_eq!(fields[1], json!("ch"));
        assert_eq!(fields.last(), Some(&json!("ask_size")));
    }
}
