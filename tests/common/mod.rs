//! Shared test utilities: a scripted loopback server and a stub vendor API.

#![allow(dead_code)]

use std::collections::HashMap;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_tungstenite::{WebSocketStream, accept_async};
use tungstenite::Message;

use tvfeed::config::StreamConfig;
use tvfeed::rest::VendorApi;
use tvfeed::websocket::protocol::frame;
use tvfeed::{Result, TvFeedError};

pub const TIMESCALE_UPDATE: &str = include_str!("../fixtures/timescale_update.json");
pub const STUDY_UPDATE: &str = include_str!("../fixtures/study_update.json");
pub const QUOTE_DELTA: &str = include_str!("../fixtures/quote_delta.json");
pub const RSI_META_INFO: &str = include_str!("../fixtures/rsi_meta_info.json");

/// How long the server keeps reading after its script has run.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// One step of a scripted server session.
pub enum Step {
    /// Reads client messages until one carries the named call.
    Expect(&'static str),
    /// Sends a raw text message.
    Send(String),
    /// Reads the next client message and asserts it equals the text.
    ExpectExact(String),
    /// Starts the close handshake.
    Close,
}

/// Frames a fixture body the way the vendor sends it.
pub fn framed(body: &str) -> String {
    frame(body.trim())
}

/// Binds a loopback server that serves one connection with `steps`.
///
/// The handle resolves to every text message the client sent.
pub async fn spawn_server(steps: Vec<Step>) -> (String, JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind loopback listener");
    let addr = listener.local_addr().expect("Listener has no address");

    let handle = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("Failed to accept");
        let mut ws = accept_async(stream)
            .await
            .expect("WebSocket upgrade failed");
        let mut received = Vec::new();

        for step in steps {
            match step {
                Step::Expect(method) => {
                    let needle = format!("\"m\":\"{method}\"");
                    loop {
                        let text = next_text(&mut ws)
                            .await
                            .unwrap_or_else(|| panic!("Connection ended before {method}"));
                        let found = text.contains(&needle);
                        received.push(text);
                        if found {
                            break;
                        }
                    }
                }
                Step::Send(text) => ws
                    .send(Message::Text(text.into()))
                    .await
                    .expect("Failed to send"),
                Step::ExpectExact(expected) => {
                    let text = next_text(&mut ws)
                        .await
                        .expect("Connection ended before expected message");
                    assert_eq!(text, expected);
                    received.push(text);
                }
                Step::Close => {
                    let _ = ws.close(None).await;
                }
            }
        }

        let _ = tokio::time::timeout(DRAIN_TIMEOUT, async {
            while let Some(text) = next_text(&mut ws).await {
                received.push(text);
            }
        })
        .await;

        received
    });

    (format!("ws://{addr}"), handle)
}

async fn next_text(ws: &mut WebSocketStream<TcpStream>) -> Option<String> {
    loop {
        match ws.next().await? {
            Ok(Message::Text(text)) => return Some(text.as_str().to_owned()),
            Ok(Message::Close(_)) | Err(_) => return None,
            Ok(_) => continue,
        }
    }
}

/// Stream settings pointing at a loopback server.
pub fn stream_config(url: &str) -> StreamConfig {
    StreamConfig {
        websocket_url: url.to_string(),
        ..StreamConfig::default()
    }
}

/// Calls whose method name appears in `received`, in order, restricted to
/// `methods`.
pub fn methods_sent<'a>(received: &[String], methods: &[&'a str]) -> Vec<&'a str> {
    received
        .iter()
        .filter_map(|text| {
            methods
                .iter()
                .find(|m| text.contains(&format!("\"m\":\"{m}\"")))
                .copied()
        })
        .collect()
}

/// In-memory [`VendorApi`].
#[derive(Debug, Default)]
pub struct MockApi {
    metadata: HashMap<String, Value>,
    unknown_symbols: Vec<String>,
}

impl MockApi {
    pub fn with_metadata(mut self, script_id: &str, meta_info: Value) -> Self {
        self.metadata.insert(script_id.to_string(), meta_info);
        self
    }

    pub fn with_unknown_symbol(mut self, symbol: &str) -> Self {
        self.unknown_symbols.push(symbol.to_string());
        self
    }
}

impl VendorApi for MockApi {
    async fn validate_symbol(&self, exchange: &str, symbol: &str) -> Result<()> {
        if self.unknown_symbols.iter().any(|s| s == symbol) {
            return Err(TvFeedError::Validation(format!(
                "Invalid exchange:symbol '{exchange}:{symbol}'"
            )));
        }
        Ok(())
    }

    async fn fetch_study_metadata(&self, script_id: &str, _script_version: &str) -> Result<Value> {
        self.metadata.get(script_id).cloned().ok_or_else(|| {
            TvFeedError::MalformedMessage(format!("missing metaInfo for script '{script_id}'"))
        })
    }
}
