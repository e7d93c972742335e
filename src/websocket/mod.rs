//! Async WebSocket client for the vendor's streaming protocol.
//!
//! This module is organized by layer:
//! - [`protocol`] - Frame encoding/decoding and heartbeat detection
//! - [`session`] - Session id generation and the setup handshake
//! - [`subscription`] - Symbol and indicator study registration
//! - [`handler`] - Receive loop that demultiplexes incoming packets

pub mod handler;
pub mod protocol;
pub mod session;
pub mod subscription;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info};
use tungstenite::Message;
use tungstenite::client::IntoClientRequest;
use tungstenite::http::HeaderValue;

use crate::Result;
use crate::config::StreamConfig;

pub use handler::{PacketReceiver, spawn_demultiplexer};
pub use session::Sessions;
pub use subscription::StudyTable;

/// Write half of a streaming connection.
pub type WsWriter = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// Read half of a streaming connection.
pub type WsReader = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// Browser-like headers the vendor expects on the upgrade request.
const REQUEST_HEADERS: [(&str, &str); 5] = [
    ("Origin", "https://www.tradingview.com"),
    (
        "User-Agent",
        "Mozilla/5.0 (Windows NT 6.3; Win64; x64) AppleWebKit/537.36 \
         (KHTML, like Gecko) Chrome/107.0.0.0 Safari/537.36",
    ),
    ("Accept-Language", "en-US,en;q=0.9"),
    ("Cache-Control", "no-cache"),
    ("Pragma", "no-cache"),
];

/// Establishes a WebSocket connection to the given URL.
///
/// # Errors
///
/// Returns a [`TvFeedError`](crate::TvFeedError) if the URL is invalid or the
/// connection or TLS handshake fails.
pub async fn connect(url: &str) -> Result<(WsWriter, WsReader)> {
    // A provider may already be installed by the embedding application.
    let _ = rustls::crypto::ring::default_provider().install_default();

    let mut request = url.into_client_request()?;
    let headers = request.headers_mut();
    for (name, value) in REQUEST_HEADERS {
        headers.insert(name, HeaderValue::from_static(value));
    }

    let (ws_stream, _) = connect_async(request).await?;
    info!("WebSocket handshake completed");

    Ok(ws_stream.split())
}

/// Frames and sends one remote call.
///
/// # Errors
///
/// Returns a [`TvFeedError`](crate::TvFeedError) if serialization or sending
/// fails.
pub async fn send_call(write: &mut WsWriter, method: &str, params: &[Value]) -> Result<()> {
    let message = protocol::encode_call(method, params)?;
    debug!("Sending message: {}", message);
    write.send(Message::Text(message.into())).await?;

    Ok(())
}

/// An open connection whose quote and chart sessions have been initialized.
///
/// Registration calls go through [`Connection::writer`]; the connection is
/// then handed to the receive loop with [`Connection::into_packets`].
pub struct Connection {
    write: WsWriter,
    read: WsReader,
    sessions: Sessions,
}

impl Connection {
    /// Connects and runs the session handshake.
    ///
    /// # Errors
    ///
    /// Returns a [`TvFeedError`](crate::TvFeedError) if connecting or any
    /// handshake send fails.
    pub async fn open(config: &StreamConfig) -> Result<Self> {
        info!(url = %config.websocket_url, "Connecting to WebSocket");
        let (mut write, read) = connect(&config.websocket_url).await?;

        let sessions = Sessions::generate();
        session::initialize(&mut write, &sessions, &config.jwt_token).await?;

        Ok(Self {
            write,
            read,
            sessions,
        })
    }

    pub fn sessions(&self) -> &Sessions {
        &self.sessions
    }

    /// Write half, for registration calls sent before the receive loop starts.
    pub fn writer(&mut self) -> &mut WsWriter {
        &mut self.write
    }

    /// Starts the receive loop, consuming the connection.
    pub fn into_packets(self) -> PacketReceiver {
        spawn_demultiplexer(self.write, self.read)
    }
}
