//! Receive loop that demultiplexes incoming frames into packets.
//!
//! [`spawn_demultiplexer`] moves both halves of the socket into a task that
//! echoes heartbeats, decodes every other frame into a [`Packet`], and pushes
//! the packets onto a bounded channel in arrival order. The task ends when the
//! socket closes or errors, or when the [`PacketReceiver`] is dropped, and it
//! closes the socket on the way out.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::{SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use tungstenite::Message;

use super::protocol::decode_message;
use super::{WsReader, WsWriter};
use crate::models::Packet;

/// Packets buffered between the receive task and its consumer.
const PACKET_BUFFER: usize = 64;

/// Consumer side of the receive loop.
///
/// Dropping it stops the loop and closes the socket; [`shutdown`] does the
/// same and waits for the close to finish.
///
/// [`shutdown`]: PacketReceiver::shutdown
pub struct PacketReceiver {
    rx: mpsc::Receiver<Packet>,
    task: JoinHandle<()>,
}

impl PacketReceiver {
    /// Receives the next packet, or `None` once the socket has ended.
    pub async fn recv(&mut self) -> Option<Packet> {
        self.rx.recv().await
    }

    /// Stops the receive loop and waits until the socket is closed.
    pub async fn shutdown(self) {
        let Self { rx, task } = self;
        drop(rx);
        if let Err(e) = task.await {
            warn!("Receive task did not finish cleanly: {e}");
        }
    }
}

impl Stream for PacketReceiver {
    type Item = Packet;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Packet>> {
        self.get_mut().rx.poll_recv(cx)
    }
}

/// Starts the receive loop on a new task.
pub fn spawn_demultiplexer(write: WsWriter, read: WsReader) -> PacketReceiver {
    let (tx, rx) = mpsc::channel(PACKET_BUFFER);
    let task = tokio::spawn(receive_loop(write, read, tx));

    PacketReceiver { rx, task }
}

async fn receive_loop(mut write: WsWriter, mut read: WsReader, tx: mpsc::Sender<Packet>) {
    'recv: loop {
        let msg = tokio::select! {
            () = tx.closed() => {
                debug!("Packet receiver dropped");
                break;
            }
            msg = read.next() => msg,
        };

        let raw = match msg {
            Some(Ok(Message::Text(text))) => text.as_str().to_owned(),
            Some(Ok(Message::Binary(bytes))) => match std::str::from_utf8(&bytes) {
                Ok(text) => text.to_owned(),
                Err(e) => {
                    debug!("Non UTF-8 binary message skipped: {e}");
                    continue;
                }
            },
            Some(Ok(Message::Close(frame))) => {
                error!(?frame, "WebSocket connection closed");
                break;
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                error!("WebSocket error: {e}");
                break;
            }
            None => {
                info!("WebSocket stream ended");
                break;
            }
        };

        for packet in decode_message(&raw) {
            match packet {
                Packet::Heartbeat(beat) => {
                    debug!(heartbeat = %beat, "Echoing heartbeat");
                    if let Err(e) = write.send(Message::Text(beat.into())).await {
                        error!("Failed to echo heartbeat: {e}");
                        break 'recv;
                    }
                }
                packet => {
                    if tx.send(packet).await.is_err() {
                        debug!("Packet receiver dropped");
                        break 'recv;
                    }
                }
            }
        }
    }

    if let Err(e) = write.close().await {
        debug!("Socket already closed: {e}");
    }
}
