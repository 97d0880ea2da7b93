//! WebSocket client transport for a remote relay.
//!
//! DESIGN
//! ======
//! `subscribe` connects to `{base}/rooms/{room}/ws?client_id={id}` and
//! splits the socket. A reader task decodes text messages into frames and
//! forwards them to the session inbox; a writer task drains a bounded
//! outbound queue. `broadcast` only enqueues, so callers never wait on the
//! network. Dropping the outbound sender makes the writer close the socket.
//! Leaving gives the writer `WS_CLOSE_GRACE` to flush and close, then aborts
//! it; queued frames are not retried.
//!
//! Undecodable inbound text is logged and skipped. When the socket dies the
//! inbox closes, which the session reads as the transport going away.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{info, warn};

use super::{Transport, TransportError, validate_name};
use crate::consts::{CHANNEL_CAPACITY, WS_CLOSE_GRACE};
use crate::frame::Frame;
use crate::presence::PeerRecord;
use crate::sync::SyncMessage;

struct Connection {
    outbound: mpsc::Sender<Frame>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

/// `Transport` over a WebSocket connection to a relay.
pub struct WsTransport {
    base_url: String,
    client_id: String,
    connection: Option<Connection>,
}

impl WsTransport {
    /// `base_url` is `ws://host:port` or `wss://host:port`, without a trailing path.
    pub fn new(base_url: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self { base_url: base_url.into(), client_id: client_id.into(), connection: None }
    }

    fn room_url(&self, room: &str) -> String {
        format!("{}/rooms/{room}/ws?client_id={}", self.base_url.trim_end_matches('/'), self.client_id)
    }

    fn outbound(&self) -> Result<&mpsc::Sender<Frame>, TransportError> {
        self.connection.as_ref().map(|c| &c.outbound).ok_or(TransportError::NotSubscribed)
    }

    async fn disconnect(&mut self) {
        let Some(Connection { outbound, reader, mut writer }) = self.connection.take() else {
            return;
        };
        drop(outbound);
        reader.abort();
        if timeout(WS_CLOSE_GRACE, &mut writer).await.is_err() {
            warn!("ws: close timed out, dropping connection");
            writer.abort();
        }
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn subscribe(&mut self, room: &str) -> Result<mpsc::Receiver<Frame>, TransportError> {
        validate_name("room", room)?;
        validate_name("client id", &self.client_id)?;
        self.disconnect().await;

        let url = self.room_url(room);
        let (stream, _) = connect_async(url.as_str())
            .await
            .map_err(|e| TransportError::Connect(Box::new(e)))?;
        info!(%url, "ws: connected");

        let (mut sink, mut source) = stream.split();
        let (inbox_tx, inbox_rx) = mpsc::channel::<Frame>(CHANNEL_CAPACITY);
        let (outbound, mut outbound_rx) = mpsc::channel::<Frame>(CHANNEL_CAPACITY);

        let reader = tokio::spawn(async move {
            while let Some(message) = source.next().await {
                let text = match message {
                    Ok(Message::Text(text)) => text,
                    Ok(Message::Close(_)) => break,
                    Ok(_) => continue,
                    Err(e) => {
                        warn!(error = %e, "ws: read failed");
                        break;
                    }
                };
                match Frame::from_json(text.as_str()) {
                    Ok(frame) => {
                        if inbox_tx.send(frame).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!(error = %e, "ws: undecodable frame skipped"),
                }
            }
        });

        let writer = tokio::spawn(async move {
            while let Some(frame) = outbound_rx.recv().await {
                let text = match frame.to_json() {
                    Ok(text) => text,
                    Err(e) => {
                        warn!(error = %e, syscall = %frame.syscall, "ws: frame encode failed");
                        continue;
                    }
                };
                if let Err(e) = sink.send(Message::Text(text.into())).await {
                    warn!(error = %e, "ws: write failed");
                    return;
                }
            }
            let _ = sink.close().await;
        });

        self.connection = Some(Connection { outbound, reader, writer });
        Ok(inbox_rx)
    }

    fn announce_presence(&mut self, me: &PeerRecord) -> Result<(), TransportError> {
        self.broadcast(SyncMessage::from(me).to_frame())
    }

    fn broadcast(&mut self, frame: Frame) -> Result<(), TransportError> {
        self.outbound()?.try_send(frame).map_err(|e| match e {
            TrySendError::Full(_) => TransportError::QueueFull,
            TrySendError::Closed(_) => TransportError::Closed,
        })
    }

    async fn unsubscribe(&mut self) {
        self.disconnect().await;
    }
}

impl Drop for WsTransport {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.take() {
            connection.reader.abort();
            connection.writer.abort();
        }
    }
}

#[cfg(test)]
#[path = "ws_test.rs"]
mod ws_test;
