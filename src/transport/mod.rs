//! Transport: room-scoped pub/sub that moves frames between peers.
//!
//! DESIGN
//! ======
//! A transport knows rooms, members and frames. It does not know what a
//! frame means: decoding and validation happen in `sync`. Any substrate
//! that can subscribe to a room, announce the local participant, fan a
//! frame out to peers and leave again satisfies `Transport`.
//!
//! `subscribe` and `unsubscribe` are async because they may touch the
//! network. `announce_presence` and `broadcast` only enqueue; delivery is
//! best effort and a full queue drops the frame.
//!
//! Implementations:
//! - `memory`: in-process hub, used by tests, demos and the relay.
//! - `ws`: WebSocket client for a remote relay.

pub mod memory;
pub mod ws;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::frame::Frame;
use crate::presence::PeerRecord;

// =============================================================================
// TYPES
// =============================================================================

/// Where a session stands with respect to its room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// Not in a room.
    Disconnected,
    /// Subscribed and exchanging frames with peers.
    Connected,
    /// The transport failed; editing continues locally.
    Offline,
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("websocket connect failed: {0}")]
    Connect(Box<tokio_tungstenite::tungstenite::Error>),
    #[error("transport closed")]
    Closed,
    #[error("not subscribed to a room")]
    NotSubscribed,
    #[error("invalid {kind}: {value:?}")]
    InvalidName { kind: &'static str, value: String },
    #[error("client {0} is already in the room")]
    DuplicateClient(String),
    #[error("outbound queue full")]
    QueueFull,
}

/// Room-scoped channel abstraction.
#[async_trait]
pub trait Transport: Send {
    /// Enter `room`. Inbound frames (roster syncs included) arrive on the
    /// returned receiver until `unsubscribe`.
    async fn subscribe(&mut self, room: &str) -> Result<mpsc::Receiver<Frame>, TransportError>;

    /// Tell the room who the local participant is.
    fn announce_presence(&mut self, me: &PeerRecord) -> Result<(), TransportError>;

    /// Send a frame to every other member of the room. Fire and forget.
    fn broadcast(&mut self, frame: Frame) -> Result<(), TransportError>;

    /// Leave the current room, if any.
    async fn unsubscribe(&mut self);
}

// =============================================================================
// HELPERS
// =============================================================================

const MAX_NAME_LEN: usize = 128;

/// Room names and client ids travel in URLs; keep them to a safe charset.
///
/// # Errors
///
/// Returns `InvalidName` for empty, over-long or non `[A-Za-z0-9._-]` values.
pub fn validate_name(kind: &'static str, value: &str) -> Result<(), TransportError> {
    let ok = !value.is_empty()
        && value.len() <= MAX_NAME_LEN
        && value
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'));
    if ok { Ok(()) } else { Err(TransportError::InvalidName { kind, value: value.to_owned() }) }
}
