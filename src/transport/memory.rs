//! In-process room hub.
//!
//! DESIGN
//! ======
//! `LocalHub` is a cloneable handle to a shared room registry. Each room
//! maps client ids to a bounded sender; a member is listed in the roster
//! once it has announced a `PeerRecord`. Every membership change pushes a
//! full `room:roster` frame to all members, so subscribers never have to
//! reconstruct membership from join/part deltas alone.
//!
//! Fan-out uses `try_send`: a member whose queue is full misses the frame
//! rather than stalling the sender.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{info, warn};

use super::{Transport, TransportError, validate_name};
use crate::consts::CHANNEL_CAPACITY;
use crate::frame::Frame;
use crate::presence::PeerRecord;
use crate::sync::{SyncMessage, roster_frame};

// =============================================================================
// HUB
// =============================================================================

struct Member {
    record: Option<PeerRecord>,
    tx: mpsc::Sender<Frame>,
}

#[derive(Default)]
struct Room {
    /// Keyed by client id; ordered so rosters are stable.
    members: BTreeMap<String, Member>,
}

impl Room {
    fn roster(&self) -> Vec<PeerRecord> {
        self.members.values().filter_map(|m| m.record.clone()).collect()
    }

    fn send_all(&self, room: &str, frame: &Frame, exclude: Option<&str>) {
        for (client_id, member) in &self.members {
            if exclude == Some(client_id.as_str()) {
                continue;
            }
            match member.tx.try_send(frame.clone()) {
                Ok(()) | Err(TrySendError::Closed(_)) => {}
                Err(TrySendError::Full(_)) => {
                    warn!(%room, %client_id, syscall = %frame.syscall, "hub: member queue full; frame dropped");
                }
            }
        }
    }

    fn send_roster(&self, room: &str) {
        let frame = roster_frame(&self.roster()).with_room(room);
        self.send_all(room, &frame, None);
    }
}

/// Shared registry of rooms and their members.
#[derive(Clone, Default)]
pub struct LocalHub {
    rooms: Arc<Mutex<HashMap<String, Room>>>,
}

impl LocalHub {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn with_rooms<R>(&self, f: impl FnOnce(&mut HashMap<String, Room>) -> R) -> R {
        let mut rooms = self.rooms.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut rooms)
    }

    /// Register `client_id` in `room` and return its inbound queue.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateClient` when the id is already a member.
    pub fn subscribe(&self, room: &str, client_id: &str) -> Result<mpsc::Receiver<Frame>, TransportError> {
        self.with_rooms(|rooms| {
            let entry = rooms.entry(room.to_owned()).or_default();
            if entry.members.contains_key(client_id) {
                return Err(TransportError::DuplicateClient(client_id.to_owned()));
            }
            let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
            entry.members.insert(client_id.to_owned(), Member { record: None, tx });
            info!(%room, %client_id, members = entry.members.len(), "hub: member subscribed");
            Ok(rx)
        })
    }

    /// Attach a presence record to a member. Peers get `room:join`, and
    /// everyone (the announcer included) gets the new roster.
    ///
    /// Returns `false` when `client_id` is not subscribed to `room`.
    pub fn announce(&self, room: &str, client_id: &str, record: PeerRecord) -> bool {
        self.with_rooms(|rooms| {
            let Some(entry) = rooms.get_mut(room) else {
                return false;
            };
            let Some(member) = entry.members.get_mut(client_id) else {
                return false;
            };
            let join = SyncMessage::from(&record).to_frame().with_room(room).with_from(client_id);
            member.record = Some(record);
            entry.send_all(room, &join, Some(client_id));
            entry.send_roster(room);
            true
        })
    }

    /// Fan a frame out to every member except the sender, stamping routing fields.
    ///
    /// Returns `false` when the sender is not subscribed to `room`.
    pub fn publish(&self, room: &str, client_id: &str, mut frame: Frame) -> bool {
        self.with_rooms(|rooms| {
            let Some(entry) = rooms.get(room) else {
                return false;
            };
            if !entry.members.contains_key(client_id) {
                return false;
            }
            frame.room = Some(room.to_owned());
            frame.from = Some(client_id.to_owned());
            entry.send_all(room, &frame, Some(client_id));
            true
        })
    }

    /// Remove a member. Remaining members get `room:part` (if it had
    /// announced) and a fresh roster. Empty rooms are dropped.
    pub fn unsubscribe(&self, room: &str, client_id: &str) {
        self.with_rooms(|rooms| {
            let Some(entry) = rooms.get_mut(room) else {
                return;
            };
            let Some(member) = entry.members.remove(client_id) else {
                return;
            };
            info!(%room, %client_id, members = entry.members.len(), "hub: member unsubscribed");
            if entry.members.is_empty() {
                rooms.remove(room);
                return;
            }
            if let Some(record) = member.record {
                let part = SyncMessage::Leave { id: record.id }.to_frame().with_room(room).with_from(client_id);
                entry.send_all(room, &part, None);
                entry.send_roster(room);
            }
        });
    }

    /// Announced members of `room`, ordered by client id.
    #[must_use]
    pub fn roster(&self, room: &str) -> Vec<PeerRecord> {
        self.with_rooms(|rooms| rooms.get(room).map(Room::roster).unwrap_or_default())
    }

    /// Subscribed members of `room`, announced or not.
    #[must_use]
    pub fn member_count(&self, room: &str) -> usize {
        self.with_rooms(|rooms| rooms.get(room).map_or(0, |r| r.members.len()))
    }

    #[must_use]
    pub fn contains(&self, room: &str, client_id: &str) -> bool {
        self.with_rooms(|rooms| rooms.get(room).is_some_and(|r| r.members.contains_key(client_id)))
    }
}

// =============================================================================
// TRANSPORT
// =============================================================================

/// `Transport` over a shared `LocalHub`.
pub struct MemoryTransport {
    hub: LocalHub,
    client_id: String,
    room: Option<String>,
}

impl MemoryTransport {
    pub fn new(hub: LocalHub, client_id: impl Into<String>) -> Self {
        Self { hub, client_id: client_id.into(), room: None }
    }

    #[must_use]
    pub fn room(&self) -> Option<&str> {
        self.room.as_deref()
    }

    fn current_room(&self) -> Result<&str, TransportError> {
        self.room.as_deref().ok_or(TransportError::NotSubscribed)
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn subscribe(&mut self, room: &str) -> Result<mpsc::Receiver<Frame>, TransportError> {
        validate_name("room", room)?;
        if let Some(previous) = self.room.take() {
            self.hub.unsubscribe(&previous, &self.client_id);
        }
        let rx = self.hub.subscribe(room, &self.client_id)?;
        self.room = Some(room.to_owned());
        Ok(rx)
    }

    fn announce_presence(&mut self, me: &PeerRecord) -> Result<(), TransportError> {
        let room = self.current_room()?;
        if self.hub.announce(room, &self.client_id, me.clone()) { Ok(()) } else { Err(TransportError::Closed) }
    }

    fn broadcast(&mut self, frame: Frame) -> Result<(), TransportError> {
        let room = self.current_room()?;
        if self.hub.publish(room, &self.client_id, frame) { Ok(()) } else { Err(TransportError::Closed) }
    }

    async fn unsubscribe(&mut self) {
        if let Some(room) = self.room.take() {
            self.hub.unsubscribe(&room, &self.client_id);
        }
    }
}

impl Drop for MemoryTransport {
    fn drop(&mut self) {
        if let Some(room) = self.room.take() {
            self.hub.unsubscribe(&room, &self.client_id);
        }
    }
}

#[cfg(test)]
#[path = "memory_test.rs"]
mod memory_test;
