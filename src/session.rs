//! Editor session: one editor's document, history, presence and room link.
//!
//! DESIGN
//! ======
//! `EditorSession` is the single owner of everything a collaborating editor
//! needs: the document store and clipboard, the history stack, the presence
//! directory, the cursor throttle, the transport and its inbox. Nothing is
//! process-global; two sessions in one process are fully independent.
//!
//! Local command flow: store mutates the document → history commits the
//! new state (notifying the commit sink) → mutations are broadcast.
//! Undo/redo adopt a snapshot wholesale and broadcast the difference so
//! peers follow.
//!
//! Inbound flow: frames from the inbox are decoded in `sync` and folded
//! into the store (never into history) or into the presence directory.
//! Everything runs on the caller's task; there is no internal concurrency.
//!
//! ERROR HANDLING
//! ==============
//! - Rejected local commands return `ValidationError` and change nothing.
//! - Rejected inbound frames are logged and dropped.
//! - Unreadable history entries are logged; undo/redo report `false`.
//! - Transport failures degrade the session to `Offline`: editing continues
//!   locally and an injected `PresenceSimulation`, if any, takes over the
//!   presence directory. There is no automatic reconnect; call `join` again.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::SessionConfig;
use crate::cursor::CursorBroadcaster;
use crate::doc::{CanvasDocument, CanvasObject, ObjectId, ObjectPatch, ValidationError};
use crate::frame::{Frame, now_ms};
use crate::history::{HistoryManager, SnapshotError};
use crate::persistence::{CommitSink, DocumentRepository, PendingSnapshot, spawn_persistence_task};
use crate::presence::{PeerRecord, Point, PresenceDirectory};
use crate::simulation::PresenceSimulation;
use crate::store::DocumentStore;
use crate::sync::{InboundEvent, ObjectMutation, SyncMessage, apply_mutation};
use crate::transport::{ConnectionStatus, Transport, TransportError};

enum Wake {
    Frame(Frame),
    InboxClosed,
    CursorDue,
}

pub struct EditorSession<T: Transport> {
    config: SessionConfig,
    me: PeerRecord,
    store: DocumentStore,
    history: HistoryManager,
    presence: PresenceDirectory,
    cursor: CursorBroadcaster,
    transport: T,
    inbox: Option<mpsc::Receiver<Frame>>,
    room: Option<String>,
    status: ConnectionStatus,
    simulation: Option<Box<dyn PresenceSimulation>>,
}

impl<T: Transport> EditorSession<T> {
    /// Start a session on `initial`, which also seeds the history stack.
    pub fn new(
        config: SessionConfig,
        me: PeerRecord,
        transport: T,
        initial: CanvasDocument,
        sink: impl CommitSink + 'static,
    ) -> Self {
        let history = HistoryManager::new(&initial, config.history_limit, sink);
        let presence = PresenceDirectory::new(me.id.clone());
        let cursor = CursorBroadcaster::new(config.cursor_interval);
        let store = DocumentStore::new(initial, config.paste_offset);
        Self {
            config,
            me,
            store,
            history,
            presence,
            cursor,
            transport,
            inbox: None,
            room: None,
            status: ConnectionStatus::Disconnected,
            simulation: None,
        }
    }

    /// Presence strategy used while the transport is unavailable.
    #[must_use]
    /// Like `new`, with commits flushed to `repository` every
    /// `config.persist_interval`. Abort the returned task on shutdown.
    pub fn with_repository(
        config: SessionConfig,
        me: PeerRecord,
        transport: T,
        initial: CanvasDocument,
        repository: Arc<dyn DocumentRepository>,
    ) -> (Self, JoinHandle<()>) {
        let pending = PendingSnapshot::new();
        let flush = spawn_persistence_task(pending.clone(), repository, config.persist_interval);
        (Self::new(config, me, transport, initial, pending), flush)
    }

    pub fn with_simulation(mut self, simulation: impl PresenceSimulation + 'static) -> Self {
        self.simulation = Some(Box::new(simulation));
        self
    }

    // =========================================================================
    // LIFECYCLE
    // =========================================================================

    /// Subscribe to `room` and announce ourselves. Leaves any previous room.
    ///
    /// Resolves to `Connected`, or `Offline` if the transport failed.
    pub async fn join(&mut self, room: &str) -> ConnectionStatus {
        if self.room.is_some() {
            self.leave().await;
        }
        self.room = Some(room.to_owned());

        match self.transport.subscribe(room).await {
            Ok(inbox) => {
                self.inbox = Some(inbox);
                self.status = ConnectionStatus::Connected;
                if let Err(e) = self.transport.announce_presence(&self.me) {
                    self.go_offline(&e);
                } else {
                    info!(%room, participant = %self.me.id, "session: joined room");
                }
            }
            Err(e) => self.go_offline(&e),
        }
        self.status
    }

    /// Unsubscribe, drop pending inbound frames and clear presence.
    pub async fn leave(&mut self) {
        if let Some(room) = self.room.take() {
            self.transport.unsubscribe().await;
            info!(%room, participant = %self.me.id, "session: left room");
        }
        self.inbox = None;
        self.cursor.cancel();
        self.presence.clear();
        self.status = ConnectionStatus::Disconnected;
    }

    /// Leave the room and hand back the final document.
    pub async fn close(mut self) -> CanvasDocument {
        self.leave().await;
        self.store.into_document()
    }

    fn go_offline(&mut self, error: &TransportError) {
        warn!(room = ?self.room, error = %error, "session: transport unavailable; continuing offline");
        self.status = ConnectionStatus::Offline;
        self.inbox = None;
        self.cursor.cancel();
        self.presence.clear();
        if let Some(simulation) = self.simulation.as_mut() {
            simulation.seed(&mut self.presence, now_ms());
        }
    }

    // =========================================================================
    // LOCAL COMMANDS
    // =========================================================================

    /// # Errors
    ///
    /// Returns `DuplicateObject` or a field-level failure; nothing changes.
    pub fn add_object(&mut self, obj: CanvasObject) -> Result<(), ValidationError> {
        let mutations = self.store.add_object(obj)?;
        self.commit_and_publish(mutations);
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `UnknownObject` or the first invalid field; nothing changes.
    pub fn update_object(&mut self, id: &str, changes: ObjectPatch) -> Result<(), ValidationError> {
        let mutations = self.store.update_object(id, changes)?;
        self.commit_and_publish(mutations);
        Ok(())
    }

    /// Remove listed objects; unknown ids are skipped. Returns how many went.
    pub fn remove_objects<I, S>(&mut self, ids: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mutations = self.store.remove_objects(ids);
        let removed = mutations.len();
        self.commit_and_publish(mutations);
        removed
    }

    /// # Errors
    ///
    /// Returns `UnknownObject` when `id` is not present.
    pub fn reorder(&mut self, id: &str, to_index: usize) -> Result<(), ValidationError> {
        let mutations = self.store.reorder(id, to_index)?;
        self.commit_and_publish(mutations);
        Ok(())
    }

    pub fn set_selection<I, S>(&mut self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<ObjectId>,
    {
        self.store.set_selection(ids);
    }

    pub fn copy(&mut self) -> usize {
        self.store.copy_selection()
    }

    pub fn paste(&mut self) -> usize {
        let mutations = self.store.paste();
        let pasted = mutations.len();
        self.commit_and_publish(mutations);
        pasted
    }

    pub fn delete_selection(&mut self) -> usize {
        let mutations = self.store.delete_selection();
        let removed = mutations.len();
        self.commit_and_publish(mutations);
        removed
    }

    /// Step back one commit. Returns `false` at the bottom of the stack or
    /// when the target snapshot is unreadable.
    pub fn undo(&mut self) -> bool {
        let restored = self.history.undo();
        self.adopt_snapshot("undo", restored)
    }

    /// Step forward one commit. Returns `false` at the top of the stack or
    /// when the target snapshot is unreadable.
    pub fn redo(&mut self) -> bool {
        let restored = self.history.redo();
        self.adopt_snapshot("redo", restored)
    }

    fn adopt_snapshot(
        &mut self,
        action: &'static str,
        restored: Result<Option<CanvasDocument>, SnapshotError>,
    ) -> bool {
        match restored {
            Ok(Some(document)) => {
                let mutations = self.store.adopt(document);
                self.publish(mutations);
                true
            }
            Ok(None) => false,
            Err(e) => {
                error!(%action, error = %e, "session: history entry unreadable; document unchanged");
                false
            }
        }
    }

    fn commit_and_publish(&mut self, mutations: Vec<ObjectMutation>) {
        if mutations.is_empty() {
            return;
        }
        self.history.commit(self.store.document());
        self.publish(mutations);
    }

    fn publish(&mut self, mutations: Vec<ObjectMutation>) {
        for mutation in mutations {
            self.send(SyncMessage::from(mutation).to_frame());
        }
    }

    fn send(&mut self, frame: Frame) {
        if self.status != ConnectionStatus::Connected {
            return;
        }
        match self.transport.broadcast(frame) {
            Ok(()) => {}
            Err(TransportError::QueueFull) => warn!("session: outbound queue full; frame dropped"),
            Err(e) => self.go_offline(&e),
        }
    }

    // =========================================================================
    // CURSOR
    // =========================================================================

    /// Record local pointer movement. Sent at most once per throttle window.
    pub fn move_cursor(&mut self, position: Point) {
        self.cursor.record(position);
        self.flush_cursor();
    }

    /// Send the pending cursor position if its window has elapsed.
    pub fn flush_cursor(&mut self) -> bool {
        let Some(position) = self.cursor.poll() else {
            return false;
        };
        let message = SyncMessage::Cursor { id: self.me.id.clone(), x: position.x, y: position.y };
        self.send(message.to_frame());
        true
    }

    // =========================================================================
    // INBOUND
    // =========================================================================

    /// Decode and apply one inbound frame. Returns `false` if it was rejected
    /// or had no effect.
    pub fn handle_frame(&mut self, frame: &Frame) -> bool {
        match InboundEvent::from_frame(frame) {
            Ok(InboundEvent::RosterSync(members)) => {
                self.presence.sync_roster(&members, now_ms());
                true
            }
            Ok(InboundEvent::Message(message)) => self.apply_message(message),
            Err(e) => {
                warn!(syscall = %frame.syscall, from = ?frame.from, error = %e, "session: inbound frame rejected");
                false
            }
        }
    }

    fn apply_message(&mut self, message: SyncMessage) -> bool {
        let now = now_ms();
        match message {
            SyncMessage::Join { id, display_name } => self.presence.join(&PeerRecord { id, display_name }, now),
            SyncMessage::Leave { id } => self.presence.leave(&id).is_some(),
            SyncMessage::Cursor { id, x, y } => self.presence.update_cursor(&id, Point::new(x, y), now),
            SyncMessage::ObjectMutation(mutation) => match apply_mutation(self.store.document_mut(), &mutation) {
                Ok(()) => true,
                Err(e) => {
                    warn!(
                        object_id = %mutation.object_id(),
                        kind = ?mutation.kind(),
                        error = %e,
                        "session: remote mutation ignored"
                    );
                    false
                }
            },
        }
    }

    /// Apply every frame already queued, without waiting. Returns how many
    /// frames were taken off the inbox.
    pub fn drain_inbound(&mut self) -> usize {
        let mut taken = 0;
        loop {
            let next = match self.inbox.as_mut() {
                Some(inbox) => inbox.try_recv(),
                None => break,
            };
            match next {
                Ok(frame) => {
                    taken += 1;
                    self.handle_frame(&frame);
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.go_offline(&TransportError::Closed);
                    break;
                }
            }
        }
        self.expire_idle_cursors();
        taken
    }

    /// Wait for the next inbound frame or cursor deadline and handle it.
    ///
    /// Returns `false` immediately when there is nothing to wait for.
    pub async fn tick(&mut self) -> bool {
        let deadline = self.cursor.deadline().map(tokio::time::Instant::from_std);
        let wake = match (self.inbox.as_mut(), deadline) {
            (Some(inbox), Some(at)) => tokio::select! {
                frame = inbox.recv() => frame.map_or(Wake::InboxClosed, Wake::Frame),
                () = tokio::time::sleep_until(at) => Wake::CursorDue,
            },
            (Some(inbox), None) => inbox.recv().await.map_or(Wake::InboxClosed, Wake::Frame),
            (None, Some(at)) => {
                tokio::time::sleep_until(at).await;
                Wake::CursorDue
            }
            (None, None) => return false,
        };

        match wake {
            Wake::Frame(frame) => {
                self.handle_frame(&frame);
            }
            Wake::InboxClosed => self.go_offline(&TransportError::Closed),
            Wake::CursorDue => {}
        }
        self.flush_cursor();
        self.expire_idle_cursors();
        true
    }

    /// Advance the offline presence simulation. No-op unless offline.
    pub fn step_simulation(&mut self) -> bool {
        if self.status != ConnectionStatus::Offline {
            return false;
        }
        let Some(simulation) = self.simulation.as_mut() else {
            return false;
        };
        simulation.step(&mut self.presence, now_ms());
        true
    }

    fn expire_idle_cursors(&mut self) {
        let Some(idle) = self.config.cursor_idle else {
            return;
        };
        let idle_ms = i64::try_from(idle.as_millis()).unwrap_or(i64::MAX);
        let expired = self.presence.expire_idle_cursors(now_ms(), idle_ms);
        if expired > 0 {
            info!(expired, "session: idle remote cursors cleared");
        }
    }

    // =========================================================================
    // ACCESSORS
    // =========================================================================

    #[must_use]
    pub fn document(&self) -> &CanvasDocument {
        self.store.document()
    }

    #[must_use]
    pub fn presence(&self) -> &PresenceDirectory {
        &self.presence
    }

    #[must_use]
    pub fn history(&self) -> &HistoryManager {
        &self.history
    }

    #[must_use]
    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    #[must_use]
    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    #[must_use]
    pub fn clipboard_len(&self) -> usize {
        self.store.clipboard_len()
    }

    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    #[must_use]
    pub fn room(&self) -> Option<&str> {
        self.room.as_deref()
    }

    #[must_use]
    pub fn me(&self) -> &PeerRecord {
        &self.me
    }

    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    #[must_use]
    pub fn transport(&self) -> &T {
        &self.transport
    }
}

#[cfg(test)]
#[path = "session_test.rs"]
mod session_test;
