#![allow(clippy::float_cmp)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::timeout;

use super::*;
use crate::doc::ObjectKind;
use crate::frame::Data;
use crate::persistence::{DocumentRepository, NoPersistence, PendingSnapshot, PersistenceError};
use crate::simulation::RandomWalk;
use crate::sync::SYSCALL_UPDATE;
use crate::transport::memory::{LocalHub, MemoryTransport};

const ROOM: &str = "proj-1";

fn session(hub: &LocalHub, id: &str, name: &str) -> EditorSession<MemoryTransport> {
    EditorSession::new(
        SessionConfig::default(),
        PeerRecord::new(id, name),
        MemoryTransport::new(hub.clone(), id),
        CanvasDocument::new(),
        NoPersistence,
    )
}

fn rect(id: &str, x: f64, y: f64) -> CanvasObject {
    CanvasObject::new(id, ObjectKind::Rectangle, x, y, 100.0, 60.0)
}

fn position(s: &EditorSession<MemoryTransport>, id: &str) -> (f64, f64) {
    let obj = s.document().get(id).expect("object present");
    (obj.x, obj.y)
}

async fn joined_pair() -> (LocalHub, EditorSession<MemoryTransport>, EditorSession<MemoryTransport>) {
    let hub = LocalHub::new();
    let mut a = session(&hub, "a", "Ann");
    let mut b = session(&hub, "b", "Bea");
    assert_eq!(a.join(ROOM).await, ConnectionStatus::Connected);
    assert_eq!(b.join(ROOM).await, ConnectionStatus::Connected);
    a.drain_inbound();
    b.drain_inbound();
    (hub, a, b)
}

// =============================================================================
// Test transports
// =============================================================================

/// Transport whose subscribe always fails.
struct Unreachable;

#[async_trait]
impl Transport for Unreachable {
    async fn subscribe(&mut self, _room: &str) -> Result<mpsc::Receiver<Frame>, TransportError> {
        Err(TransportError::Closed)
    }
    fn announce_presence(&mut self, _me: &PeerRecord) -> Result<(), TransportError> {
        Err(TransportError::NotSubscribed)
    }
    fn broadcast(&mut self, _frame: Frame) -> Result<(), TransportError> {
        Err(TransportError::NotSubscribed)
    }
    async fn unsubscribe(&mut self) {}
}

/// Transport that subscribes, records sent frames and can be told to fail.
#[derive(Clone, Default)]
struct Recorder {
    sent: Arc<Mutex<Vec<Frame>>>,
    fail_broadcast: Arc<Mutex<bool>>,
    inbox: Arc<Mutex<Option<mpsc::Sender<Frame>>>>,
}

impl Recorder {
    fn sent(&self) -> Vec<Frame> {
        self.sent.lock().unwrap().clone()
    }
    fn break_link(&self) {
        *self.fail_broadcast.lock().unwrap() = true;
    }
    fn deliver(&self, frame: Frame) {
        let tx = self.inbox.lock().unwrap().clone().expect("subscribed");
        tx.try_send(frame).unwrap();
    }
}

#[async_trait]
impl Transport for Recorder {
    async fn subscribe(&mut self, _room: &str) -> Result<mpsc::Receiver<Frame>, TransportError> {
        let (tx, rx) = mpsc::channel(16);
        *self.inbox.lock().unwrap() = Some(tx);
        Ok(rx)
    }
    fn announce_presence(&mut self, me: &PeerRecord) -> Result<(), TransportError> {
        self.broadcast(SyncMessage::from(me).to_frame())
    }
    fn broadcast(&mut self, frame: Frame) -> Result<(), TransportError> {
        if *self.fail_broadcast.lock().unwrap() {
            return Err(TransportError::Closed);
        }
        self.sent.lock().unwrap().push(frame);
        Ok(())
    }
    async fn unsubscribe(&mut self) {
        self.inbox.lock().unwrap().take();
    }
}

fn recorder_session(recorder: &Recorder) -> EditorSession<Recorder> {
    EditorSession::new(
        SessionConfig::default(),
        PeerRecord::new("me", "Me"),
        recorder.clone(),
        CanvasDocument::new(),
        NoPersistence,
    )
}

// =============================================================================
// Two-client scenarios
// =============================================================================

#[tokio::test]
async fn peers_see_each_other_after_join() {
    let (_hub, a, b) = joined_pair().await;
    assert!(a.presence().contains("b"));
    assert!(b.presence().contains("a"));
    assert!(!a.presence().contains("a"));
    assert_eq!(a.presence().get("b").unwrap().display_name, "Bea");
}

#[tokio::test]
async fn created_object_reaches_peer() {
    let (_hub, mut a, mut b) = joined_pair().await;
    a.add_object(rect("rect-1", 0.0, 0.0)).unwrap();
    b.drain_inbound();
    assert_eq!(position(&b, "rect-1"), (0.0, 0.0));
}

#[tokio::test]
async fn concurrent_moves_resolve_by_arrival_order_per_client() {
    let (_hub, mut a, mut b) = joined_pair().await;
    a.add_object(rect("rect-1", 0.0, 0.0)).unwrap();
    b.drain_inbound();

    // Both edit before either has seen the other's change.
    b.update_object("rect-1", ObjectPatch::position(200.0, 200.0)).unwrap();
    a.update_object("rect-1", ObjectPatch::position(120.0, 80.0)).unwrap();

    a.drain_inbound();
    b.drain_inbound();

    // Each client ends with the last mutation it received: no midpoint.
    assert_eq!(position(&a, "rect-1"), (200.0, 200.0));
    assert_eq!(position(&b, "rect-1"), (120.0, 80.0));
}

#[tokio::test]
async fn leaving_peer_disappears_and_forgets_others() {
    let (_hub, mut a, mut b) = joined_pair().await;
    a.move_cursor(Point::new(1.0, 1.0));
    timeout(Duration::from_secs(1), a.tick()).await.unwrap();
    b.drain_inbound();
    assert!(b.presence().get("a").and_then(|p| p.cursor).is_some());

    b.leave().await;
    a.drain_inbound();

    assert!(!a.presence().contains("b"));
    assert!(b.presence().is_empty());
    assert_eq!(b.status(), ConnectionStatus::Disconnected);
}

#[tokio::test]
async fn remote_mutations_bypass_history() {
    let (_hub, mut a, mut b) = joined_pair().await;
    a.add_object(rect("rect-1", 0.0, 0.0)).unwrap();
    b.drain_inbound();
    assert!(b.document().contains("rect-1"));
    assert!(!b.can_undo());
    assert_eq!(b.history().len(), 1);
}

#[tokio::test]
async fn undo_and_redo_are_mirrored_to_peers() {
    let (_hub, mut a, mut b) = joined_pair().await;
    a.add_object(rect("rect-1", 0.0, 0.0)).unwrap();
    a.update_object("rect-1", ObjectPatch::position(50.0, 50.0)).unwrap();
    b.drain_inbound();

    assert!(a.undo());
    b.drain_inbound();
    assert_eq!(position(&b, "rect-1"), (0.0, 0.0));

    assert!(a.undo());
    b.drain_inbound();
    assert!(!b.document().contains("rect-1"));

    assert!(a.redo());
    b.drain_inbound();
    assert_eq!(position(&b, "rect-1"), (0.0, 0.0));
}

#[tokio::test]
async fn undo_clears_text_on_peers() {
    let (_hub, mut a, mut b) = joined_pair().await;
    a.add_object(rect("rect-1", 0.0, 0.0)).unwrap();
    let label = ObjectPatch { text: Some("hello".into()), ..ObjectPatch::default() };
    a.update_object("rect-1", label).unwrap();
    b.drain_inbound();
    assert_eq!(b.document().get("rect-1").unwrap().style.text.as_deref(), Some("hello"));

    assert!(a.undo());
    b.drain_inbound();

    assert_eq!(a.document().get("rect-1").unwrap().style.text, None);
    assert_eq!(b.document().get("rect-1").unwrap().style.text, None);
    assert_eq!(a.document().objects(), b.document().objects());
}

#[tokio::test]
async fn cursor_broadcast_carries_latest_position() {
    let (_hub, mut a, mut b) = joined_pair().await;
    for i in 0..10 {
        a.move_cursor(Point::new(f64::from(i), 0.0));
    }
    b.drain_inbound();
    assert!(b.presence().get("a").and_then(|p| p.cursor).is_none());

    timeout(Duration::from_secs(1), a.tick()).await.unwrap();
    b.drain_inbound();
    assert_eq!(b.presence().get("a").and_then(|p| p.cursor), Some(Point::new(9.0, 0.0)));
}

#[tokio::test]
async fn tick_applies_inbound_frames() {
    let (_hub, mut a, mut b) = joined_pair().await;
    a.add_object(rect("rect-1", 3.0, 4.0)).unwrap();
    assert!(timeout(Duration::from_secs(1), b.tick()).await.unwrap());
    assert_eq!(position(&b, "rect-1"), (3.0, 4.0));
}

#[tokio::test]
async fn paste_and_delete_propagate() {
    let (_hub, mut a, mut b) = joined_pair().await;
    a.add_object(rect("rect-1", 0.0, 0.0)).unwrap();
    a.set_selection(["rect-1"]);
    assert_eq!(a.copy(), 1);
    assert_eq!(a.paste(), 1);
    b.drain_inbound();
    assert_eq!(b.document().len(), 2);

    assert_eq!(a.delete_selection(), 1);
    b.drain_inbound();
    assert_eq!(b.document().len(), 1);
    assert!(b.document().contains("rect-1"));
}

#[tokio::test]
async fn selection_is_never_shared() {
    let (_hub, mut a, mut b) = joined_pair().await;
    a.add_object(rect("rect-1", 0.0, 0.0)).unwrap();
    b.drain_inbound();
    let history_len = a.history().len();

    a.set_selection(["rect-1"]);
    assert_eq!(b.drain_inbound(), 0);
    assert!(b.document().selection().is_empty());
    assert_eq!(a.history().len(), history_len);
}

// =============================================================================
// Inbound validation
// =============================================================================

#[tokio::test]
async fn malformed_or_unknown_frames_are_dropped() {
    let (_hub, mut a, _b) = joined_pair().await;
    a.add_object(rect("rect-1", 0.0, 0.0)).unwrap();
    let before = a.document().clone();

    let bad_patch = Frame::new(SYSCALL_UPDATE, Data::new())
        .with_data("id", "rect-1")
        .with_data("changes", serde_json::json!({"x": "far"}));
    assert!(!a.handle_frame(&bad_patch));

    let unknown = SyncMessage::from(ObjectMutation::Updated {
        object_id: "ghost".into(),
        changes: ObjectPatch::position(1.0, 1.0),
    });
    assert!(!a.handle_frame(&unknown.to_frame()));
    assert!(!a.handle_frame(&Frame::new("board:explode", Data::new())));

    assert_eq!(a.document(), &before);
}

// =============================================================================
// Degraded transport
// =============================================================================

#[tokio::test]
async fn failed_subscribe_goes_offline_with_simulation() {
    let walkers = vec![PeerRecord::new("sim-1", "Sim")];
    let mut s = EditorSession::new(
        SessionConfig::default(),
        PeerRecord::new("me", "Me"),
        Unreachable,
        CanvasDocument::new(),
        NoPersistence,
    )
    .with_simulation(RandomWalk::new(walkers, 5));

    assert_eq!(s.join(ROOM).await, ConnectionStatus::Offline);
    assert!(s.presence().contains("sim-1"));
    assert!(s.step_simulation());

    s.add_object(rect("rect-1", 0.0, 0.0)).unwrap();
    assert!(s.can_undo());
    assert!(s.undo());
    assert!(s.document().is_empty());
}

#[tokio::test]
async fn failed_subscribe_without_simulation_leaves_directory_empty() {
    let mut s = EditorSession::new(
        SessionConfig::default(),
        PeerRecord::new("me", "Me"),
        Unreachable,
        CanvasDocument::new(),
        NoPersistence,
    );
    assert_eq!(s.join(ROOM).await, ConnectionStatus::Offline);
    assert!(s.presence().is_empty());
    assert!(!s.step_simulation());
    assert!(!s.tick().await);
}

#[tokio::test]
async fn broadcast_failure_degrades_but_keeps_edit() {
    let recorder = Recorder::default();
    let mut s = recorder_session(&recorder);
    assert_eq!(s.join(ROOM).await, ConnectionStatus::Connected);

    recorder.break_link();
    s.add_object(rect("rect-1", 0.0, 0.0)).unwrap();

    assert_eq!(s.status(), ConnectionStatus::Offline);
    assert!(s.document().contains("rect-1"));
    assert!(s.can_undo());
}

#[tokio::test]
async fn local_edit_is_applied_before_broadcast() {
    let recorder = Recorder::default();
    let mut s = recorder_session(&recorder);
    s.join(ROOM).await;
    s.add_object(rect("rect-1", 0.0, 0.0)).unwrap();

    let sent = recorder.sent();
    assert_eq!(sent.len(), 2, "join announcement plus one create");
    assert_eq!(sent[1].syscall, crate::sync::SYSCALL_CREATE);
    assert!(s.document().contains("rect-1"));
}

#[tokio::test]
async fn closed_inbox_degrades_to_offline() {
    let recorder = Recorder::default();
    let mut s = recorder_session(&recorder);
    s.join(ROOM).await;
    recorder.deliver(crate::sync::roster_frame(&[PeerRecord::new("x", "Xi")]));
    recorder.inbox.lock().unwrap().take();

    assert_eq!(s.drain_inbound(), 1);
    assert!(s.presence().is_empty());
    assert_eq!(s.status(), ConnectionStatus::Offline);
}

#[tokio::test]
async fn rejoin_after_offline_reconnects() {
    let recorder = Recorder::default();
    let mut s = recorder_session(&recorder);
    s.join(ROOM).await;
    recorder.inbox.lock().unwrap().take();
    s.drain_inbound();
    assert_eq!(s.status(), ConnectionStatus::Offline);

    assert_eq!(s.join(ROOM).await, ConnectionStatus::Connected);
    assert_eq!(s.room(), Some(ROOM));
}

// =============================================================================
// History and persistence wiring
// =============================================================================

#[tokio::test]
async fn commits_reach_the_sink() {
    let pending = PendingSnapshot::new();
    let mut s = EditorSession::new(
        SessionConfig::default(),
        PeerRecord::new("me", "Me"),
        Unreachable,
        CanvasDocument::new(),
        pending.clone(),
    );
    assert!(!pending.is_dirty());
    s.add_object(rect("rect-1", 0.0, 0.0)).unwrap();
    assert!(pending.is_dirty());
}

#[derive(Default)]
struct SavedCounts(Mutex<Vec<usize>>);

#[async_trait]
impl DocumentRepository for SavedCounts {
    async fn save(&self, document: &CanvasDocument) -> Result<(), PersistenceError> {
        self.0.lock().unwrap().push(document.len());
        Ok(())
    }
}

#[tokio::test]
async fn repository_flush_uses_configured_interval() {
    let repo = Arc::new(SavedCounts::default());
    let config = SessionConfig { persist_interval: Duration::from_millis(10), ..SessionConfig::default() };
    let (mut s, flush) = EditorSession::with_repository(
        config,
        PeerRecord::new("me", "Me"),
        Unreachable,
        CanvasDocument::new(),
        repo.clone(),
    );

    s.add_object(rect("rect-1", 0.0, 0.0)).unwrap();
    timeout(Duration::from_secs(1), async {
        while repo.0.lock().unwrap().is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("flush within timeout");
    flush.abort();

    assert_eq!(*repo.0.lock().unwrap(), vec![1]);
}

#[tokio::test]
async fn rejected_command_commits_nothing() {
    let (_hub, mut a, _b) = joined_pair().await;
    a.add_object(rect("rect-1", 0.0, 0.0)).unwrap();
    let len = a.history().len();
    assert!(a.add_object(rect("rect-1", 5.0, 5.0)).is_err());
    assert!(a.update_object("rect-1", ObjectPatch { opacity: Some(2.0), ..ObjectPatch::default() }).is_err());
    assert_eq!(a.history().len(), len);
    assert_eq!(position(&a, "rect-1"), (0.0, 0.0));
}

#[tokio::test]
async fn history_limit_comes_from_config() {
    let hub = LocalHub::new();
    let config = SessionConfig { history_limit: 3, ..SessionConfig::default() };
    let mut s = EditorSession::new(
        config,
        PeerRecord::new("me", "Me"),
        MemoryTransport::new(hub, "me"),
        CanvasDocument::new(),
        NoPersistence,
    );
    for i in 0..6 {
        s.add_object(rect(&format!("r{i}"), 0.0, 0.0)).unwrap();
    }
    assert_eq!(s.history().len(), 3);
}

#[tokio::test]
async fn idle_cursors_expire_when_configured() {
    let recorder = Recorder::default();
    let config = SessionConfig { cursor_idle: Some(Duration::from_millis(1)), ..SessionConfig::default() };
    let mut s = EditorSession::new(config, PeerRecord::new("me", "Me"), recorder.clone(), CanvasDocument::new(), NoPersistence);
    s.join(ROOM).await;

    recorder.deliver(SyncMessage::Cursor { id: "x".into(), x: 1.0, y: 1.0 }.to_frame());
    s.drain_inbound();
    tokio::time::sleep(Duration::from_millis(5)).await;
    s.drain_inbound();

    let participant = s.presence().get("x").expect("participant kept");
    assert!(participant.cursor.is_none());
}

#[tokio::test]
async fn close_leaves_room_and_returns_document() {
    let (hub, mut a, _b) = joined_pair().await;
    a.add_object(rect("rect-1", 0.0, 0.0)).unwrap();
    let doc = a.close().await;
    assert!(doc.contains("rect-1"));
    assert!(!hub.contains(ROOM, "a"));
}
