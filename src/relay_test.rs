#![allow(clippy::float_cmp)]

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;

use super::*;
use crate::config::SessionConfig;
use crate::doc::{CanvasDocument, CanvasObject, ObjectKind, ObjectPatch};
use crate::persistence::NoPersistence;
use crate::session::EditorSession;
use crate::transport::ws::WsTransport;
use crate::transport::{ConnectionStatus, Transport, TransportError};

async fn spawn_relay() -> (std::net::SocketAddr, RelayState) {
    let state = RelayState::default();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = app(state.clone());
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    (addr, state)
}

fn ws_session(addr: std::net::SocketAddr, id: &str, name: &str) -> EditorSession<WsTransport> {
    EditorSession::new(
        SessionConfig::default(),
        PeerRecord::new(id, name),
        WsTransport::new(format!("ws://{addr}"), id),
        CanvasDocument::new(),
        NoPersistence,
    )
}

async fn settle(session: &mut EditorSession<WsTransport>, done: impl Fn(&EditorSession<WsTransport>) -> bool) {
    timeout(Duration::from_secs(5), async {
        while !done(&*session) {
            session.tick().await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[tokio::test]
async fn healthz_responds_ok() {
    let (addr, _state) = spawn_relay().await;
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(b"GET /healthz HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();
    assert!(response.starts_with("HTTP/1.1 200"), "got: {response}");
    assert!(response.ends_with("ok"));
}

#[tokio::test]
async fn two_clients_collaborate_through_relay() {
    let (addr, state) = spawn_relay().await;
    let mut a = ws_session(addr, "a", "Ann");
    let mut b = ws_session(addr, "b", "Bea");

    assert_eq!(a.join("proj-1").await, ConnectionStatus::Connected);
    assert_eq!(b.join("proj-1").await, ConnectionStatus::Connected);
    settle(&mut a, |s| s.presence().contains("b")).await;
    settle(&mut b, |s| s.presence().contains("a")).await;
    assert_eq!(state.hub.roster("proj-1").len(), 2);

    a.add_object(CanvasObject::new("rect-1", ObjectKind::Rectangle, 0.0, 0.0, 10.0, 10.0)).unwrap();
    settle(&mut b, |s| s.document().contains("rect-1")).await;

    b.update_object("rect-1", ObjectPatch::position(200.0, 200.0)).unwrap();
    settle(&mut a, |s| s.document().get("rect-1").is_some_and(|o| o.x == 200.0)).await;

    b.leave().await;
    settle(&mut a, |s| !s.presence().contains("b")).await;
    assert!(b.presence().is_empty());
}

#[tokio::test]
async fn duplicate_client_id_is_refused() {
    let (addr, state) = spawn_relay().await;
    let mut first = WsTransport::new(format!("ws://{addr}"), "same");
    let _inbox = first.subscribe("r").await.unwrap();

    // The hub registers the first socket after the upgrade completes.
    timeout(Duration::from_secs(5), async {
        while !state.hub.contains("r", "same") {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    let mut second = WsTransport::new(format!("ws://{addr}"), "same");
    assert!(matches!(second.subscribe("r").await, Err(TransportError::Connect(_))));
}

#[tokio::test]
async fn invalid_names_are_rejected_before_connecting() {
    let mut transport = WsTransport::new("ws://127.0.0.1:1", "a b");
    assert!(matches!(transport.subscribe("room").await, Err(TransportError::InvalidName { .. })));
}

#[tokio::test]
async fn unreachable_relay_degrades_session() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let mut s = ws_session(addr, "a", "Ann");
    assert_eq!(s.join("proj-1").await, ConnectionStatus::Offline);
    s.add_object(CanvasObject::new("r", ObjectKind::Ellipse, 0.0, 0.0, 1.0, 1.0)).unwrap();
    assert!(s.document().contains("r"));
}

type Inbox = tokio::sync::mpsc::Receiver<Frame>;

fn hub_with_two_members() -> (LocalHub, Inbox, Inbox) {
    let hub = LocalHub::new();
    let a = hub.subscribe("proj-1", "a").unwrap();
    let mut b = hub.subscribe("proj-1", "b").unwrap();
    hub.announce("proj-1", "a", PeerRecord::new("a", "Alice"));
    hub.announce("proj-1", "b", PeerRecord::new("b", "Bob"));
    while b.try_recv().is_ok() {}
    (hub, a, b)
}

#[test]
fn client_part_and_roster_frames_are_not_relayed() {
    let (hub, _a, mut b) = hub_with_two_members();

    let part = SyncMessage::Leave { id: "b".into() }.to_frame().to_json().unwrap();
    relay_text(&hub, "proj-1", "a", &part);
    let roster = crate::sync::roster_frame(&[]).to_json().unwrap();
    relay_text(&hub, "proj-1", "a", &roster);

    assert!(b.try_recv().is_err());
    assert_eq!(hub.roster("proj-1").len(), 2);
}

#[test]
fn client_cursor_frames_are_relayed() {
    let (hub, _a, mut b) = hub_with_two_members();

    let cursor = SyncMessage::Cursor { id: "a".into(), x: 1.0, y: 2.0 }.to_frame().to_json().unwrap();
    relay_text(&hub, "proj-1", "a", &cursor);

    let frame = b.try_recv().unwrap();
    assert_eq!(frame.syscall, crate::sync::SYSCALL_CURSOR);
    assert_eq!(frame.from.as_deref(), Some("a"));
}
