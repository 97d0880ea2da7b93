//! Room relay: WebSocket front door for the in-process hub.
//!
//! DESIGN
//! ======
//! Each socket on `/rooms/{room}/ws?client_id=..` becomes one hub member.
//! The relay does not interpret edits: `room:join` frames are taken as the
//! member's presence announcement, cursor and object frames are re-stamped
//! with the room and sender and published to the other members. Roster and
//! part frames come only from the hub; a client sending one is ignored.
//! Clients decode and validate what they receive.
//!
//! LIFECYCLE
//! =========
//! 1. Upgrade → subscribe to the hub (client id from query, or a fresh uuid)
//! 2. `select!` loop: socket text → hub, hub frames → socket
//! 3. Close or error → unsubscribe (peers get `room:part` + roster)

use std::collections::HashMap;

use axum::Router;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use uuid::Uuid;

use crate::frame::Frame;
use crate::presence::PeerRecord;
use crate::sync::{
    InboundEvent, SYSCALL_CREATE, SYSCALL_CURSOR, SYSCALL_DELETE, SYSCALL_JOIN, SYSCALL_UPDATE, SyncMessage,
};
use crate::transport::memory::LocalHub;
use crate::transport::validate_name;

/// Shared relay state: the hub all sockets join.
#[derive(Clone, Default)]
pub struct RelayState {
    pub hub: LocalHub,
}

/// Build the relay router.
pub fn app(state: RelayState) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    Router::new()
        .route("/healthz", get(healthz))
        .route("/rooms/{room}/ws", get(handle_ws))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

// =============================================================================
// UPGRADE
// =============================================================================

async fn handle_ws(
    State(state): State<RelayState>,
    Path(room): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    ws: WebSocketUpgrade,
) -> Response {
    if let Err(e) = validate_name("room", &room) {
        return (StatusCode::BAD_REQUEST, e.to_string()).into_response();
    }
    let client_id = match params.get("client_id") {
        Some(id) => {
            if let Err(e) = validate_name("client id", id) {
                return (StatusCode::BAD_REQUEST, e.to_string()).into_response();
            }
            id.clone()
        }
        None => Uuid::new_v4().to_string(),
    };
    if state.hub.contains(&room, &client_id) {
        return (StatusCode::CONFLICT, "client id already in room").into_response();
    }

    ws.on_upgrade(move |socket| run_ws(socket, state.hub, room, client_id))
}

// =============================================================================
// CONNECTION
// =============================================================================

async fn run_ws(mut socket: WebSocket, hub: LocalHub, room: String, client_id: String) {
    let mut peer_rx = match hub.subscribe(&room, &client_id) {
        Ok(rx) => rx,
        Err(e) => {
            warn!(%room, %client_id, error = %e, "relay: subscribe refused");
            let _ = socket.send(Message::Close(None)).await;
            return;
        }
    };
    info!(%room, %client_id, "relay: client connected");

    loop {
        tokio::select! {
            msg = socket.recv() => {
                let Some(Ok(msg)) = msg else { break };
                match msg {
                    Message::Text(text) => relay_text(&hub, &room, &client_id, text.as_str()),
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            frame = peer_rx.recv() => {
                let Some(frame) = frame else { break };
                if send_frame(&mut socket, &frame).await.is_err() {
                    break;
                }
            }
        }
    }

    hub.unsubscribe(&room, &client_id);
    info!(%room, %client_id, "relay: client disconnected");
}

fn relay_text(hub: &LocalHub, room: &str, client_id: &str, text: &str) {
    let frame = match Frame::from_json(text) {
        Ok(frame) => frame,
        Err(e) => {
            warn!(%room, %client_id, error = %e, "relay: invalid inbound frame");
            return;
        }
    };

    match frame.syscall.as_str() {
        SYSCALL_JOIN => match InboundEvent::from_frame(&frame) {
            Ok(InboundEvent::Message(SyncMessage::Join { id, display_name })) => {
                hub.announce(room, client_id, PeerRecord { id, display_name });
            }
            Ok(_) => {}
            Err(e) => warn!(%room, %client_id, error = %e, "relay: invalid presence announcement"),
        },
        SYSCALL_CURSOR | SYSCALL_CREATE | SYSCALL_UPDATE | SYSCALL_DELETE => {
            hub.publish(room, client_id, frame);
        }
        other => warn!(%room, %client_id, syscall = other, "relay: client frame not relayed"),
    }
}

async fn send_frame(socket: &mut WebSocket, frame: &Frame) -> Result<(), ()> {
    let json = match frame.to_json() {
        Ok(j) => j,
        Err(e) => {
            warn!(error = %e, "relay: failed to serialize frame");
            return Err(());
        }
    };
    socket.send(Message::Text(json.into())).await.map_err(|_| ())
}

#[cfg(test)]
#[path = "relay_test.rs"]
mod relay_test;
