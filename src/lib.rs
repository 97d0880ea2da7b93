//! Collaborative canvas state engine.
//!
//! SYSTEM CONTEXT
//! ==============
//! One `EditorSession` per editor. It owns a document store (objects,
//! selection, clipboard), a bounded undo/redo history, a presence directory
//! of remote participants, and a throttled cursor broadcaster, and it talks
//! to peers in a room through a `Transport`. Local edits are applied first,
//! committed to history, then broadcast. Remote edits are applied last
//! writer wins and never enter local history.
//!
//! | Module | Role |
//! |---|---|
//! | `doc` | objects, patches, the ordered document |
//! | `store` | local editing commands and clipboard |
//! | `history` | snapshot undo/redo stack |
//! | `presence` | remote participants, cursors, colors |
//! | `cursor` | outbound cursor throttle |
//! | `frame` | wire envelope |
//! | `sync` | typed messages, frame codec, remote apply |
//! | `transport` | room pub/sub: in-process hub and WebSocket client |
//! | `simulation` | offline presence strategies |
//! | `persistence` | commit sink and debounced flush |
//! | `session` | the editor session tying it together |
//! | `relay` | axum WebSocket relay over the hub |
//! | `config` | environment configuration |

pub mod config;
pub mod consts;
pub mod cursor;
pub mod doc;
pub mod frame;
pub mod history;
pub mod persistence;
pub mod presence;
pub mod relay;
pub mod session;
pub mod simulation;
pub mod store;
pub mod sync;
pub mod transport;
