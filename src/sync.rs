//! Object sync channel: typed messages, frame codec, last-writer-wins apply.
//!
//! DESIGN
//! ======
//! Outbound: local mutations and presence events become `SyncMessage`s and
//! are encoded as frames (`object:create`, `cursor:moved`, ...).
//!
//! Inbound: frames are decoded at the transport boundary into the closed
//! `InboundEvent` set. Anything that does not fit (missing field, bad
//! number, unknown syscall) is a `ValidationError` and never reaches the
//! document.
//!
//! CONFLICT POLICY
//! ===============
//! Remote mutations are folded straight into the local document. The most
//! recently arrived mutation for an object wins for the fields it carries;
//! two peers editing the same object concurrently may each end up with the
//! other's value. There is no merge and no reordering buffer.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::doc::{CanvasDocument, CanvasObject, ObjectId, ObjectPatch, ValidationError};
use crate::frame::{Data, Frame};
use crate::presence::PeerRecord;

// =============================================================================
// SYSCALLS
// =============================================================================

pub const SYSCALL_JOIN: &str = "room:join";
pub const SYSCALL_PART: &str = "room:part";
pub const SYSCALL_ROSTER: &str = "room:roster";
pub const SYSCALL_CURSOR: &str = "cursor:moved";
pub const SYSCALL_CREATE: &str = "object:create";
pub const SYSCALL_UPDATE: &str = "object:update";
pub const SYSCALL_DELETE: &str = "object:delete";

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationKind {
    Created,
    Updated,
    Removed,
}

/// One object-level change.
#[derive(Debug, Clone, PartialEq)]
pub enum ObjectMutation {
    Created(CanvasObject),
    Updated { object_id: ObjectId, changes: ObjectPatch },
    Removed { object_id: ObjectId },
}

impl ObjectMutation {
    #[must_use]
    pub fn kind(&self) -> MutationKind {
        match self {
            Self::Created(_) => MutationKind::Created,
            Self::Updated { .. } => MutationKind::Updated,
            Self::Removed { .. } => MutationKind::Removed,
        }
    }

    #[must_use]
    pub fn object_id(&self) -> &str {
        match self {
            Self::Created(obj) => &obj.id,
            Self::Updated { object_id, .. } | Self::Removed { object_id } => object_id,
        }
    }
}

/// Everything that travels between peers in a room.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncMessage {
    Join { id: String, display_name: String },
    Leave { id: String },
    Cursor { id: String, x: f64, y: f64 },
    ObjectMutation(ObjectMutation),
}

/// What a subscriber can receive: a full roster or a single message.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    RosterSync(Vec<PeerRecord>),
    Message(SyncMessage),
}

// =============================================================================
// ENCODE
// =============================================================================

impl SyncMessage {
    /// Encode as a frame. Routing fields are left for the transport.
    #[must_use]
    pub fn to_frame(&self) -> Frame {
        match self {
            Self::Join { id, display_name } => Frame::new(SYSCALL_JOIN, Data::new())
                .with_data("id", id.as_str())
                .with_data("display_name", display_name.as_str()),
            Self::Leave { id } => Frame::new(SYSCALL_PART, Data::new()).with_data("id", id.as_str()),
            Self::Cursor { id, x, y } => Frame::new(SYSCALL_CURSOR, Data::new())
                .with_data("id", id.as_str())
                .with_data("x", *x)
                .with_data("y", *y),
            Self::ObjectMutation(ObjectMutation::Created(obj)) => {
                Frame::new(SYSCALL_CREATE, Data::new()).with_data("object", to_value(obj))
            }
            Self::ObjectMutation(ObjectMutation::Updated { object_id, changes }) => {
                Frame::new(SYSCALL_UPDATE, Data::new())
                    .with_data("id", object_id.as_str())
                    .with_data("changes", to_value(changes))
            }
            Self::ObjectMutation(ObjectMutation::Removed { object_id }) => {
                Frame::new(SYSCALL_DELETE, Data::new()).with_data("id", object_id.as_str())
            }
        }
    }
}

impl From<ObjectMutation> for SyncMessage {
    fn from(mutation: ObjectMutation) -> Self {
        Self::ObjectMutation(mutation)
    }
}

impl From<&PeerRecord> for SyncMessage {
    fn from(record: &PeerRecord) -> Self {
        Self::Join { id: record.id.clone(), display_name: record.display_name.clone() }
    }
}

/// Encode a full membership list as a `room:roster` frame.
#[must_use]
pub fn roster_frame(members: &[PeerRecord]) -> Frame {
    Frame::new(SYSCALL_ROSTER, Data::new()).with_data("members", to_value(members))
}

fn to_value<T: Serialize + ?Sized>(value: &T) -> serde_json::Value {
    // Plain data types with string keys always serialize.
    serde_json::to_value(value).unwrap_or(serde_json::Value::Null)
}

// =============================================================================
// DECODE
// =============================================================================

impl InboundEvent {
    /// Decode and validate a frame.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` for unknown syscalls, missing or malformed
    /// fields, and objects or patches that fail field validation.
    pub fn from_frame(frame: &Frame) -> Result<Self, ValidationError> {
        let data = &frame.data;
        let message = match frame.syscall.as_str() {
            SYSCALL_ROSTER => {
                let members: Vec<PeerRecord> = field(data, "members")?;
                if members.iter().any(|m| m.id.is_empty()) {
                    return Err(ValidationError::EmptyId);
                }
                return Ok(Self::RosterSync(members));
            }
            SYSCALL_JOIN => SyncMessage::Join {
                id: id_field(data, "id")?,
                display_name: field(data, "display_name")?,
            },
            SYSCALL_PART => SyncMessage::Leave { id: id_field(data, "id")? },
            SYSCALL_CURSOR => SyncMessage::Cursor {
                id: id_field(data, "id")?,
                x: number_field(data, "x")?,
                y: number_field(data, "y")?,
            },
            SYSCALL_CREATE => {
                let obj: CanvasObject = field(data, "object")?;
                obj.validate()?;
                SyncMessage::ObjectMutation(ObjectMutation::Created(obj))
            }
            SYSCALL_UPDATE => {
                let changes: ObjectPatch = field(data, "changes")?;
                changes.validate()?;
                SyncMessage::ObjectMutation(ObjectMutation::Updated { object_id: id_field(data, "id")?, changes })
            }
            SYSCALL_DELETE => SyncMessage::ObjectMutation(ObjectMutation::Removed { object_id: id_field(data, "id")? }),
            other => return Err(ValidationError::UnknownSyscall(other.to_owned())),
        };
        Ok(Self::Message(message))
    }
}

fn field<T: DeserializeOwned>(data: &Data, key: &'static str) -> Result<T, ValidationError> {
    let value = data.get(key).ok_or(ValidationError::MissingField(key))?;
    serde_json::from_value(value.clone())
        .map_err(|e| ValidationError::Malformed { field: key, reason: e.to_string() })
}

fn id_field(data: &Data, key: &'static str) -> Result<String, ValidationError> {
    let id: String = field(data, key)?;
    if id.is_empty() {
        return Err(ValidationError::EmptyId);
    }
    Ok(id)
}

fn number_field(data: &Data, key: &'static str) -> Result<f64, ValidationError> {
    let value = data.get(key).ok_or(ValidationError::MissingField(key))?;
    let number = value.as_f64().ok_or_else(|| ValidationError::Malformed {
        field: key,
        reason: "expected a number".to_owned(),
    })?;
    if !number.is_finite() {
        return Err(ValidationError::NonFinite(key));
    }
    Ok(number)
}

// =============================================================================
// APPLY
// =============================================================================

/// Fold a remote mutation into the document, last writer wins.
///
/// `Created` inserts, or replaces an object with the same id wholesale.
/// `Updated`/`Removed` for an id that is not present are rejected so the
/// caller can log and move on; this tolerates a missed `Created`.
///
/// # Errors
///
/// Returns `UnknownObject` for updates/removals of absent ids, or a field
/// validation failure. The document is unchanged on error.
pub fn apply_mutation(doc: &mut CanvasDocument, mutation: &ObjectMutation) -> Result<(), ValidationError> {
    match mutation {
        ObjectMutation::Created(obj) => doc.upsert(obj.clone()),
        ObjectMutation::Updated { object_id, changes } => doc.apply_patch(object_id, changes),
        ObjectMutation::Removed { object_id } => doc
            .remove(object_id)
            .map(|_| ())
            .ok_or_else(|| ValidationError::UnknownObject(object_id.clone())),
    }
}

#[cfg(test)]
#[path = "sync_test.rs"]
mod sync_test;
