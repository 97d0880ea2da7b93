//! Presence directory: remote participants and their cursors.
//!
//! SYSTEM CONTEXT
//! ==============
//! The directory is the local projection of who else is in the room. A
//! roster sync rebuilds it wholesale from the full membership list (minus
//! the local participant); join, leave and cursor events patch it between
//! syncs. Cursor positions survive a rebuild for participants that are
//! still present.
//!
//! Colors are a pure function of the participant id, so every rebuild and
//! reconnect yields the same color for the same id.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::consts::{PARTICIPANT_LIGHTNESS, PARTICIPANT_SATURATION};

/// A 2D point in world coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    #[must_use]
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Identity a client announces when it enters a room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerRecord {
    pub id: String,
    pub display_name: String,
}

impl PeerRecord {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self { id: id.into(), display_name: display_name.into() }
    }
}

/// A remote participant as seen locally.
#[derive(Debug, Clone, PartialEq)]
pub struct Participant {
    pub id: String,
    pub display_name: String,
    /// `#rrggbb` derived from `id`.
    pub color: String,
    pub cursor: Option<Point>,
    /// Milliseconds since Unix epoch of the last event from this participant.
    pub last_active_ms: i64,
}

impl Participant {
    fn from_record(record: &PeerRecord, now_ms: i64) -> Self {
        Self {
            id: record.id.clone(),
            display_name: record.display_name.clone(),
            color: participant_color(&record.id),
            cursor: None,
            last_active_ms: now_ms,
        }
    }
}

/// Remote participants keyed by id. Never contains the local participant.
#[derive(Debug, Clone)]
pub struct PresenceDirectory {
    local_id: String,
    participants: HashMap<String, Participant>,
}

impl PresenceDirectory {
    pub fn new(local_id: impl Into<String>) -> Self {
        Self { local_id: local_id.into(), participants: HashMap::new() }
    }

    /// Rebuild from the full membership list, keeping known cursors.
    pub fn sync_roster(&mut self, roster: &[PeerRecord], now_ms: i64) {
        let mut previous = std::mem::take(&mut self.participants);
        for record in roster {
            if record.id == self.local_id {
                continue;
            }
            let mut participant = Participant::from_record(record, now_ms);
            if let Some(old) = previous.remove(&record.id) {
                participant.cursor = old.cursor;
                participant.last_active_ms = old.last_active_ms;
            }
            self.participants.insert(record.id.clone(), participant);
        }
    }

    /// Add or refresh one participant. Returns `false` for the local id.
    pub fn join(&mut self, record: &PeerRecord, now_ms: i64) -> bool {
        if record.id == self.local_id {
            return false;
        }
        self.participants
            .entry(record.id.clone())
            .and_modify(|p| {
                p.display_name.clone_from(&record.display_name);
                p.last_active_ms = now_ms;
            })
            .or_insert_with(|| Participant::from_record(record, now_ms));
        true
    }

    /// Remove a participant and its cursor.
    pub fn leave(&mut self, id: &str) -> Option<Participant> {
        self.participants.remove(id)
    }

    /// Record a cursor position, creating the participant if unseen.
    pub fn update_cursor(&mut self, id: &str, position: Point, now_ms: i64) -> bool {
        if id == self.local_id {
            return false;
        }
        let participant = self
            .participants
            .entry(id.to_owned())
            .or_insert_with(|| Participant::from_record(&PeerRecord::new(id, id), now_ms));
        participant.cursor = Some(position);
        participant.last_active_ms = now_ms;
        true
    }

    /// Clear cursors idle for at least `idle_ms`. Participants stay listed.
    pub fn expire_idle_cursors(&mut self, now_ms: i64, idle_ms: i64) -> usize {
        let mut expired = 0;
        for participant in self.participants.values_mut() {
            if participant.cursor.is_some() && now_ms - participant.last_active_ms >= idle_ms {
                participant.cursor = None;
                expired += 1;
            }
        }
        expired
    }

    pub fn clear(&mut self) {
        self.participants.clear();
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Participant> {
        self.participants.get(id)
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.participants.contains_key(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.participants.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    #[must_use]
    pub fn local_id(&self) -> &str {
        &self.local_id
    }

    /// Participants sorted by display name, then id.
    #[must_use]
    pub fn participants(&self) -> Vec<&Participant> {
        let mut list: Vec<&Participant> = self.participants.values().collect();
        list.sort_by(|a, b| a.display_name.cmp(&b.display_name).then_with(|| a.id.cmp(&b.id)));
        list
    }
}

// =============================================================================
// COLOR
// =============================================================================

/// Stable `#rrggbb` color for a participant id.
///
/// FNV-1a over the id bytes picks a hue; saturation and lightness are fixed
/// so every participant gets an equally vivid color.
#[must_use]
pub fn participant_color(id: &str) -> String {
    const FNV_OFFSET: u32 = 0x811c_9dc5;
    const FNV_PRIME: u32 = 0x0100_0193;

    let hash = id
        .bytes()
        .fold(FNV_OFFSET, |acc, b| (acc ^ u32::from(b)).wrapping_mul(FNV_PRIME));
    let hue = f64::from(hash % 360);
    let (r, g, b) = hsl_to_rgb(hue, PARTICIPANT_SATURATION, PARTICIPANT_LIGHTNESS);
    format!("#{r:02x}{g:02x}{b:02x}")
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn hsl_to_rgb(hue: f64, saturation: f64, lightness: f64) -> (u8, u8, u8) {
    let chroma = (1.0 - (2.0 * lightness - 1.0).abs()) * saturation;
    let sector = hue / 60.0;
    let x = chroma * (1.0 - (sector % 2.0 - 1.0).abs());
    let (r1, g1, b1) = match sector as u32 {
        0 => (chroma, x, 0.0),
        1 => (x, chroma, 0.0),
        2 => (0.0, chroma, x),
        3 => (0.0, x, chroma),
        4 => (x, 0.0, chroma),
        _ => (chroma, 0.0, x),
    };
    let m = lightness - chroma / 2.0;
    let channel = |v: f64| ((v + m) * 255.0).round().clamp(0.0, 255.0) as u8;
    (channel(r1), channel(g1), channel(b1))
}

#[cfg(test)]
#[path = "presence_test.rs"]
mod presence_test;
