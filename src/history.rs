//! History manager: bounded snapshot stack with an undo/redo pointer.
//!
//! DESIGN
//! ======
//! Every completed action (add, delete, transform commit, reorder, paste)
//! stores a full serialized copy of the document's objects. Selection is
//! never part of a snapshot. A new commit discards everything above the
//! pointer, so the redo branch is lost on new work. When the stack grows
//! past its cap the oldest entry is evicted and the pointer shifts down.
//!
//! ERROR HANDLING
//! ==============
//! Restoring parses the target entry before the pointer moves. An entry
//! that fails to parse yields `SnapshotError` and leaves both the pointer
//! and the caller's document untouched.

use std::collections::VecDeque;

use tracing::error;

use crate::consts::DEFAULT_HISTORY_LIMIT;
use crate::doc::{CanvasDocument, CanvasObject, ValidationError};
use crate::persistence::CommitSink;

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("snapshot is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("snapshot violates document invariants: {0}")]
    Invalid(#[from] ValidationError),
}

/// A serialized document taken at a commit boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    snapshot: String,
}

impl HistoryEntry {
    fn capture(document: &CanvasDocument) -> Result<Self, serde_json::Error> {
        Ok(Self { snapshot: serde_json::to_string(document.objects())? })
    }

    /// Parse the entry back into a document with an empty selection.
    ///
    /// # Errors
    ///
    /// Returns `SnapshotError` if the JSON is unreadable or describes an
    /// invalid document (duplicate ids, non-finite geometry).
    pub fn restore(&self) -> Result<CanvasDocument, SnapshotError> {
        let objects: Vec<CanvasObject> = serde_json::from_str(&self.snapshot)?;
        Ok(CanvasDocument::from_objects(objects)?)
    }

    /// Raw serialized form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.snapshot
    }
}

/// Bounded undo/redo stack.
pub struct HistoryManager {
    entries: VecDeque<HistoryEntry>,
    /// Index of the entry matching the live document; `None` only when empty.
    pointer: Option<usize>,
    limit: usize,
    sink: Box<dyn CommitSink>,
}

impl std::fmt::Debug for HistoryManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoryManager")
            .field("entries", &self.entries.len())
            .field("pointer", &self.pointer)
            .field("limit", &self.limit)
            .finish_non_exhaustive()
    }
}

impl HistoryManager {
    /// Create a stack seeded with `initial` as its only entry.
    ///
    /// The seed is not reported to the sink; it came from the sink's side.
    pub fn new(initial: &CanvasDocument, limit: usize, sink: impl CommitSink + 'static) -> Self {
        let mut history = Self {
            entries: VecDeque::new(),
            pointer: None,
            limit: limit.max(1),
            sink: Box::new(sink),
        };
        history.push(initial);
        history
    }

    /// Stack with the default cap and no persistence.
    #[must_use]
    pub fn with_defaults(initial: &CanvasDocument) -> Self {
        Self::new(initial, DEFAULT_HISTORY_LIMIT, crate::persistence::NoPersistence)
    }

    /// Record `document` as the newest state and notify the sink.
    pub fn commit(&mut self, document: &CanvasDocument) {
        if self.push(document) {
            self.sink.on_commit(document);
        }
    }

    fn push(&mut self, document: &CanvasDocument) -> bool {
        let entry = match HistoryEntry::capture(document) {
            Ok(entry) => entry,
            Err(e) => {
                error!(error = %e, "failed to serialize document; commit skipped");
                return false;
            }
        };

        let keep = self.pointer.map_or(0, |p| p + 1);
        self.entries.truncate(keep);
        self.entries.push_back(entry);
        self.pointer = Some(self.entries.len() - 1);

        if self.entries.len() > self.limit {
            self.entries.pop_front();
            self.pointer = self.pointer.map(|p| p.saturating_sub(1));
        }
        true
    }

    /// Step back one entry and return the document to adopt.
    ///
    /// Returns `Ok(None)` when there is nothing to undo.
    ///
    /// # Errors
    ///
    /// Returns `SnapshotError` if the target entry is corrupt; the pointer
    /// does not move.
    pub fn undo(&mut self) -> Result<Option<CanvasDocument>, SnapshotError> {
        let Some(current) = self.pointer.filter(|p| *p > 0) else {
            return Ok(None);
        };
        self.step_to(current - 1).map(Some)
    }

    /// Step forward one entry and return the document to adopt.
    ///
    /// Returns `Ok(None)` when there is nothing to redo.
    ///
    /// # Errors
    ///
    /// Returns `SnapshotError` if the target entry is corrupt; the pointer
    /// does not move.
    pub fn redo(&mut self) -> Result<Option<CanvasDocument>, SnapshotError> {
        let Some(current) = self.pointer.filter(|p| p + 1 < self.entries.len()) else {
            return Ok(None);
        };
        self.step_to(current + 1).map(Some)
    }

    fn step_to(&mut self, target: usize) -> Result<CanvasDocument, SnapshotError> {
        let document = self.entries[target].restore()?;
        self.pointer = Some(target);
        self.sink.on_commit(&document);
        Ok(document)
    }

    #[must_use]
    pub fn can_undo(&self) -> bool {
        self.pointer.is_some_and(|p| p > 0)
    }

    #[must_use]
    pub fn can_redo(&self) -> bool {
        self.pointer.is_some_and(|p| p + 1 < self.entries.len())
    }

    /// Current pointer position.
    #[must_use]
    pub fn pointer(&self) -> Option<usize> {
        self.pointer
    }

    /// Number of stored entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Stored entries, oldest first.
    pub fn entries(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }
}

#[cfg(test)]
#[path = "history_test.rs"]
mod history_test;
