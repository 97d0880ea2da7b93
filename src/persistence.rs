//! Persistence hooks: commit callback and debounced background flush.
//!
//! DESIGN
//! ======
//! The history manager calls `CommitSink::on_commit` after every commit,
//! synchronously and without I/O. Durable storage is somebody else's job:
//! `PendingSnapshot` keeps only the latest committed document, and a
//! background task wakes on an interval, takes it, and hands it to a
//! `DocumentRepository`. This keeps the edit path in-memory while bounding
//! data loss to one interval.
//!
//! ERROR HANDLING
//! ==============
//! A failed save puts the snapshot back unless a newer commit already
//! replaced it, so the next tick retries instead of dropping edits.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::doc::CanvasDocument;

// =============================================================================
// COMMIT SINK
// =============================================================================

/// Receives the document state after each committed change.
pub trait CommitSink: Send {
    fn on_commit(&mut self, document: &CanvasDocument);
}

impl<F> CommitSink for F
where
    F: FnMut(&CanvasDocument) + Send,
{
    fn on_commit(&mut self, document: &CanvasDocument) {
        self(document);
    }
}

/// Sink that discards everything. Used when the embedder does not persist.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPersistence;

impl CommitSink for NoPersistence {
    fn on_commit(&mut self, _document: &CanvasDocument) {}
}

// =============================================================================
// REPOSITORY
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("storage backend failed: {0}")]
    Backend(String),
}

/// Durable storage for a document.
#[async_trait::async_trait]
pub trait DocumentRepository: Send + Sync {
    async fn save(&self, document: &CanvasDocument) -> Result<(), PersistenceError>;
}

// =============================================================================
// PENDING SNAPSHOT
// =============================================================================

/// Latest committed document awaiting flush, tagged with a commit counter.
#[derive(Debug, Clone, Default)]
pub struct PendingSnapshot {
    inner: Arc<Mutex<PendingInner>>,
}

#[derive(Debug, Default)]
struct PendingInner {
    latest: Option<CanvasDocument>,
    generation: u64,
}

impl PendingSnapshot {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// True when a commit is waiting to be flushed.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.lock().latest.is_some()
    }

    fn take(&self) -> Option<(CanvasDocument, u64)> {
        let mut inner = self.lock();
        let generation = inner.generation;
        inner.latest.take().map(|doc| (doc, generation))
    }

    /// Put a snapshot back after a failed save, unless a newer one arrived.
    fn restore(&self, document: CanvasDocument, generation: u64) {
        let mut inner = self.lock();
        if inner.generation == generation && inner.latest.is_none() {
            inner.latest = Some(document);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PendingInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl CommitSink for PendingSnapshot {
    fn on_commit(&mut self, document: &CanvasDocument) {
        let mut inner = self.lock();
        inner.latest = Some(document.clone());
        inner.generation += 1;
    }
}

// =============================================================================
// FLUSH TASK
// =============================================================================

/// Spawn the background persistence task. Returns a handle for shutdown.
pub fn spawn_persistence_task(
    pending: PendingSnapshot,
    repository: Arc<dyn DocumentRepository>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            flush_pending(&pending, repository.as_ref()).await;
        }
    })
}

/// Flush the pending snapshot once. Returns `true` if a save succeeded.
pub async fn flush_pending(pending: &PendingSnapshot, repository: &dyn DocumentRepository) -> bool {
    let Some((document, generation)) = pending.take() else {
        return false;
    };

    match repository.save(&document).await {
        Ok(()) => {
            debug!(objects = document.len(), "persisted document");
            true
        }
        Err(e) => {
            error!(error = %e, "persistence flush failed; snapshot retained for retry");
            pending.restore(document, generation);
            false
        }
    }
}

#[cfg(test)]
#[path = "persistence_test.rs"]
mod persistence_test;
