//! Cursor broadcaster: trailing-edge throttle for local pointer movement.
//!
//! DESIGN
//! ======
//! The first movement after a quiet period opens a window. Later movements
//! inside the window overwrite the pending position. When the window
//! elapses the latest position is released and the window closes, so the
//! next movement opens a fresh one. At most one position leaves per window
//! and intermediate positions are dropped, never queued.
//!
//! Time is passed in explicitly (`*_at` methods) so tests can drive the
//! clock without sleeping.

use std::time::{Duration, Instant};

use crate::presence::Point;

#[derive(Debug, Clone)]
pub struct CursorBroadcaster {
    interval: Duration,
    window_opened: Option<Instant>,
    pending: Option<Point>,
}

impl CursorBroadcaster {
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Self { interval, window_opened: None, pending: None }
    }

    /// Record a local pointer position.
    pub fn record(&mut self, position: Point) {
        self.record_at(position, Instant::now());
    }

    /// Record with an explicit timestamp (for testing).
    pub fn record_at(&mut self, position: Point, now: Instant) {
        self.pending = Some(position);
        if self.window_opened.is_none() {
            self.window_opened = Some(now);
        }
    }

    /// Release the pending position if its window has elapsed.
    pub fn poll(&mut self) -> Option<Point> {
        self.poll_at(Instant::now())
    }

    /// Poll with an explicit timestamp (for testing).
    pub fn poll_at(&mut self, now: Instant) -> Option<Point> {
        let deadline = self.deadline()?;
        if now < deadline {
            return None;
        }
        self.window_opened = None;
        self.pending.take()
    }

    /// When the pending position becomes due, if any.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.pending.as_ref()?;
        self.window_opened.map(|opened| opened + self.interval)
    }

    /// Drop any pending position and close the window.
    pub fn cancel(&mut self) {
        self.window_opened = None;
        self.pending = None;
    }

    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }
}

#[cfg(test)]
#[path = "cursor_test.rs"]
mod cursor_test;
