//! Offline presence simulation.
//!
//! When no transport is available a session can still show "other people"
//! by letting a `PresenceSimulation` drive the presence directory. The
//! strategy is injected by the session owner; nothing in the connected
//! path ever constructs one.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::presence::{PeerRecord, Point, PresenceDirectory};

/// Strategy that populates and animates a presence directory locally.
pub trait PresenceSimulation: Send {
    /// Add the simulated participants. Called once when the session goes offline.
    fn seed(&mut self, directory: &mut PresenceDirectory, now_ms: i64);

    /// Advance the simulated participants by one step.
    fn step(&mut self, directory: &mut PresenceDirectory, now_ms: i64);
}

/// Simulated participants whose cursors wander inside a rectangle.
pub struct RandomWalk {
    rng: StdRng,
    peers: Vec<PeerRecord>,
    width: f64,
    height: f64,
    stride: f64,
}

impl RandomWalk {
    /// Walkers over a 1000x800 area moving at most 25 units per step.
    /// The same `seed` always produces the same walk.
    #[must_use]
    pub fn new(peers: Vec<PeerRecord>, seed: u64) -> Self {
        Self { rng: StdRng::seed_from_u64(seed), peers, width: 1000.0, height: 800.0, stride: 25.0 }
    }

    #[must_use]
    pub fn with_bounds(mut self, width: f64, height: f64) -> Self {
        self.width = width.max(0.0);
        self.height = height.max(0.0);
        self
    }

    #[must_use]
    pub fn with_stride(mut self, stride: f64) -> Self {
        self.stride = stride.abs();
        self
    }

    fn random_point(&mut self) -> Point {
        Point::new(self.random_coord(self.width), self.random_coord(self.height))
    }

    fn random_coord(&mut self, limit: f64) -> f64 {
        if limit > 0.0 { self.rng.random_range(0.0..limit) } else { 0.0 }
    }

    fn random_delta(&mut self) -> f64 {
        if self.stride > 0.0 { self.rng.random_range(-self.stride..=self.stride) } else { 0.0 }
    }
}

impl PresenceSimulation for RandomWalk {
    fn seed(&mut self, directory: &mut PresenceDirectory, now_ms: i64) {
        for i in 0..self.peers.len() {
            let record = self.peers[i].clone();
            if directory.join(&record, now_ms) {
                let start = self.random_point();
                directory.update_cursor(&record.id, start, now_ms);
            }
        }
    }

    fn step(&mut self, directory: &mut PresenceDirectory, now_ms: i64) {
        for i in 0..self.peers.len() {
            let id = self.peers[i].id.clone();
            // Walkers removed from the directory stay gone.
            let Some(participant) = directory.get(&id) else {
                continue;
            };
            let from = participant.cursor.unwrap_or(Point::new(self.width / 2.0, self.height / 2.0));
            let next = Point::new(
                (from.x + self.random_delta()).clamp(0.0, self.width),
                (from.y + self.random_delta()).clamp(0.0, self.height),
            );
            directory.update_cursor(&id, next, now_ms);
        }
    }
}

#[cfg(test)]
#[path = "simulation_test.rs"]
mod simulation_test;
