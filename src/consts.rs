//! Shared constants for the collaboration core.

use std::time::Duration;

// ── History ─────────────────────────────────────────────────────

/// Maximum number of snapshots kept on the undo stack.
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

// ── Presence ────────────────────────────────────────────────────

/// Minimum spacing between outbound cursor broadcasts.
pub const DEFAULT_CURSOR_INTERVAL: Duration = Duration::from_millis(50);

/// Saturation used when deriving a participant color from its id.
pub const PARTICIPANT_SATURATION: f64 = 0.65;

/// Lightness used when deriving a participant color from its id.
pub const PARTICIPANT_LIGHTNESS: f64 = 0.55;

// ── Clipboard ───────────────────────────────────────────────────

/// World-unit offset added per successive paste, on both axes.
pub const DEFAULT_PASTE_OFFSET: f64 = 20.0;

// ── Transport ───────────────────────────────────────────────────

/// Per-subscriber queue depth. Full queues drop frames.
pub const CHANNEL_CAPACITY: usize = 256;

/// How long leaving a room waits for the socket writer before aborting it.
pub const WS_CLOSE_GRACE: Duration = Duration::from_millis(250);

// ── Persistence ─────────────────────────────────────────────────

/// Debounce interval for the background persistence flush.
pub const DEFAULT_PERSIST_INTERVAL: Duration = Duration::from_secs(1);
