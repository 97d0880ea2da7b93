//! Runtime configuration from environment variables.
//!
//! Every knob has a default; unparsable values fall back to it silently.
//! `from_lookup` takes the variable source as a closure so tests can feed a
//! map instead of mutating the process environment.

use std::str::FromStr;
use std::time::Duration;

use crate::consts::{DEFAULT_CURSOR_INTERVAL, DEFAULT_HISTORY_LIMIT, DEFAULT_PASTE_OFFSET, DEFAULT_PERSIST_INTERVAL};

const DEFAULT_PORT: u16 = 3000;

/// Per-session tuning for history, cursor throttle, clipboard and persistence.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub history_limit: usize,
    pub cursor_interval: Duration,
    /// World units added to x and y per successive paste.
    pub paste_offset: f64,
    /// Clear remote cursors idle this long. `None` keeps them until leave.
    pub cursor_idle: Option<Duration>,
    pub persist_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            history_limit: DEFAULT_HISTORY_LIMIT,
            cursor_interval: DEFAULT_CURSOR_INTERVAL,
            paste_offset: DEFAULT_PASTE_OFFSET,
            cursor_idle: None,
            persist_interval: DEFAULT_PERSIST_INTERVAL,
        }
    }
}

impl SessionConfig {
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let cursor_ms = env_parse(&lookup, "COLLAB_CURSOR_INTERVAL_MS", duration_ms(defaults.cursor_interval));
        let idle_ms = env_parse(&lookup, "COLLAB_CURSOR_IDLE_MS", 0_u64);
        let persist_ms = env_parse(&lookup, "COLLAB_PERSIST_INTERVAL_MS", duration_ms(defaults.persist_interval));
        let paste_offset = env_parse(&lookup, "COLLAB_PASTE_OFFSET", defaults.paste_offset);

        Self {
            history_limit: env_parse(&lookup, "COLLAB_HISTORY_LIMIT", defaults.history_limit).max(1),
            cursor_interval: Duration::from_millis(cursor_ms),
            paste_offset: if paste_offset.is_finite() { paste_offset } else { defaults.paste_offset },
            cursor_idle: (idle_ms > 0).then(|| Duration::from_millis(idle_ms)),
            persist_interval: Duration::from_millis(persist_ms.max(1)),
        }
    }
}

/// Relay binary settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayConfig {
    pub port: u16,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self { port: DEFAULT_PORT }
    }
}

impl RelayConfig {
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self { port: env_parse(&lookup, "PORT", DEFAULT_PORT) }
    }
}

fn env_parse<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: FromStr + Copy,
{
    lookup(key)
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
#[path = "config_test.rs"]
mod config_test;
