//! Per-path notification debounce
//!
//! A single "last seen" map plus a pure time comparison. The caller passes
//! the current instant in, so tests drive it with a `TestTimeSource` and
//! never sleep.

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Whether `now` falls inside the debounce window opened at `last`.
pub fn within_window(last: Instant, now: Instant, window: Duration) -> bool {
    now.saturating_duration_since(last) < window
}

#[derive(Debug)]
pub struct Debouncer {
    last_seen: HashMap<String, Instant>,
    window: Duration,
    /// Past this many tracked paths, stale entries are pruned
    max_entries: usize,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            last_seen: HashMap::new(),
            window,
            max_entries: 256,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Record a notification for `path` at `now`.
    ///
    /// Returns `false` if it repeats one accepted less than a window ago; the
    /// window is not extended by rejected notifications.
    pub fn accept(&mut self, path: &str, now: Instant) -> bool {
        if self.last_seen.len() > self.max_entries {
            let window = self.window;
            self.last_seen
                .retain(|_, last| within_window(*last, now, window));
        }

        if let Some(last) = self.last_seen.get(path) {
            if within_window(*last, now, self.window) {
                return false;
            }
        }
        self.last_seen.insert(path.to_string(), now);
        true
    }

    pub fn tracked(&self) -> usize {
        self.last_seen.len()
    }
}
