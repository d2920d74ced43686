//! Sliding-window counter of boost starts.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

pub const DEFAULT_WINDOW: Duration = Duration::from_secs(600);
pub const DEFAULT_CAPACITY: usize = 600;

/// Timestamps of recent events, pruned to a trailing duration.
///
/// Entries must be recorded in non-decreasing order. An entry counts at
/// `now` while `now - entry < duration`. The capacity is a soft bound on
/// memory: past it the oldest entries are dropped even if still in the
/// window.
#[derive(Debug, Clone)]
pub struct BoostWindow {
    duration: Duration,
    capacity: usize,
    entries: VecDeque<Instant>,
}

impl BoostWindow {
    pub fn new(duration: Duration, capacity: usize) -> Self {
        Self {
            duration,
            capacity: capacity.max(1),
            entries: VecDeque::new(),
        }
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn record(&mut self, now: Instant) {
        self.prune(now);
        self.entries.push_back(now);
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    pub fn count(&mut self, now: Instant) -> usize {
        self.prune(now);
        self.entries.len()
    }

    fn prune(&mut self, now: Instant) {
        // Entries are ordered, so the first one still inside the window
        // marks the cutoff.
        let cutoff = self
            .entries
            .iter()
            .position(|t| now.saturating_duration_since(*t) < self.duration)
            .unwrap_or(self.entries.len());
        self.entries.drain(..cutoff);
    }
}

impl Default for BoostWindow {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW, DEFAULT_CAPACITY)
    }
}
