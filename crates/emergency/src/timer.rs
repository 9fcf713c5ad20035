//! Sustained-condition timer

use sensors::{elapsed, Timestamp};
use std::time::Duration;

/// Tracks how long a condition has held without interruption
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConditionTimer {
    pub started_at: Option<Timestamp>,
}

impl ConditionTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one frame. Returns whether the condition has held for `required`.
    pub fn observe(&mut self, qualifying: bool, now: Timestamp, required: Duration) -> bool {
        if !qualifying {
            self.started_at = None;
            return false;
        }
        let started = *self.started_at.get_or_insert(now);
        elapsed(started, now) >= required
    }

    pub fn held_for(&self, now: Timestamp) -> Duration {
        self.started_at
            .map_or(Duration::ZERO, |started| elapsed(started, now))
    }

    pub fn reset(&mut self) {
        self.started_at = None;
    }
}
