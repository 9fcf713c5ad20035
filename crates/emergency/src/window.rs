//! Post-impact monitoring window

use sensors::Timestamp;
use std::time::Duration;

/// Time span after an impact during which escalation may start
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitoringWindow {
    pub impact_time: Timestamp,
    pub duration: Duration,
}

impl MonitoringWindow {
    pub fn new(impact_time: Timestamp, duration: Duration) -> Self {
        Self {
            impact_time,
            duration,
        }
    }

    /// Open while `now - impact_time <= duration`
    pub fn is_open(&self, now: Timestamp) -> bool {
        match chrono::Duration::from_std(self.duration) {
            Ok(duration) => now - self.impact_time <= duration,
            // Longer than chrono can represent: never expires
            Err(_) => true,
        }
    }

    /// Time left before expiry (zero once expired)
    pub fn remaining(&self, now: Timestamp) -> Duration {
        let spent = (now - self.impact_time).to_std().unwrap_or(Duration::ZERO);
        self.duration.saturating_sub(spent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use proptest::prelude::*;

    fn t(millis: i64) -> Timestamp {
        Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap() + chrono::Duration::milliseconds(millis)
    }

    #[test]
    fn test_boundary_inclusive() {
        let window = MonitoringWindow::new(t(0), Duration::from_secs(60));
        assert!(window.is_open(t(60_000)));
        assert!(!window.is_open(t(60_001)));
        assert_eq!(window.remaining(t(45_000)), Duration::from_secs(15));
        assert_eq!(window.remaining(t(90_000)), Duration::ZERO);
    }

    proptest! {
        #[test]
        fn prop_open_iff_within_duration(duration_ms in 1u64..600_000, offset_ms in 0i64..1_200_000) {
            let window = MonitoringWindow::new(t(0), Duration::from_millis(duration_ms));
            prop_assert_eq!(window.is_open(t(offset_ms)), offset_ms as u64 <= duration_ms);
        }
    }
}
