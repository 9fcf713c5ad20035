//! Consecutive-frame debouncing of the EAR signal

use serde::{Deserialize, Serialize};

/// Run length of consecutive closed-eye frames
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FatigueCounter {
    pub consecutive_low_frames: u32,
}

impl FatigueCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one frame's EAR and return whether the fatigue alarm is on.
    ///
    /// An open-eye frame resets the run. A frame without a usable EAR (no
    /// face) leaves the run untouched, so a latched alarm survives brief
    /// tracking loss.
    pub fn observe(&mut self, ear: Option<f64>, threshold: f64, required: u32) -> bool {
        match ear.filter(|v| v.is_finite()) {
            Some(v) if v < threshold => {
                self.consecutive_low_frames = self.consecutive_low_frames.saturating_add(1);
            }
            Some(_) => self.consecutive_low_frames = 0,
            None => {}
        }
        self.is_alarm_on(required)
    }

    pub fn is_alarm_on(&self, required: u32) -> bool {
        self.consecutive_low_frames >= required.max(1)
    }

    pub fn reset(&mut self) {
        self.consecutive_low_frames = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const THRESHOLD: f64 = 0.2;

    #[test]
    fn test_latches_at_required_count() {
        let mut counter = FatigueCounter::new();
        for _ in 0..4 {
            assert!(!counter.observe(Some(0.1), THRESHOLD, 5));
        }
        assert!(counter.observe(Some(0.1), THRESHOLD, 5));
        assert!(counter.observe(Some(0.1), THRESHOLD, 5));
        assert!(!counter.observe(Some(0.3), THRESHOLD, 5));
        assert_eq!(counter.consecutive_low_frames, 0);
    }

    #[test]
    fn test_alternating_never_alarms() {
        let mut counter = FatigueCounter::new();
        for i in 0..100 {
            let ear = if i % 2 == 0 { 0.1 } else { 0.3 };
            assert!(!counter.observe(Some(ear), THRESHOLD, 5));
        }
    }

    #[test]
    fn test_missing_face_keeps_count() {
        let mut counter = FatigueCounter::new();
        counter.observe(Some(0.1), THRESHOLD, 3);
        counter.observe(Some(0.1), THRESHOLD, 3);
        assert!(!counter.observe(None, THRESHOLD, 3));
        assert_eq!(counter.consecutive_low_frames, 2);
        assert!(counter.observe(Some(0.1), THRESHOLD, 3));
        // Latched alarm survives tracking loss
        assert!(counter.observe(None, THRESHOLD, 3));
    }

    #[test]
    fn test_threshold_is_exclusive() {
        let mut counter = FatigueCounter::new();
        assert!(!counter.observe(Some(THRESHOLD), THRESHOLD, 1));
        assert!(counter.observe(Some(THRESHOLD - 1e-9), THRESHOLD, 1));
    }

    proptest! {
        /// The alarm is on exactly when the trailing run of closed-eye frames
        /// (skipping no-face frames) is at least `required` long.
        #[test]
        fn prop_alarm_matches_trailing_run(
            frames in proptest::collection::vec(proptest::option::of(0.0f64..0.5), 0..200),
            required in 1u32..20,
        ) {
            let mut counter = FatigueCounter::new();
            let mut alarm = false;
            for ear in &frames {
                alarm = counter.observe(*ear, THRESHOLD, required);
            }

            let trailing = frames
                .iter()
                .rev()
                .flatten()
                .take_while(|v| **v < THRESHOLD)
                .count() as u32;
            prop_assert_eq!(alarm, trailing >= required);
        }
    }
}
