//! Driver Monitoring System (DMS)
//!
//! Turns per-frame EAR observations into a speaker decision:
//! - Consecutive-frame debouncing of closed eyes
//! - Parked-vehicle exemption based on GPS speed
//! - No-face-while-driving grace timer
//! - One event log line per alarm activation

pub mod analysis;
pub mod config;
pub mod fatigue;
pub mod state;

pub use analysis::{DriverCondition, DrowsinessAnalysis};
pub use config::DrowsinessConfig;
pub use fatigue::FatigueCounter;
pub use state::{AlarmCause, AlarmDecision, AlarmInput, DrowsinessAlarm};

use event_log::EventSink;
use sensors::{FrameObservation, Timestamp};

/// Driver monitoring module
#[derive(Debug, Default)]
pub struct DrowsinessMonitor {
    fatigue: FatigueCounter,
    alarm: DrowsinessAlarm,
}

impl DrowsinessMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Analyze one frame
    pub fn observe(
        &mut self,
        frame: &FrameObservation,
        speed_kmh: f64,
        now: Timestamp,
        config: &DrowsinessConfig,
        sink: &dyn EventSink,
    ) -> DrowsinessAnalysis {
        let ear = frame.effective_ear();
        let fatigue_alarm_on =
            self.fatigue
                .observe(ear, config.ear_threshold, config.consecutive_frames);
        let is_driving = config.is_driving(speed_kmh);

        let decision = self.alarm.update(
            AlarmInput {
                face_detected: frame.face_detected,
                fatigue_alarm_on,
                is_driving,
            },
            now,
            config,
            sink,
        );

        let condition = if fatigue_alarm_on {
            DriverCondition::Sleepy
        } else if frame.face_detected {
            DriverCondition::Normal
        } else {
            DriverCondition::NoFace
        };

        DrowsinessAnalysis {
            face_detected: frame.face_detected,
            ear,
            fatigue_alarm_on,
            is_driving,
            condition,
            should_activate_speaker: decision.should_activate_speaker,
            alarm_duration: decision.alarm_duration,
            no_face_duration: decision.no_face_duration,
            show_popup: decision.show_popup,
            cause: decision.cause,
            activated: decision.activated,
        }
    }

    /// Stop the speaker until the current alarm condition clears
    pub fn request_stop(&mut self) -> bool {
        self.alarm.request_stop()
    }

    pub fn alarm(&self) -> &DrowsinessAlarm {
        &self.alarm
    }

    /// Reset driver state (on driver change)
    pub fn reset_state(&mut self) {
        self.fatigue.reset();
        self.alarm.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use event_log::MemoryEventLog;

    fn t(frame: i64) -> Timestamp {
        Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap() + chrono::Duration::milliseconds(frame * 33)
    }

    #[test]
    fn test_closed_eyes_while_driving() {
        let log = MemoryEventLog::new();
        let config = DrowsinessConfig::default();
        let mut dms = DrowsinessMonitor::new();

        for i in 0..29 {
            let a = dms.observe(&FrameObservation::face(0.1), 50.0, t(i), &config, &log);
            assert!(!a.should_activate_speaker);
        }
        let a = dms.observe(&FrameObservation::face(0.1), 50.0, t(29), &config, &log);
        assert!(a.should_activate_speaker);
        assert_eq!(a.condition, DriverCondition::Sleepy);
        assert_eq!(a.cause, Some(AlarmCause::Drowsiness));
        assert_eq!(log.texts(), vec!["drowsiness"]);
    }

    #[test]
    fn test_sleepy_but_parked() {
        let log = MemoryEventLog::new();
        let config = DrowsinessConfig {
            consecutive_frames: 2,
            ..Default::default()
        };
        let mut dms = DrowsinessMonitor::new();

        dms.observe(&FrameObservation::face(0.1), 0.0, t(0), &config, &log);
        let a = dms.observe(&FrameObservation::face(0.1), 0.0, t(1), &config, &log);
        assert!(a.fatigue_alarm_on);
        assert!(!a.should_activate_speaker);
        assert_eq!(a.condition, DriverCondition::Sleepy);
        assert!(log.texts().is_empty());
    }

    #[test]
    fn test_alternating_ear_never_alarms() {
        let log = MemoryEventLog::new();
        let config = DrowsinessConfig {
            consecutive_frames: 5,
            ..Default::default()
        };
        let mut dms = DrowsinessMonitor::new();

        for i in 0..300 {
            let ear = if i % 2 == 0 { 0.1 } else { 0.3 };
            let a = dms.observe(&FrameObservation::face(ear), 60.0, t(i), &config, &log);
            assert!(!a.fatigue_alarm_on);
            assert!(!a.should_activate_speaker);
        }
    }
}
