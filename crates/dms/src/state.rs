//! Drowsiness alarm state tracking

use event_log::{DriverEvent, EventSink};
use sensors::{elapsed, Timestamp};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

use crate::config::DrowsinessConfig;

/// Why the speaker is sounding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlarmCause {
    /// Eyes closed for the debounced frame count
    Drowsiness,
    /// Face missing past the grace period while driving
    NoFaceWhileDriving,
}

impl AlarmCause {
    pub fn event(&self) -> DriverEvent {
        match self {
            AlarmCause::Drowsiness => DriverEvent::Drowsiness,
            AlarmCause::NoFaceWhileDriving => DriverEvent::NoFaceWhileDriving,
        }
    }
}

/// Per-cycle inputs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlarmInput {
    pub face_detected: bool,
    /// Debounced fatigue signal
    pub fatigue_alarm_on: bool,
    pub is_driving: bool,
}

/// Per-cycle output
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AlarmDecision {
    pub should_activate_speaker: bool,
    /// Time since the speaker was switched on (zero while off)
    pub alarm_duration: Duration,
    /// Time the face has been missing while driving (zero otherwise)
    pub no_face_duration: Duration,
    /// Speaker has been on for at least the popup delay
    pub show_popup: bool,
    pub cause: Option<AlarmCause>,
    /// Speaker turned on this cycle
    pub activated: bool,
}

/// Drowsiness alarm state (speaker activation and its edges)
#[derive(Debug, Clone, Default)]
pub struct DrowsinessAlarm {
    /// Fatigue signal seen on the last update
    pub alarm_on: bool,
    /// Speaker state after the last update
    pub prev_alarm_on: bool,
    pub alarm_start_time: Option<Timestamp>,
    pub no_face_since: Option<Timestamp>,
    /// Stop requested; held until the triggering condition clears
    silenced: bool,
}

impl DrowsinessAlarm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance one cycle. Logs exactly one event per off-to-on speaker edge.
    pub fn update(
        &mut self,
        input: AlarmInput,
        now: Timestamp,
        config: &DrowsinessConfig,
        sink: &dyn EventSink,
    ) -> AlarmDecision {
        self.alarm_on = input.fatigue_alarm_on;

        let cause = if !input.is_driving {
            // Parked: never sound the speaker
            self.no_face_since = None;
            None
        } else if input.fatigue_alarm_on {
            self.no_face_since = None;
            Some(AlarmCause::Drowsiness)
        } else if !input.face_detected {
            let since = *self.no_face_since.get_or_insert(now);
            (elapsed(since, now) >= config.no_face_grace()).then_some(AlarmCause::NoFaceWhileDriving)
        } else {
            self.no_face_since = None;
            None
        };

        if cause.is_none() && self.silenced {
            debug!("Alarm condition cleared, re-arming speaker");
            self.silenced = false;
        }

        let active = cause.is_some() && !self.silenced;
        let activated = active && !self.prev_alarm_on;

        if activated {
            if let Some(cause) = cause {
                info!(?cause, "Alarm activated");
                sink.record(now, &cause.event());
            }
            self.alarm_start_time = Some(now);
        } else if !active && self.prev_alarm_on {
            info!("Alarm deactivated");
            self.alarm_start_time = None;
        }
        self.prev_alarm_on = active;

        let alarm_duration = match (active, self.alarm_start_time) {
            (true, Some(start)) => elapsed(start, now),
            _ => Duration::ZERO,
        };
        let no_face_duration = self
            .no_face_since
            .map_or(Duration::ZERO, |since| elapsed(since, now));

        AlarmDecision {
            should_activate_speaker: active,
            alarm_duration,
            no_face_duration,
            show_popup: active && alarm_duration >= config.popup_delay(),
            cause: cause.filter(|_| active),
            activated,
        }
    }

    /// Honor an external stop request. Returns whether the speaker was on.
    pub fn request_stop(&mut self) -> bool {
        let was_active = self.prev_alarm_on;
        if was_active {
            info!("Speaker stopped on request");
            self.silenced = true;
            self.prev_alarm_on = false;
            self.alarm_start_time = None;
        }
        was_active
    }

    pub fn is_silenced(&self) -> bool {
        self.silenced
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use event_log::MemoryEventLog;
    use proptest::prelude::*;

    fn t(secs: i64) -> Timestamp {
        Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap() + chrono::Duration::seconds(secs)
    }

    fn driving(face_detected: bool, fatigue_alarm_on: bool) -> AlarmInput {
        AlarmInput {
            face_detected,
            fatigue_alarm_on,
            is_driving: true,
        }
    }

    #[test]
    fn test_drowsiness_logs_once_per_edge() {
        let log = MemoryEventLog::new();
        let config = DrowsinessConfig::default();
        let mut alarm = DrowsinessAlarm::new();

        let first = alarm.update(driving(true, true), t(0), &config, &log);
        assert!(first.should_activate_speaker && first.activated);
        for s in 1..20 {
            let d = alarm.update(driving(true, true), t(s), &config, &log);
            assert!(d.should_activate_speaker && !d.activated);
        }
        assert_eq!(log.count("drowsiness"), 1);

        let off = alarm.update(driving(true, false), t(20), &config, &log);
        assert!(!off.should_activate_speaker);
        assert_eq!(alarm.alarm_start_time, None);

        alarm.update(driving(true, true), t(21), &config, &log);
        assert_eq!(log.count("drowsiness"), 2);
    }

    #[test]
    fn test_no_face_grace_period() {
        let log = MemoryEventLog::new();
        let config = DrowsinessConfig::default();
        let mut alarm = DrowsinessAlarm::new();

        let d = alarm.update(driving(false, false), t(0), &config, &log);
        assert!(!d.should_activate_speaker);
        let d = alarm.update(driving(false, false), t(9), &config, &log);
        assert!(!d.should_activate_speaker);
        assert_eq!(d.no_face_duration, Duration::from_secs(9));

        let d = alarm.update(driving(false, false), t(10), &config, &log);
        assert!(d.should_activate_speaker);
        assert_eq!(d.cause, Some(AlarmCause::NoFaceWhileDriving));
        assert_eq!(log.texts(), vec!["no_face_while_driving"]);

        // Face back cancels the timer
        let d = alarm.update(driving(true, false), t(11), &config, &log);
        assert!(!d.should_activate_speaker);
        assert_eq!(alarm.no_face_since, None);
    }

    #[test]
    fn test_popup_after_delay() {
        let log = MemoryEventLog::new();
        let config = DrowsinessConfig::default();
        let mut alarm = DrowsinessAlarm::new();

        let d = alarm.update(driving(true, true), t(0), &config, &log);
        assert!(!d.show_popup);
        let d = alarm.update(driving(true, true), t(1), &config, &log);
        assert!(d.show_popup);
        assert_eq!(d.alarm_duration, Duration::from_secs(1));
    }

    #[test]
    fn test_stop_request_holds_until_condition_clears() {
        let log = MemoryEventLog::new();
        let config = DrowsinessConfig::default();
        let mut alarm = DrowsinessAlarm::new();

        alarm.update(driving(true, true), t(0), &config, &log);
        assert!(alarm.request_stop());
        assert!(!alarm.request_stop());

        let d = alarm.update(driving(true, true), t(1), &config, &log);
        assert!(!d.should_activate_speaker);
        assert_eq!(log.count("drowsiness"), 1);

        alarm.update(driving(true, false), t(2), &config, &log);
        assert!(!alarm.is_silenced());
        let d = alarm.update(driving(true, true), t(3), &config, &log);
        assert!(d.activated);
        assert_eq!(log.count("drowsiness"), 2);
    }

    #[test]
    fn test_parking_clears_no_face_timer() {
        let log = MemoryEventLog::new();
        let config = DrowsinessConfig::default();
        let mut alarm = DrowsinessAlarm::new();

        alarm.update(driving(false, false), t(0), &config, &log);
        let parked = AlarmInput {
            face_detected: false,
            fatigue_alarm_on: false,
            is_driving: false,
        };
        alarm.update(parked, t(5), &config, &log);
        assert_eq!(alarm.no_face_since, None);

        // Timer restarts from scratch after pulling away
        let d = alarm.update(driving(false, false), t(12), &config, &log);
        assert!(!d.should_activate_speaker);
    }

    proptest! {
        #[test]
        fn prop_parked_never_sounds(
            inputs in proptest::collection::vec((any::<bool>(), any::<bool>()), 1..100),
        ) {
            let log = MemoryEventLog::new();
            let config = DrowsinessConfig::default();
            let mut alarm = DrowsinessAlarm::new();
            for (i, (face_detected, fatigue_alarm_on)) in inputs.into_iter().enumerate() {
                let input = AlarmInput { face_detected, fatigue_alarm_on, is_driving: false };
                let d = alarm.update(input, t(i as i64 * 5), &config, &log);
                prop_assert!(!d.should_activate_speaker);
            }
            prop_assert!(log.texts().is_empty());
        }
    }
}
