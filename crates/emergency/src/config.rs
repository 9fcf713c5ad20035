//! Emergency engine configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

/// Emergency configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmergencyConfig {
    /// How long after an impact escalation may start (seconds)
    pub window_secs: f64,
    /// Sustained eyes-closed time that raises an alert (seconds)
    pub eyes_closed_secs: f64,
    /// Sustained no-face time that raises an alert (seconds)
    pub no_face_secs: f64,
    /// Time the driver has to cancel an alert (seconds)
    pub response_timeout_secs: f64,
}

impl Default for EmergencyConfig {
    fn default() -> Self {
        Self {
            window_secs: 60.0,
            eyes_closed_secs: 10.0,
            no_face_secs: 10.0,
            response_timeout_secs: 10.0,
        }
    }
}

impl EmergencyConfig {
    /// Replace non-finite or non-positive durations with defaults
    pub fn sanitized(mut self) -> Self {
        let defaults = Self::default();
        let fields = [
            ("window_secs", &mut self.window_secs, defaults.window_secs),
            ("eyes_closed_secs", &mut self.eyes_closed_secs, defaults.eyes_closed_secs),
            ("no_face_secs", &mut self.no_face_secs, defaults.no_face_secs),
            (
                "response_timeout_secs",
                &mut self.response_timeout_secs,
                defaults.response_timeout_secs,
            ),
        ];
        for (name, value, default) in fields {
            if !(value.is_finite() && *value > 0.0) {
                warn!(field = name, value = *value, "Invalid emergency duration, using default");
                *value = default;
            }
        }
        self
    }

    pub fn window(&self) -> Duration {
        Duration::from_secs_f64(self.window_secs)
    }

    pub fn eyes_closed(&self) -> Duration {
        Duration::from_secs_f64(self.eyes_closed_secs)
    }

    pub fn no_face(&self) -> Duration {
        Duration::from_secs_f64(self.no_face_secs)
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.response_timeout_secs)
    }
}
