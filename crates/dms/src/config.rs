//! DMS configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

/// Drowsiness detection configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DrowsinessConfig {
    /// Eye aspect ratio below which eyes count as closed
    pub ear_threshold: f64,

    /// Consecutive low-EAR frames before the fatigue alarm latches
    pub consecutive_frames: u32,

    /// GPS speed at or above which the vehicle counts as driving (km/h)
    pub driving_speed_kmh: f64,

    /// How long the face may be missing while driving before alarming (seconds)
    pub no_face_grace_secs: f64,

    /// Speaker-on time before the UI popup is shown (seconds)
    pub popup_delay_secs: f64,
}

impl Default for DrowsinessConfig {
    fn default() -> Self {
        Self {
            ear_threshold: 0.20,
            consecutive_frames: 30,
            driving_speed_kmh: 10.0,
            no_face_grace_secs: 10.0,
            popup_delay_secs: 1.0,
        }
    }
}

fn positive(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

fn non_negative(value: f64) -> bool {
    value.is_finite() && value >= 0.0
}

impl DrowsinessConfig {
    /// Create strict config (reacts sooner)
    pub fn strict() -> Self {
        Self {
            ear_threshold: 0.22,
            consecutive_frames: 15,
            no_face_grace_secs: 5.0,
            ..Default::default()
        }
    }

    /// Create lenient config (fewer false alarms)
    pub fn lenient() -> Self {
        Self {
            ear_threshold: 0.18,
            consecutive_frames: 45,
            no_face_grace_secs: 15.0,
            ..Default::default()
        }
    }

    /// Replace invalid values with their defaults
    pub fn sanitized(mut self) -> Self {
        let defaults = Self::default();
        if !positive(self.ear_threshold) {
            warn!(value = self.ear_threshold, "Invalid ear_threshold, using default");
            self.ear_threshold = defaults.ear_threshold;
        }
        if self.consecutive_frames == 0 {
            warn!("consecutive_frames must be at least 1, using default");
            self.consecutive_frames = defaults.consecutive_frames;
        }
        if !non_negative(self.driving_speed_kmh) {
            warn!(value = self.driving_speed_kmh, "Invalid driving_speed_kmh, using default");
            self.driving_speed_kmh = defaults.driving_speed_kmh;
        }
        if !non_negative(self.no_face_grace_secs) {
            warn!(value = self.no_face_grace_secs, "Invalid no_face_grace_secs, using default");
            self.no_face_grace_secs = defaults.no_face_grace_secs;
        }
        if !non_negative(self.popup_delay_secs) {
            warn!(value = self.popup_delay_secs, "Invalid popup_delay_secs, using default");
            self.popup_delay_secs = defaults.popup_delay_secs;
        }
        self
    }

    pub fn no_face_grace(&self) -> Duration {
        Duration::from_secs_f64(self.no_face_grace_secs)
    }

    pub fn popup_delay(&self) -> Duration {
        Duration::from_secs_f64(self.popup_delay_secs)
    }

    /// Whether `speed_kmh` counts as driving
    pub fn is_driving(&self, speed_kmh: f64) -> bool {
        speed_kmh >= self.driving_speed_kmh
    }
}
