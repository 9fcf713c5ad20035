//! DMS analysis results

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::state::AlarmCause;

/// Coarse driver condition shown on the dashboard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriverCondition {
    #[default]
    Normal,
    Sleepy,
    NoFace,
}

impl DriverCondition {
    pub fn as_str(&self) -> &'static str {
        match self {
            DriverCondition::Normal => "normal",
            DriverCondition::Sleepy => "sleepy",
            DriverCondition::NoFace => "no_face",
        }
    }
}

/// Result of one frame through the DMS
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DrowsinessAnalysis {
    pub face_detected: bool,
    /// EAR used for this frame, if any
    pub ear: Option<f64>,
    /// Debounced fatigue signal
    pub fatigue_alarm_on: bool,
    pub is_driving: bool,
    pub condition: DriverCondition,
    pub should_activate_speaker: bool,
    pub alarm_duration: Duration,
    pub no_face_duration: Duration,
    pub show_popup: bool,
    pub cause: Option<AlarmCause>,
    /// Speaker turned on this frame
    pub activated: bool,
}

impl DrowsinessAnalysis {
    /// Eyes closed on this frame for `threshold`
    pub fn eyes_closed(&self, threshold: f64) -> bool {
        self.ear.map_or(false, |ear| ear < threshold)
    }
}
