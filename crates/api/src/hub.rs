//! Lock-guarded status shared between the frame loop and the server
//!
//! Every publish and every read is one critical section, and the two request
//! flags are read-and-cleared atomically so each signal is consumed once.

use emergency::EmergencyStatus;
use event_log::LogSummary;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};

/// Drowsiness panel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrowsinessStatus {
    /// EAR of the current frame (0.0 without a face)
    pub ear: f64,
    pub threshold: f64,
    /// "sleepy", "normal" or "no_face"
    pub state: String,
    pub alarm_on: bool,
    pub speaker_active: bool,
    pub alarm_duration: f64,
    pub show_popup: bool,
    pub face_detected: bool,
    pub timestamp: String,
}

impl Default for DrowsinessStatus {
    fn default() -> Self {
        Self {
            ear: 0.0,
            threshold: 0.0,
            state: "no_face".to_string(),
            alarm_on: false,
            speaker_active: false,
            alarm_duration: 0.0,
            show_popup: false,
            face_detected: false,
            timestamp: String::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AccelData {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GpsPosition {
    pub latitude: f64,
    pub longitude: f64,
}

/// Dashboard system panel
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SystemStatus {
    pub connection_status: String,
    pub sensor_status: String,
    /// Total acceleration in g
    pub accel_magnitude: f64,
    pub accel_data: AccelData,
    pub gps_position: GpsPosition,
    pub gps_position_string: String,
    pub speed_kmh: f64,
    pub impact_detected: bool,
    pub report_status: EmergencyStatus,
    pub timestamp: String,
}

impl Default for SystemStatus {
    fn default() -> Self {
        Self {
            connection_status: "Waiting".to_string(),
            sensor_status: "Camera / Accelerometer: Waiting".to_string(),
            accel_magnitude: 0.0,
            accel_data: AccelData::default(),
            gps_position: GpsPosition::default(),
            gps_position_string: "(-, -)".to_string(),
            speed_kmh: 0.0,
            impact_detected: false,
            report_status: EmergencyStatus::default(),
            timestamp: String::new(),
        }
    }
}

#[derive(Debug, Default)]
struct HubInner {
    drowsiness: DrowsinessStatus,
    system: SystemStatus,
    log_summary: LogSummary,
    user_response: bool,
    stop_speaker: bool,
}

/// Shared status snapshot and request flags
#[derive(Debug, Clone, Default)]
pub struct StatusHub {
    inner: Arc<Mutex<HubInner>>,
}

impl StatusHub {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HubInner> {
        // A panicked writer leaves whole values behind, never torn ones
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Replace both per-frame snapshots together
    pub fn publish(&self, drowsiness: DrowsinessStatus, system: SystemStatus) {
        let mut inner = self.lock();
        inner.drowsiness = drowsiness;
        inner.system = system;
    }

    pub fn publish_log_summary(&self, summary: LogSummary) {
        self.lock().log_summary = summary;
    }

    pub fn drowsiness(&self) -> DrowsinessStatus {
        self.lock().drowsiness.clone()
    }

    pub fn system(&self) -> SystemStatus {
        self.lock().system.clone()
    }

    pub fn log_summary(&self) -> LogSummary {
        self.lock().log_summary.clone()
    }

    /// Record a remote acknowledgment
    pub fn request_user_response(&self) {
        self.lock().user_response = true;
    }

    /// Record a stop-speaker request
    pub fn request_stop_speaker(&self) {
        self.lock().stop_speaker = true;
    }

    /// Consume a pending acknowledgment
    pub fn take_user_response(&self) -> bool {
        std::mem::take(&mut self.lock().user_response)
    }

    /// Consume a pending stop-speaker request
    pub fn take_stop_speaker(&self) -> bool {
        std::mem::take(&mut self.lock().stop_speaker)
    }
}
