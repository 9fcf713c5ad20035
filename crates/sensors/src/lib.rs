//! Sensor Inputs for the Driver Monitor
//!
//! Everything the frame loop reads from the outside world:
//! - Per-frame face/EAR observations from the external landmark pipeline
//! - ADXL345 accelerometer (I2C) and impact classification
//! - GPS fixes from an NMEA serial receiver
//! - Speaker actuation (sysfs PWM)
//! - Injectable wall-clock time source

pub mod accel;
#[cfg(target_os = "linux")]
pub mod adxl345;
pub mod clock;
pub mod frame;
pub mod gps;
pub mod replay;
pub mod speaker;

pub use accel::{
    AccelConfig, AccelError, AccelReading, AccelSample, AccelSource, ImpactDetector, ImpactEvent,
    ImpactKind, LastKnownAccel, STANDARD_GRAVITY,
};
pub use clock::{elapsed, Clock, ManualClock, SystemClock, Timestamp};
pub use frame::{EyeLandmarks, FrameObservation, FrameSource};
pub use gps::{
    GpsConfig, GpsError, GpsFix, GpsReceiver, GpsService, GpsSource, NmeaTracker, SimulatedGps,
};
pub use replay::{DriveSample, RecordedAccel, RecordedDrive, RecordedGps};
pub use speaker::{
    open_speaker, PwmSpeaker, SilentSpeaker, Speaker, SpeakerConfig, SpeakerError, SpeakerKind,
};

use thiserror::Error;

/// Camera / landmark pipeline error types
#[derive(Error, Debug)]
pub enum CameraError {
    #[error("Failed to open frame source: {0}")]
    Open(String),

    #[error("Frame read failed: {0}")]
    Read(String),

    #[error("Malformed observation: {0}")]
    Malformed(String),

    #[error("Frame source exhausted")]
    EndOfStream,
}
