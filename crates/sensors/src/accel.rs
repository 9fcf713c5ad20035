//! Accelerometer sampling and impact detection

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::clock::Timestamp;

/// Standard gravity (m/s^2)
pub const STANDARD_GRAVITY: f64 = 9.80665;

/// Accelerometer error types
#[derive(Error, Debug)]
pub enum AccelError {
    #[error("Failed to open accelerometer: {0}")]
    Open(String),

    #[error("Accelerometer read failed: {0}")]
    Read(String),

    #[error("Unexpected device id {0:#04x}")]
    WrongDevice(u8),

    #[error("Accelerometer not initialized")]
    NotInitialized,
}

/// Accelerometer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AccelConfig {
    /// Enable the accelerometer
    pub enabled: bool,
    /// I2C device path
    pub i2c_device: String,
    /// I2C address (ADXL345 default: 0x53)
    pub address: u8,
    /// Threshold on the longitudinal (x) axis for an impact (m/s^2)
    pub impact_threshold: f64,
}

impl Default for AccelConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            i2c_device: "/dev/i2c-1".to_string(),
            address: 0x53,
            impact_threshold: 4.0,
        }
    }
}

impl AccelConfig {
    /// Replace invalid values with defaults
    pub fn sanitized(mut self) -> Self {
        let defaults = Self::default();
        if !(self.impact_threshold.is_finite() && self.impact_threshold > 0.0) {
            warn!(value = self.impact_threshold, "Invalid impact threshold, using default");
            self.impact_threshold = defaults.impact_threshold;
        }
        self
    }
}

/// 3-axis acceleration sample in m/s^2
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AccelSample {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl AccelSample {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Resting sample: gravity on the z axis only
    pub fn gravity_only() -> Self {
        Self::new(0.0, 0.0, STANDARD_GRAVITY)
    }

    /// Total magnitude (m/s^2)
    pub fn magnitude(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    /// Total magnitude in g
    pub fn magnitude_g(&self) -> f64 {
        self.magnitude() / STANDARD_GRAVITY
    }
}

impl From<[f64; 3]> for AccelSample {
    fn from(v: [f64; 3]) -> Self {
        Self::new(v[0], v[1], v[2])
    }
}

/// Anything that can produce acceleration samples
pub trait AccelSource: Send {
    fn read(&mut self) -> Result<AccelSample, AccelError>;
}

/// A sample plus whether it was read this cycle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AccelReading {
    pub sample: AccelSample,
    /// `false` when the value is a last-known or default substitute
    pub fresh: bool,
}

/// Wraps an optional sensor and degrades to the last known (or gravity-only) value
pub struct LastKnownAccel {
    source: Option<Box<dyn AccelSource>>,
    last: Option<AccelSample>,
    failures: u32,
}

impl LastKnownAccel {
    pub fn new(source: Option<Box<dyn AccelSource>>) -> Self {
        if source.is_none() {
            info!("No accelerometer available, using gravity-only samples");
        }
        Self {
            source,
            last: None,
            failures: 0,
        }
    }

    /// Whether a physical sensor is attached
    pub fn is_available(&self) -> bool {
        self.source.is_some()
    }

    /// Consecutive failed reads
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Read one sample, never failing
    pub fn read(&mut self) -> AccelReading {
        if let Some(source) = self.source.as_mut() {
            match source.read() {
                Ok(sample) => {
                    self.failures = 0;
                    self.last = Some(sample);
                    return AccelReading { sample, fresh: true };
                }
                Err(e) => {
                    self.failures += 1;
                    debug!("Accelerometer read failed ({}), using last valid data", e);
                }
            }
        }

        AccelReading {
            sample: self.last.unwrap_or_else(AccelSample::gravity_only),
            fresh: false,
        }
    }
}

/// Direction of an impact along the longitudinal axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImpactKind {
    /// Sudden acceleration (positive x)
    Acceleration,
    /// Sudden stop (negative x)
    Stop,
}

impl ImpactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImpactKind::Acceleration => "sudden_acceleration",
            ImpactKind::Stop => "sudden_stop",
        }
    }
}

impl std::fmt::Display for ImpactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A detected threshold crossing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImpactEvent {
    pub occurred_at: Timestamp,
    pub kind: ImpactKind,
    /// Absolute x-axis reading at the crossing (m/s^2)
    pub magnitude: f64,
}

/// Edge-triggered impact classifier
#[derive(Debug, Default)]
pub struct ImpactDetector {
    /// Kind currently held above threshold
    latched: Option<ImpactKind>,
}

impl ImpactDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify a single x-axis value against the threshold
    pub fn classify(x: f64, threshold: f64) -> Option<ImpactKind> {
        if x > threshold {
            Some(ImpactKind::Acceleration)
        } else if x < -threshold {
            Some(ImpactKind::Stop)
        } else {
            None
        }
    }

    /// Feed one reading; returns an event only on a crossing
    pub fn observe(
        &mut self,
        reading: &AccelReading,
        now: Timestamp,
        threshold: f64,
    ) -> Option<ImpactEvent> {
        if !reading.fresh {
            return None;
        }

        let kind = Self::classify(reading.sample.x, threshold);
        let crossed = kind.is_some() && kind != self.latched;
        self.latched = kind;

        let kind = kind.filter(|_| crossed)?;
        let magnitude = reading.sample.x.abs();
        info!("Impact detected: {} {:.2} m/s^2", kind, reading.sample.x);
        Some(ImpactEvent {
            occurred_at: now,
            kind,
            magnitude,
        })
    }
}
