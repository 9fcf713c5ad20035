//! Layered configuration with hot reload
//!
//! `driver-monitor.toml` (optional) is layered under `DRIVER_MONITOR__*`
//! environment variables, e.g. `DRIVER_MONITOR__DROWSINESS__EAR_THRESHOLD=0.18`.
//! The frame loop checks the file's modification time once per cycle and
//! takes a fixed [`ConfigSnapshot`] for the engines.

use dms::DrowsinessConfig;
use emergency::EmergencyConfig;
use notify::{LocationConfig, SmsConfig};
use sensors::{AccelConfig, GpsConfig, SpeakerConfig};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{info, warn};

use crate::ConfigError;

/// Default configuration file name
pub const DEFAULT_CONFIG_FILE: &str = "driver-monitor.toml";

/// Environment variable prefix
pub const ENV_PREFIX: &str = "DRIVER_MONITOR";

/// Diagnostic logging
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter, overridden by `RUST_LOG`
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Status server
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub enabled: bool,
    pub addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            addr: "0.0.0.0:5000".to_string(),
        }
    }
}

/// Frame loop settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoopConfig {
    /// Consecutive failed frame reads before the loop gives up
    pub camera_failure_limit: u32,
    /// Log summary refresh interval (seconds)
    pub summary_refresh_secs: f64,
    /// Append-only event log
    pub event_log_path: PathBuf,
    /// Observation stream from the landmark pipeline (file or FIFO)
    pub frames_path: Option<PathBuf>,
    /// Delay between frames when replaying a recording (milliseconds)
    pub replay_interval_ms: u64,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            camera_failure_limit: 30,
            summary_refresh_secs: 5.0,
            event_log_path: PathBuf::from("driving_events.log"),
            frames_path: None,
            replay_interval_ms: 33,
        }
    }
}

impl LoopConfig {
    pub fn sanitized(mut self) -> Self {
        let defaults = Self::default();
        if self.camera_failure_limit == 0 {
            warn!("camera_failure_limit must be positive, using default");
            self.camera_failure_limit = defaults.camera_failure_limit;
        }
        if !(self.summary_refresh_secs.is_finite() && self.summary_refresh_secs > 0.0) {
            warn!(
                value = self.summary_refresh_secs,
                "Invalid summary refresh interval, using default"
            );
            self.summary_refresh_secs = defaults.summary_refresh_secs;
        }
        self
    }

    pub fn summary_refresh(&self) -> Duration {
        Duration::from_secs_f64(self.summary_refresh_secs)
    }

    pub fn replay_interval(&self) -> Duration {
        Duration::from_millis(self.replay_interval_ms)
    }
}

/// Complete monitor configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub drowsiness: DrowsinessConfig,
    pub emergency: EmergencyConfig,
    pub accel: AccelConfig,
    pub gps: GpsConfig,
    pub speaker: SpeakerConfig,
    pub sms: SmsConfig,
    pub location: LocationConfig,
    pub logging: LoggingConfig,
    pub server: ServerConfig,
    pub frame_loop: LoopConfig,
}

impl MonitorConfig {
    /// Replace invalid values with their defaults
    pub fn sanitized(self) -> Self {
        Self {
            drowsiness: self.drowsiness.sanitized(),
            emergency: self.emergency.sanitized(),
            accel: self.accel.sanitized(),
            frame_loop: self.frame_loop.sanitized(),
            ..self
        }
    }

    pub fn snapshot(&self) -> ConfigSnapshot {
        ConfigSnapshot {
            drowsiness: self.drowsiness.clone(),
            emergency: self.emergency.clone(),
            impact_threshold: self.accel.impact_threshold,
        }
    }
}

/// Engine parameters for one cycle
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigSnapshot {
    pub drowsiness: DrowsinessConfig,
    pub emergency: EmergencyConfig,
    /// Longitudinal impact threshold (m/s^2)
    pub impact_threshold: f64,
}

impl Default for ConfigSnapshot {
    fn default() -> Self {
        MonitorConfig::default().snapshot()
    }
}

fn read_config(path: Option<&Path>) -> Result<MonitorConfig, ConfigError> {
    let mut builder = ::config::Config::builder();
    if let Some(path) = path {
        builder = builder.add_source(
            ::config::File::from(path.to_path_buf())
                .format(::config::FileFormat::Toml)
                .required(false),
        );
    }
    let config: MonitorConfig = builder
        .add_source(
            ::config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        )
        .build()?
        .try_deserialize()?;
    Ok(config.sanitized())
}

fn modified_time(path: Option<&Path>) -> Option<SystemTime> {
    path.and_then(|p| std::fs::metadata(p).ok())
        .and_then(|meta| meta.modified().ok())
}

/// Owns the current configuration and reloads it when the file changes
#[derive(Debug)]
pub struct ConfigLoader {
    path: Option<PathBuf>,
    modified: Option<SystemTime>,
    current: MonitorConfig,
}

impl ConfigLoader {
    /// Initial load; a missing file means defaults plus environment
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let current = read_config(path)?;
        match path {
            Some(p) if p.exists() => info!("Configuration loaded from {}", p.display()),
            Some(p) => info!("{} not found, using defaults", p.display()),
            None => info!("Using default configuration"),
        }
        Ok(Self {
            path: path.map(Path::to_path_buf),
            modified: modified_time(path),
            current,
        })
    }

    /// Loader that never reloads
    pub fn fixed(config: MonitorConfig) -> Self {
        Self {
            path: None,
            modified: None,
            current: config.sanitized(),
        }
    }

    pub fn current(&self) -> &MonitorConfig {
        &self.current
    }

    pub fn snapshot(&self) -> ConfigSnapshot {
        self.current.snapshot()
    }

    /// Re-read the file if its modification time changed.
    ///
    /// Returns `true` when a new configuration was applied. A file that fails
    /// to parse leaves the previous configuration in place.
    pub fn reload_if_changed(&mut self) -> bool {
        let Some(path) = self.path.as_deref() else {
            return false;
        };
        let modified = modified_time(Some(path));
        if modified == self.modified {
            return false;
        }
        self.modified = modified;

        match read_config(Some(path)) {
            Ok(config) => {
                info!("Configuration reloaded from {}", path.display());
                self.current = config;
                true
            }
            Err(e) => {
                warn!("Config reload failed, keeping previous values: {}", e);
                false
            }
        }
    }
}
