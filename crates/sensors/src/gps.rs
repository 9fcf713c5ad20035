//! GPS position and speed
//!
//! A background task reads NMEA sentences from the serial receiver and
//! publishes the latest fix on a watch channel; the frame loop only ever
//! looks at the most recent value.

use serde::{Deserialize, Serialize};
use std::time::Instant;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, info, warn};

/// km/h per knot
const KMH_PER_KNOT: f64 = 1.852;

/// GPS error types
#[derive(Error, Debug)]
pub enum GpsError {
    #[error("Failed to open GPS port: {0}")]
    Open(String),

    #[error("Invalid NMEA sentence: {0}")]
    Parse(String),

    #[error("Checksum mismatch: expected {expected:02X}, got {actual:02X}")]
    Checksum { expected: u8, actual: u8 },
}

/// GPS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GpsConfig {
    /// Enable the serial receiver
    pub enabled: bool,
    /// Use the simulated receiver instead of hardware
    pub simulate: bool,
    /// Serial device path
    pub serial_port: String,
    /// Serial baud rate
    pub baud_rate: u32,
}

impl Default for GpsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            simulate: false,
            serial_port: "/dev/serial0".to_string(),
            baud_rate: 9600,
        }
    }
}

/// Position and speed at one instant
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GpsFix {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub altitude_m: f64,
    #[serde(default)]
    pub speed_kmh: f64,
}

impl GpsFix {
    /// Usable position: finite, in range, and not the all-zero null fix
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.latitude.abs() <= 90.0
            && self.longitude.abs() <= 180.0
            && !(self.latitude == 0.0 && self.longitude == 0.0)
    }

    /// Same position, speed reset to zero
    pub fn stationary(self) -> Self {
        Self {
            speed_kmh: 0.0,
            ..self
        }
    }

    /// "(lat, lon)" with four decimals
    pub fn position_string(&self) -> String {
        format!("({:.4}, {:.4})", self.latitude, self.longitude)
    }
}

/// Latest-fix reader used once per cycle
pub trait GpsSource: Send {
    fn read(&mut self) -> Option<GpsFix>;
}

/// One decoded NMEA sentence
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NmeaSentence {
    /// Recommended minimum data: position and ground speed
    Rmc {
        latitude: f64,
        longitude: f64,
        speed_kmh: f64,
    },
    /// Fix data: position and altitude
    Gga {
        latitude: f64,
        longitude: f64,
        altitude_m: f64,
    },
}

fn parse_coordinate(value: &str, hemisphere: &str, degree_digits: usize) -> Result<f64, GpsError> {
    if !value.is_ascii() || value.len() < degree_digits + 2 {
        return Err(GpsError::Parse(format!("coordinate '{}'", value)));
    }
    let (degrees, minutes) = value.split_at(degree_digits);
    let degrees: f64 = degrees
        .parse()
        .map_err(|_| GpsError::Parse(format!("degrees '{}'", value)))?;
    let minutes: f64 = minutes
        .parse()
        .map_err(|_| GpsError::Parse(format!("minutes '{}'", value)))?;
    let decimal = degrees + minutes / 60.0;
    match hemisphere {
        "N" | "E" => Ok(decimal),
        "S" | "W" => Ok(-decimal),
        other => Err(GpsError::Parse(format!("hemisphere '{}'", other))),
    }
}

fn verify_checksum(line: &str) -> Result<&str, GpsError> {
    let body = line
        .trim()
        .strip_prefix('$')
        .ok_or_else(|| GpsError::Parse("missing '$'".into()))?;

    match body.split_once('*') {
        Some((payload, checksum)) => {
            let expected = u8::from_str_radix(checksum.trim(), 16)
                .map_err(|_| GpsError::Parse(format!("checksum '{}'", checksum)))?;
            let actual = payload.bytes().fold(0u8, |acc, b| acc ^ b);
            if expected != actual {
                return Err(GpsError::Checksum { expected, actual });
            }
            Ok(payload)
        }
        None => Ok(body),
    }
}

/// Parse an RMC or GGA sentence from any talker (GP, GN, ...)
///
/// Returns `Ok(None)` for other sentence types and for sentences without a fix.
pub fn parse_nmea(line: &str) -> Result<Option<NmeaSentence>, GpsError> {
    let payload = verify_checksum(line)?;
    let fields: Vec<&str> = payload.split(',').collect();
    let kind = fields.first().map(|f| f.get(2..).unwrap_or("")).unwrap_or("");

    match kind {
        "RMC" => {
            if fields.len() < 8 {
                return Err(GpsError::Parse("short RMC".into()));
            }
            if fields[2] != "A" || fields[3].is_empty() {
                return Ok(None);
            }
            let latitude = parse_coordinate(fields[3], fields[4], 2)?;
            let longitude = parse_coordinate(fields[5], fields[6], 3)?;
            let knots: f64 = if fields[7].is_empty() {
                0.0
            } else {
                fields[7]
                    .parse()
                    .map_err(|_| GpsError::Parse(format!("speed '{}'", fields[7])))?
            };
            Ok(Some(NmeaSentence::Rmc {
                latitude,
                longitude,
                speed_kmh: knots * KMH_PER_KNOT,
            }))
        }
        "GGA" => {
            if fields.len() < 10 {
                return Err(GpsError::Parse("short GGA".into()));
            }
            if fields[6] == "0" || fields[2].is_empty() {
                return Ok(None);
            }
            let latitude = parse_coordinate(fields[2], fields[3], 2)?;
            let longitude = parse_coordinate(fields[4], fields[5], 3)?;
            let altitude_m = fields[9].parse().unwrap_or(0.0);
            Ok(Some(NmeaSentence::Gga {
                latitude,
                longitude,
                altitude_m,
            }))
        }
        _ => Ok(None),
    }
}

/// Merges RMC and GGA sentences into a running fix
#[derive(Debug, Default)]
pub struct NmeaTracker {
    fix: Option<GpsFix>,
}

impl NmeaTracker {
    /// Feed one line; returns the updated fix if it changed
    pub fn feed(&mut self, line: &str) -> Option<GpsFix> {
        let sentence = match parse_nmea(line) {
            Ok(Some(s)) => s,
            Ok(None) => return None,
            Err(e) => {
                debug!("Skipping NMEA line: {}", e);
                return None;
            }
        };

        let mut fix = self.fix.unwrap_or_default();
        match sentence {
            NmeaSentence::Rmc {
                latitude,
                longitude,
                speed_kmh,
            } => {
                fix.latitude = latitude;
                fix.longitude = longitude;
                fix.speed_kmh = speed_kmh;
            }
            NmeaSentence::Gga {
                latitude,
                longitude,
                altitude_m,
            } => {
                fix.latitude = latitude;
                fix.longitude = longitude;
                fix.altitude_m = altitude_m;
            }
        }
        self.fix = Some(fix);
        self.fix
    }

    /// Last known fix with speed zeroed, used after a read error
    pub fn degrade(&mut self) -> Option<GpsFix> {
        self.fix = self.fix.map(GpsFix::stationary);
        self.fix
    }
}

/// Receiving end of the GPS watch channel
#[derive(Debug, Clone)]
pub struct GpsReceiver {
    receiver: watch::Receiver<Option<GpsFix>>,
}

impl GpsReceiver {
    pub fn latest(&self) -> Option<GpsFix> {
        *self.receiver.borrow()
    }
}

impl GpsSource for GpsReceiver {
    fn read(&mut self) -> Option<GpsFix> {
        self.latest()
    }
}

/// Serial NMEA reader running on the tokio runtime
pub struct GpsService {
    receiver: GpsReceiver,
    task: JoinHandle<()>,
}

impl GpsService {
    /// Open the serial port and spawn the reader task on `runtime`
    pub fn spawn(runtime: &tokio::runtime::Handle, config: &GpsConfig) -> Result<Self, GpsError> {
        let port = {
            let _guard = runtime.enter();
            tokio_serial::new(&config.serial_port, config.baud_rate)
                .open_native_async()
                .map_err(|e| GpsError::Open(format!("{}: {}", config.serial_port, e)))?
        };
        info!("GPS receiver opened on {}", config.serial_port);

        let (tx, rx) = watch::channel(None);
        let task = runtime.spawn(async move {
            let mut lines = BufReader::new(port).lines();
            let mut tracker = NmeaTracker::default();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        if let Some(fix) = tracker.feed(&line) {
                            if tx.send(Some(fix)).is_err() {
                                debug!("GPS receiver dropped");
                                break;
                            }
                        }
                    }
                    Ok(None) => {
                        warn!("GPS serial stream closed");
                        let _ = tx.send(tracker.degrade());
                        break;
                    }
                    Err(e) => {
                        warn!("GPS read error: {}", e);
                        if tx.send(tracker.degrade()).is_err() {
                            break;
                        }
                    }
                }
            }
        });

        Ok(Self {
            receiver: GpsReceiver { receiver: rx },
            task,
        })
    }

    /// Handle for reading the latest fix
    pub fn receiver(&self) -> GpsReceiver {
        self.receiver.clone()
    }
}

impl Drop for GpsService {
    fn drop(&mut self) {
        // Dropping the task releases the serial port
        self.task.abort();
    }
}

/// Simulated receiver drifting around a fixed point
pub struct SimulatedGps {
    base_latitude: f64,
    base_longitude: f64,
    started: Instant,
}

impl SimulatedGps {
    pub fn new(base_latitude: f64, base_longitude: f64) -> Self {
        info!("GPS running in simulation mode");
        Self {
            base_latitude,
            base_longitude,
            started: Instant::now(),
        }
    }

    /// Fix after `elapsed_secs` of simulated driving
    pub fn fix_at(&self, elapsed_secs: f64) -> GpsFix {
        GpsFix {
            latitude: self.base_latitude + (elapsed_secs / 100.0).sin() * 0.001,
            longitude: self.base_longitude + (elapsed_secs / 100.0).cos() * 0.001,
            altitude_m: 0.0,
            speed_kmh: (elapsed_secs / 50.0).sin().abs() * 30.0,
        }
    }
}

impl Default for SimulatedGps {
    fn default() -> Self {
        Self::new(37.5665, 126.9780)
    }
}

impl GpsSource for SimulatedGps {
    fn read(&mut self) -> Option<GpsFix> {
        Some(self.fix_at(self.started.elapsed().as_secs_f64()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const RMC: &str = "$GPRMC,123519,A,4807.038,N,01131.000,E,022.4,084.4,230394,003.1,W*6A";
    const GGA: &str = "$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*47";

    #[test]
    fn test_parse_rmc() {
        match parse_nmea(RMC).unwrap() {
            Some(NmeaSentence::Rmc {
                latitude,
                longitude,
                speed_kmh,
            }) => {
                assert!((latitude - 48.1173).abs() < 1e-4);
                assert!((longitude - 11.516_666).abs() < 1e-4);
                assert!((speed_kmh - 22.4 * 1.852).abs() < 1e-9);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse_gga_altitude() {
        match parse_nmea(GGA).unwrap() {
            Some(NmeaSentence::Gga { altitude_m, .. }) => assert_eq!(altitude_m, 545.4),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_checksum_mismatch() {
        let corrupted = RMC.replace("*6A", "*00");
        assert!(matches!(parse_nmea(&corrupted), Err(GpsError::Checksum { .. })));
    }

    #[test]
    fn test_line_noise_in_coordinate_is_parse_error() {
        let noisy = "$GPRMC,123519,A,4\u{e9}07.038,N,01131.000,E,022.4,084.4,230394,003.1,W";
        assert!(matches!(parse_nmea(noisy), Err(GpsError::Parse(_))));

        let noisy = "$GPGGA,123519,4807.038,N,0113\u{b0}1.000,E,1,08,0.9,545.4,M,46.9,M,,";
        assert!(matches!(parse_nmea(noisy), Err(GpsError::Parse(_))));
    }

    proptest! {
        #[test]
        fn prop_parse_never_panics(line in "\\$GP(RMC|GGA),[^*\n]{0,80}") {
            let _ = parse_nmea(&line);
        }
    }

    #[test]
    fn test_void_rmc_has_no_fix() {
        let void = "$GPRMC,123519,V,,,,,,,230394,,";
        assert_eq!(parse_nmea(void).unwrap(), None);
    }

    #[test]
    fn test_tracker_merges_and_degrades() {
        let mut tracker = NmeaTracker::default();
        tracker.feed(RMC);
        let fix = tracker.feed(GGA).unwrap();
        assert_eq!(fix.altitude_m, 545.4);
        assert!(fix.speed_kmh > 40.0);

        let degraded = tracker.degrade().unwrap();
        assert_eq!(degraded.speed_kmh, 0.0);
        assert_eq!(degraded.latitude, fix.latitude);
    }

    #[test]
    fn test_null_fix_is_invalid() {
        assert!(!GpsFix::default().is_valid());
        let fix = GpsFix {
            latitude: 37.5,
            longitude: 127.0,
            ..Default::default()
        };
        assert!(fix.is_valid());
        assert_eq!(fix.position_string(), "(37.5000, 127.0000)");
    }

    #[test]
    fn test_simulated_speed_bounded() {
        let gps = SimulatedGps::default();
        for t in [0.0, 12.5, 78.0, 400.0] {
            let fix = gps.fix_at(t);
            assert!((0.0..=30.0).contains(&fix.speed_kmh));
            assert!(fix.is_valid());
        }
    }
}
