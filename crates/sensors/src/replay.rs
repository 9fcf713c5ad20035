//! Line-delimited JSON drive recordings
//!
//! The face-landmark pipeline runs out of process and writes one JSON object
//! per camera frame to a file or FIFO. Each line may also carry the
//! accelerometer and GPS values recorded alongside that frame, so a whole
//! drive can be replayed through the monitor without hardware.

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{info, warn};

use crate::accel::{AccelError, AccelSample, AccelSource};
use crate::frame::{EyeLandmarks, FrameObservation, FrameSource};
use crate::gps::{GpsFix, GpsSource};
use crate::CameraError;

/// One recorded line
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DriveSample {
    pub face_detected: bool,
    #[serde(default)]
    pub ear: Option<f64>,
    #[serde(default)]
    pub eye_landmarks: Option<EyeLandmarks>,
    /// Raw accelerometer axes (m/s^2)
    #[serde(default)]
    pub accel: Option<[f64; 3]>,
    #[serde(default)]
    pub gps: Option<GpsFix>,
}

impl DriveSample {
    pub fn observation(&self) -> FrameObservation {
        FrameObservation {
            face_detected: self.face_detected,
            ear: self.ear,
            eye_landmarks: self.eye_landmarks.clone(),
        }
    }
}

type Latest = Arc<Mutex<Option<DriveSample>>>;

/// Frame source backed by a recording; the accel and GPS views follow the
/// most recently read line
pub struct RecordedDrive {
    lines: Box<dyn BufRead + Send>,
    pace: Option<Duration>,
    latest: Latest,
    line_number: usize,
}

impl RecordedDrive {
    /// Open a recording file or FIFO
    ///
    /// With `pace`, each frame read sleeps for that long to approximate the
    /// camera frame rate.
    pub fn open(path: impl AsRef<Path>, pace: Option<Duration>) -> Result<Self, CameraError> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|e| CameraError::Open(format!("{}: {}", path.display(), e)))?;
        info!("Reading frame observations from {}", path.display());
        Ok(Self::from_reader(BufReader::new(file), pace))
    }

    pub fn from_reader(reader: impl BufRead + Send + 'static, pace: Option<Duration>) -> Self {
        Self {
            lines: Box::new(reader),
            pace,
            latest: Arc::new(Mutex::new(None)),
            line_number: 0,
        }
    }

    /// Accelerometer view over the recording
    pub fn accel_source(&self) -> RecordedAccel {
        RecordedAccel {
            latest: Arc::clone(&self.latest),
        }
    }

    /// GPS view over the recording
    pub fn gps_source(&self) -> RecordedGps {
        RecordedGps {
            latest: Arc::clone(&self.latest),
            last_fix: None,
        }
    }

    fn next_sample(&mut self) -> Result<DriveSample, CameraError> {
        let mut line = String::new();
        loop {
            line.clear();
            let read = self
                .lines
                .read_line(&mut line)
                .map_err(|e| CameraError::Read(e.to_string()))?;
            if read == 0 {
                return Err(CameraError::EndOfStream);
            }
            self.line_number += 1;
            if !line.trim().is_empty() {
                break;
            }
        }

        serde_json::from_str(line.trim())
            .map_err(|e| CameraError::Malformed(format!("line {}: {}", self.line_number, e)))
    }
}

impl FrameSource for RecordedDrive {
    fn next_frame(&mut self) -> Result<FrameObservation, CameraError> {
        if let Some(pace) = self.pace {
            std::thread::sleep(pace);
        }

        let sample = self.next_sample()?;
        let observation = sample.observation();
        *self.latest.lock().unwrap_or_else(|e| e.into_inner()) = Some(sample);
        Ok(observation)
    }
}

/// Accelerometer values taken from the recording
pub struct RecordedAccel {
    latest: Latest,
}

impl AccelSource for RecordedAccel {
    fn read(&mut self) -> Result<AccelSample, AccelError> {
        let latest = self.latest.lock().unwrap_or_else(|e| e.into_inner());
        latest
            .as_ref()
            .and_then(|s| s.accel)
            .map(AccelSample::from)
            .ok_or_else(|| AccelError::Read("no accelerometer value on this line".into()))
    }
}

/// GPS values taken from the recording, holding the last fix between lines
pub struct RecordedGps {
    latest: Latest,
    last_fix: Option<GpsFix>,
}

impl GpsSource for RecordedGps {
    fn read(&mut self) -> Option<GpsFix> {
        let latest = self.latest.lock().unwrap_or_else(|e| e.into_inner());
        match latest.as_ref().and_then(|s| s.gps) {
            Some(fix) if fix.is_valid() => self.last_fix = Some(fix),
            Some(fix) => warn!(?fix, "Ignoring invalid recorded GPS fix"),
            None => {}
        }
        self.last_fix
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};

    const DRIVE: &str = r#"{"face_detected":true,"ear":0.31,"accel":[0.2,0.0,9.8],"gps":{"latitude":37.5,"longitude":127.0,"speed_kmh":42.0}}

{"face_detected":false}
{"face_detected":true,"ear":0.12,"accel":[-6.5,0.1,9.7]}
"#;

    #[test]
    fn test_replay_drives_all_sources() {
        let mut drive = RecordedDrive::from_reader(Cursor::new(DRIVE), None);
        let mut accel = drive.accel_source();
        let mut gps = drive.gps_source();

        let first = drive.next_frame().unwrap();
        assert_eq!(first, FrameObservation::face(0.31));
        assert_eq!(accel.read().unwrap().x, 0.2);
        assert_eq!(gps.read().unwrap().speed_kmh, 42.0);

        // Blank line skipped; no accel or gps on this line
        let second = drive.next_frame().unwrap();
        assert!(!second.face_detected);
        assert!(accel.read().is_err());
        assert_eq!(gps.read().unwrap().speed_kmh, 42.0);

        let third = drive.next_frame().unwrap();
        assert_eq!(third.ear, Some(0.12));
        assert_eq!(accel.read().unwrap().x, -6.5);

        assert!(matches!(drive.next_frame(), Err(CameraError::EndOfStream)));
    }

    #[test]
    fn test_malformed_line_reports_position() {
        let mut drive = RecordedDrive::from_reader(Cursor::new("{\"face_detected\":true}\nnot json\n"), None);
        assert!(drive.next_frame().is_ok());
        match drive.next_frame() {
            Err(CameraError::Malformed(msg)) => assert!(msg.starts_with("line 2")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_open_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"face_detected":true,"ear":0.25}}"#).unwrap();

        let mut drive = RecordedDrive::open(file.path(), None).unwrap();
        assert_eq!(drive.next_frame().unwrap().ear, Some(0.25));
        assert!(RecordedDrive::open("/nonexistent/drive.jsonl", None).is_err());
    }
}
