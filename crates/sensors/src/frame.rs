//! Per-frame face / eye observations

use serde::{Deserialize, Serialize};

use crate::CameraError;

/// Eye contour points in pixel coordinates (6 per eye)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EyeLandmarks {
    pub left: Vec<(f32, f32)>,
    pub right: Vec<(f32, f32)>,
}

/// Output of the face-landmark pipeline for one camera frame
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameObservation {
    /// Whether a face was found
    pub face_detected: bool,

    /// Average eye aspect ratio of both eyes (absent without a face)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ear: Option<f64>,

    /// Eye landmark points, for overlays
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eye_landmarks: Option<EyeLandmarks>,
}

impl FrameObservation {
    /// Frame with a face and the given EAR
    pub fn face(ear: f64) -> Self {
        Self {
            face_detected: true,
            ear: Some(ear),
            eye_landmarks: None,
        }
    }

    /// Frame without a face
    pub fn no_face() -> Self {
        Self::default()
    }

    /// EAR as seen by the engines: `None` unless a face with a finite ratio is present
    pub fn effective_ear(&self) -> Option<f64> {
        if !self.face_detected {
            return None;
        }
        self.ear.filter(|v| v.is_finite())
    }

    /// Whether the eyes count as closed for `threshold`
    pub fn eyes_closed(&self, threshold: f64) -> bool {
        self.effective_ear().map_or(false, |ear| ear < threshold)
    }
}

/// Blocking source of frame observations (one call per loop cycle)
pub trait FrameSource: Send {
    fn next_frame(&mut self) -> Result<FrameObservation, CameraError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_face_hides_ear() {
        let frame = FrameObservation {
            face_detected: false,
            ear: Some(0.1),
            eye_landmarks: None,
        };
        assert_eq!(frame.effective_ear(), None);
        assert!(!frame.eyes_closed(0.2));
    }

    #[test]
    fn test_eyes_closed_below_threshold() {
        assert!(FrameObservation::face(0.15).eyes_closed(0.2));
        assert!(!FrameObservation::face(0.2).eyes_closed(0.2));
        assert!(!FrameObservation::face(f64::NAN).eyes_closed(0.2));
    }

    #[test]
    fn test_deserialize_minimal() {
        let frame: FrameObservation = serde_json::from_str(r#"{"face_detected":true,"ear":0.31}"#).unwrap();
        assert_eq!(frame, FrameObservation::face(0.31));
    }
}
