//! Alarm speaker output

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Speaker error types
#[derive(Error, Debug)]
pub enum SpeakerError {
    #[error("Failed to set up PWM channel: {0}")]
    Setup(String),

    #[error("PWM write failed: {0}")]
    Write(String),
}

/// Speaker backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeakerKind {
    /// Buzzer on a sysfs PWM channel
    Pwm,
    /// No audible output (logs state changes only)
    Silent,
}

/// Speaker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeakerConfig {
    pub kind: SpeakerKind,
    /// sysfs PWM chip directory
    pub pwm_chip: PathBuf,
    pub channel: u32,
    /// Tone frequency (Hz)
    pub frequency_hz: u32,
}

impl Default for SpeakerConfig {
    fn default() -> Self {
        Self {
            kind: SpeakerKind::Pwm,
            pwm_chip: PathBuf::from("/sys/class/pwm/pwmchip0"),
            channel: 0,
            frequency_hz: 440,
        }
    }
}

/// On/off alarm output
pub trait Speaker: Send {
    fn set_active(&mut self, active: bool) -> Result<(), SpeakerError>;
    fn is_active(&self) -> bool;
}

/// Speaker that only tracks its state
#[derive(Debug, Default)]
pub struct SilentSpeaker {
    active: bool,
}

impl SilentSpeaker {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Speaker for SilentSpeaker {
    fn set_active(&mut self, active: bool) -> Result<(), SpeakerError> {
        if active != self.active {
            debug!(active, "Speaker (silent) state changed");
        }
        self.active = active;
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.active
    }
}

/// Square-wave buzzer on a sysfs PWM channel at 50% duty
pub struct PwmSpeaker {
    chip: PathBuf,
    channel_dir: PathBuf,
    channel: u32,
    active: bool,
}

fn write_attr(path: &Path, value: impl ToString) -> Result<(), SpeakerError> {
    fs::write(path, value.to_string()).map_err(|e| SpeakerError::Write(format!("{}: {}", path.display(), e)))
}

impl PwmSpeaker {
    /// Export the channel and program the tone period
    pub fn open(config: &SpeakerConfig) -> Result<Self, SpeakerError> {
        if config.frequency_hz == 0 {
            return Err(SpeakerError::Setup("frequency must be positive".into()));
        }

        let channel_dir = config.pwm_chip.join(format!("pwm{}", config.channel));
        if !channel_dir.exists() {
            write_attr(&config.pwm_chip.join("export"), config.channel)
                .map_err(|e| SpeakerError::Setup(e.to_string()))?;
        }

        let period_ns = 1_000_000_000u64 / u64::from(config.frequency_hz);
        // Period before duty: the kernel rejects duty > period
        write_attr(&channel_dir.join("enable"), 0)?;
        write_attr(&channel_dir.join("period"), period_ns)?;
        write_attr(&channel_dir.join("duty_cycle"), period_ns / 2)?;

        info!(
            "PWM speaker ready on {} at {} Hz",
            channel_dir.display(),
            config.frequency_hz
        );
        Ok(Self {
            chip: config.pwm_chip.clone(),
            channel_dir,
            channel: config.channel,
            active: false,
        })
    }
}

impl Speaker for PwmSpeaker {
    fn set_active(&mut self, active: bool) -> Result<(), SpeakerError> {
        if active == self.active {
            return Ok(());
        }
        write_attr(&self.channel_dir.join("enable"), u8::from(active))?;
        self.active = active;
        debug!(active, "Speaker state changed");
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.active
    }
}

impl Drop for PwmSpeaker {
    fn drop(&mut self) {
        if let Err(e) = write_attr(&self.channel_dir.join("enable"), 0) {
            warn!("Failed to silence speaker: {}", e);
        }
        let _ = write_attr(&self.chip.join("unexport"), self.channel);
    }
}

/// Open the configured speaker, degrading to silent when the PWM channel is unavailable
pub fn open_speaker(config: &SpeakerConfig) -> Box<dyn Speaker> {
    match config.kind {
        SpeakerKind::Silent => Box::new(SilentSpeaker::new()),
        SpeakerKind::Pwm => match PwmSpeaker::open(config) {
            Ok(speaker) => Box::new(speaker),
            Err(e) => {
                warn!("PWM speaker unavailable ({}), alarms will be silent", e);
                Box::new(SilentSpeaker::new())
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_chip() -> (tempfile::TempDir, SpeakerConfig) {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("pwm0")).unwrap();
        let config = SpeakerConfig {
            kind: SpeakerKind::Pwm,
            pwm_chip: dir.path().to_path_buf(),
            channel: 0,
            frequency_hz: 440,
        };
        (dir, config)
    }

    fn read(path: PathBuf) -> String {
        fs::read_to_string(path).unwrap()
    }

    #[test]
    fn test_pwm_programs_half_duty() {
        let (dir, config) = fake_chip();
        let _speaker = PwmSpeaker::open(&config).unwrap();
        assert_eq!(read(dir.path().join("pwm0/period")), "2272727");
        assert_eq!(read(dir.path().join("pwm0/duty_cycle")), "1136363");
    }

    #[test]
    fn test_pwm_toggles_and_releases_on_drop() {
        let (dir, config) = fake_chip();
        let mut speaker = PwmSpeaker::open(&config).unwrap();

        speaker.set_active(true).unwrap();
        assert!(speaker.is_active());
        assert_eq!(read(dir.path().join("pwm0/enable")), "1");

        drop(speaker);
        assert_eq!(read(dir.path().join("pwm0/enable")), "0");
        assert_eq!(read(dir.path().join("unexport")), "0");
    }

    #[test]
    fn test_missing_chip_falls_back_to_silent() {
        let config = SpeakerConfig {
            pwm_chip: PathBuf::from("/nonexistent/pwmchip9"),
            ..Default::default()
        };
        let mut speaker = open_speaker(&config);
        speaker.set_active(true).unwrap();
        assert!(speaker.is_active());
    }
}
