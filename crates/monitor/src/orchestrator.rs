//! Frame orchestration loop
//!
//! One synchronous cycle per camera frame, always in the same order:
//! config snapshot, frame, accelerometer, GPS, drowsiness, emergency,
//! publication, then the acknowledgment channels.

use api::{AccelData, DrowsinessStatus, GpsPosition, StatusHub, SystemStatus};
use chrono::SecondsFormat;
use dms::{DrowsinessAnalysis, DrowsinessMonitor};
use emergency::{EmergencyEngine, EmergencyInput, EmergencyStatus, ReportStatus};
use event_log::{summarize, summary_cutoff, DriverEvent, EventStore, SUMMARY_DAYS};
use metrics::{counter, gauge};
use notify::LastFix;
use sensors::{
    elapsed, AccelReading, CameraError, Clock, FrameObservation, FrameSource, GpsFix, GpsSource,
    ImpactDetector, LastKnownAccel, Speaker, Timestamp,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::config::{ConfigLoader, ConfigSnapshot};
use crate::input::InputSource;

/// Why the loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Frame source exhausted (end of a recording)
    EndOfStream,
    /// Too many consecutive frame failures
    CameraFailure,
    /// Keyboard quit or signal
    Requested,
}

/// Result of one cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Continue,
    Stop(StopReason),
}

/// Collaborators wired into the loop
pub struct LoopParts {
    pub frames: Box<dyn FrameSource>,
    pub accel: LastKnownAccel,
    pub gps: Option<Box<dyn GpsSource>>,
    pub speaker: Box<dyn Speaker>,
    pub inputs: Vec<Box<dyn InputSource>>,
    pub clock: Arc<dyn Clock>,
    pub log: Arc<dyn EventStore>,
    pub hub: StatusHub,
    /// Shared with the report dispatcher for location lookup
    pub last_fix: LastFix,
    pub emergency: EmergencyEngine,
}

/// Single owner of every engine and of cycle ordering
pub struct FrameLoop {
    frames: Box<dyn FrameSource>,
    accel: LastKnownAccel,
    gps: Option<Box<dyn GpsSource>>,
    speaker: Box<dyn Speaker>,
    inputs: Vec<Box<dyn InputSource>>,
    clock: Arc<dyn Clock>,
    log: Arc<dyn EventStore>,
    hub: StatusHub,
    last_fix: LastFix,
    config: ConfigLoader,
    stop: Arc<AtomicBool>,
    drowsiness: DrowsinessMonitor,
    emergency: EmergencyEngine,
    impacts: ImpactDetector,
    camera_failures: u32,
    summary_refreshed_at: Option<Timestamp>,
    shut_down: bool,
}

impl FrameLoop {
    pub fn new(parts: LoopParts, config: ConfigLoader, stop: Arc<AtomicBool>) -> Self {
        Self {
            frames: parts.frames,
            accel: parts.accel,
            gps: parts.gps,
            speaker: parts.speaker,
            inputs: parts.inputs,
            clock: parts.clock,
            log: parts.log,
            hub: parts.hub,
            last_fix: parts.last_fix,
            config,
            stop,
            drowsiness: DrowsinessMonitor::new(),
            emergency: parts.emergency,
            impacts: ImpactDetector::new(),
            camera_failures: 0,
            summary_refreshed_at: None,
            shut_down: false,
        }
    }

    pub fn emergency(&self) -> &EmergencyEngine {
        &self.emergency
    }

    /// Run until the source ends, the camera fails or a stop is requested
    pub fn run(&mut self) -> StopReason {
        info!("Frame loop started");
        let reason = loop {
            if let CycleOutcome::Stop(reason) = self.step() {
                break reason;
            }
        };
        self.shutdown(reason);
        reason
    }

    /// Execute one cycle
    pub fn step(&mut self) -> CycleOutcome {
        if self.stop.load(Ordering::SeqCst) {
            return CycleOutcome::Stop(StopReason::Requested);
        }

        self.config.reload_if_changed();
        let snapshot = self.config.snapshot();
        let failure_limit = self.config.current().frame_loop.camera_failure_limit;

        let frame = match self.frames.next_frame() {
            Ok(frame) => {
                self.camera_failures = 0;
                frame
            }
            Err(CameraError::EndOfStream) => {
                info!("Frame source ended");
                return CycleOutcome::Stop(StopReason::EndOfStream);
            }
            Err(e) => {
                self.camera_failures += 1;
                counter!("driver_monitor_camera_failures_total").increment(1);
                warn!(
                    consecutive = self.camera_failures,
                    "Frame read failed: {}", e
                );
                if self.camera_failures >= failure_limit {
                    error!(
                        "Camera failed {} times in a row, stopping",
                        self.camera_failures
                    );
                    return CycleOutcome::Stop(StopReason::CameraFailure);
                }
                return CycleOutcome::Continue;
            }
        };
        counter!("driver_monitor_frames_total").increment(1);

        let now = self.clock.now();

        let reading = self.read_accel(now, &snapshot);
        let fix = self.read_gps();
        let speed_kmh = fix.map_or(0.0, |f| f.speed_kmh);

        let analysis = self.drowsiness.observe(
            &frame,
            speed_kmh,
            now,
            &snapshot.drowsiness,
            self.log.as_ref(),
        );
        if analysis.activated {
            counter!("driver_monitor_alarm_activations_total").increment(1);
        }
        self.drive_speaker(analysis.should_activate_speaker);

        let report = self.update_emergency(&frame, now, &snapshot);

        self.hub.publish(
            self.drowsiness_status(&analysis, &snapshot, now),
            self.system_status(&reading, fix, report, now),
        );

        self.poll_inputs(now);
        self.refresh_summary(now);

        CycleOutcome::Continue
    }

    fn read_accel(&mut self, now: Timestamp, snapshot: &ConfigSnapshot) -> AccelReading {
        let reading = self.accel.read();
        if let Some(impact) = self
            .impacts
            .observe(&reading, now, snapshot.impact_threshold)
        {
            counter!("driver_monitor_impacts_total", "kind" => impact.kind.as_str()).increment(1);
            self.log.record(now, &DriverEvent::from(impact.kind));
            self.emergency.register_impact(impact, &snapshot.emergency);
        }
        reading
    }

    fn read_gps(&mut self) -> Option<GpsFix> {
        let fix = self.gps.as_mut().and_then(|gps| gps.read());
        self.last_fix.set(fix);
        fix
    }

    fn drive_speaker(&mut self, active: bool) {
        if self.speaker.is_active() == active {
            return;
        }
        if let Err(e) = self.speaker.set_active(active) {
            warn!("Speaker control failed: {}", e);
        }
    }

    fn update_emergency(
        &mut self,
        frame: &FrameObservation,
        now: Timestamp,
        snapshot: &ConfigSnapshot,
    ) -> EmergencyStatus {
        let before = self.emergency.state().status;
        let input = EmergencyInput {
            face_detected: frame.face_detected,
            eyes_closed: frame.eyes_closed(snapshot.drowsiness.ear_threshold),
        };
        let report = self.emergency.update(input, now, &snapshot.emergency);

        if report.status != before {
            match report.status {
                ReportStatus::Alert => counter!("driver_monitor_alerts_total").increment(1),
                ReportStatus::Reporting => counter!("driver_monitor_reports_total").increment(1),
                ReportStatus::Normal => {}
            }
        }
        let level = match report.status {
            ReportStatus::Normal => 0.0,
            ReportStatus::Alert => 1.0,
            ReportStatus::Reporting => 2.0,
        };
        gauge!("driver_monitor_report_status").set(level);
        report
    }

    fn poll_inputs(&mut self, now: Timestamp) {
        // Every source is drained each cycle; only the first acknowledgment counts
        let mut ack = None;
        for input in self.inputs.iter_mut() {
            if let Some(channel) = input.poll() {
                ack.get_or_insert(channel);
            }
        }
        if let Some(channel) = ack {
            let outcome = self.emergency.acknowledge(channel, now);
            debug!(channel = channel.as_str(), ?outcome, "Acknowledgment applied");
        }

        if self.hub.take_stop_speaker() && self.drowsiness.request_stop() {
            self.drive_speaker(false);
        }
    }

    fn refresh_summary(&mut self, now: Timestamp) {
        let interval = self.config.current().frame_loop.summary_refresh();
        let due = self
            .summary_refreshed_at
            .map_or(true, |last| elapsed(last, now) >= interval);
        if !due {
            return;
        }
        self.summary_refreshed_at = Some(now);

        let today = now.date_naive();
        match self.log.entries_since(summary_cutoff(today, SUMMARY_DAYS)) {
            Ok(entries) => {
                let summary = summarize(&entries, today, SUMMARY_DAYS);
                self.hub.publish_log_summary(summary);
            }
            Err(e) => warn!("Failed to read event log for summary: {}", e),
        }
    }

    fn drowsiness_status(
        &self,
        analysis: &DrowsinessAnalysis,
        snapshot: &ConfigSnapshot,
        now: Timestamp,
    ) -> DrowsinessStatus {
        let ear = analysis.ear.unwrap_or(0.0);
        gauge!("driver_monitor_ear").set(ear);
        DrowsinessStatus {
            ear,
            threshold: snapshot.drowsiness.ear_threshold,
            state: analysis.condition.as_str().to_string(),
            alarm_on: analysis.fatigue_alarm_on,
            speaker_active: self.speaker.is_active(),
            alarm_duration: analysis.alarm_duration.as_secs_f64(),
            show_popup: analysis.show_popup,
            face_detected: analysis.face_detected,
            timestamp: now.to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }

    fn system_status(
        &self,
        reading: &AccelReading,
        fix: Option<GpsFix>,
        report: EmergencyStatus,
        now: Timestamp,
    ) -> SystemStatus {
        let accel_state = if reading.fresh { "OK" } else { "Waiting" };
        let defaults = SystemStatus::default();
        SystemStatus {
            connection_status: "Connected".to_string(),
            sensor_status: format!("Camera: OK / Accelerometer: {}", accel_state),
            accel_magnitude: reading.sample.magnitude_g(),
            accel_data: AccelData {
                x: reading.sample.x,
                y: reading.sample.y,
                z: reading.sample.z,
            },
            gps_position: fix.map_or(defaults.gps_position, |f| GpsPosition {
                latitude: f.latitude,
                longitude: f.longitude,
            }),
            gps_position_string: fix
                .filter(GpsFix::is_valid)
                .map_or(defaults.gps_position_string, |f| f.position_string()),
            speed_kmh: fix.map_or(0.0, |f| f.speed_kmh),
            impact_detected: report.monitoring,
            report_status: report,
            timestamp: now.to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }

    /// Release the speaker and log the quit event; runs once
    fn shutdown(&mut self, reason: StopReason) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;

        if self.speaker.is_active() {
            if let Err(e) = self.speaker.set_active(false) {
                warn!("Failed to silence speaker on shutdown: {}", e);
            }
        }
        self.log.record(self.clock.now(), &DriverEvent::ProgramQuit);
        info!(?reason, "Frame loop stopped");
    }
}

impl Drop for FrameLoop {
    fn drop(&mut self) {
        self.shutdown(StopReason::Requested);
    }
}
