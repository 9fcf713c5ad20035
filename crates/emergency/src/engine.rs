//! Emergency state machine: Normal -> Alert -> Reporting -> Normal

use event_log::{DriverEvent, EventSink};
use sensors::{elapsed, ImpactEvent, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::config::EmergencyConfig;
use crate::dispatch::{EmergencyReport, ReportDispatcher};
use crate::timer::ConditionTimer;
use crate::window::MonitoringWindow;

/// Emergency status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReportStatus {
    #[default]
    Normal,
    /// Waiting for the driver to respond
    Alert,
    /// Report dispatched (or attempted)
    Reporting,
}

impl ReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStatus::Normal => "NORMAL",
            ReportStatus::Alert => "ALERT",
            ReportStatus::Reporting => "REPORTING",
        }
    }
}

/// Which sustained condition raised the alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerCondition {
    EyesClosed,
    NoFace,
}

impl TriggerCondition {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerCondition::EyesClosed => "eyes_closed",
            TriggerCondition::NoFace => "no_face",
        }
    }
}

impl fmt::Display for TriggerCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where an acknowledgment came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AckChannel {
    Keyboard,
    Remote,
}

impl AckChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AckChannel::Keyboard => "keyboard",
            AckChannel::Remote => "remote",
        }
    }
}

/// What an acknowledgment did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    /// Alert cancelled, back to Normal
    Cancelled,
    /// Report already dispatched; ignored
    IgnoredReported,
    /// Nothing to acknowledge
    IgnoredIdle,
}

/// Report state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportState {
    pub status: ReportStatus,
    pub alert_start_time: Option<Timestamp>,
    /// Emergency message delivered in this window
    pub sms_sent: bool,
    /// Escalated past the response timeout in this window
    pub report_sent: bool,
}

/// Per-cycle inputs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmergencyInput {
    pub face_detected: bool,
    /// Face visible with EAR below threshold
    pub eyes_closed: bool,
}

/// Published snapshot of the engine
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmergencyStatus {
    pub status: ReportStatus,
    pub message: String,
    /// Seconds left to respond while in Alert
    pub remaining_time: f64,
    /// A monitoring window is active
    pub monitoring: bool,
}

impl Default for EmergencyStatus {
    fn default() -> Self {
        Self {
            status: ReportStatus::Normal,
            message: String::new(),
            remaining_time: 0.0,
            monitoring: false,
        }
    }
}

/// Emergency monitoring engine
pub struct EmergencyEngine {
    state: ReportState,
    window: Option<MonitoringWindow>,
    impact: Option<ImpactEvent>,
    eyes_closed_timer: ConditionTimer,
    no_face_timer: ConditionTimer,
    trigger: Option<TriggerCondition>,
    /// Outcome of the last dispatch, shown while Reporting
    report_message: String,
    dispatcher: Box<dyn ReportDispatcher>,
    sink: Arc<dyn EventSink>,
}

impl EmergencyEngine {
    pub fn new(dispatcher: Box<dyn ReportDispatcher>, sink: Arc<dyn EventSink>) -> Self {
        Self {
            state: ReportState::default(),
            window: None,
            impact: None,
            eyes_closed_timer: ConditionTimer::new(),
            no_face_timer: ConditionTimer::new(),
            trigger: None,
            report_message: String::new(),
            dispatcher,
            sink,
        }
    }

    pub fn state(&self) -> &ReportState {
        &self.state
    }

    pub fn window(&self) -> Option<&MonitoringWindow> {
        self.window.as_ref()
    }

    /// Start (or restart) the monitoring window.
    ///
    /// A finished report is left behind and the new window is watched from
    /// Normal. A running Alert countdown is kept; its escalation then reports
    /// the newest impact.
    pub fn register_impact(&mut self, impact: ImpactEvent, config: &EmergencyConfig) {
        info!(
            kind = %impact.kind,
            magnitude = impact.magnitude,
            "Impact registered, monitoring driver for {:.0}s",
            config.window_secs
        );
        if self.state.status == ReportStatus::Reporting {
            info!("New impact after a dispatched report, monitoring again");
            self.state.status = ReportStatus::Normal;
            self.trigger = None;
            self.report_message.clear();
        }
        self.window = Some(MonitoringWindow::new(impact.occurred_at, config.window()));
        self.impact = Some(impact);
        self.reset_timers();
        self.state.sms_sent = false;
        self.state.report_sent = false;
    }

    /// Advance one cycle
    pub fn update(
        &mut self,
        input: EmergencyInput,
        now: Timestamp,
        config: &EmergencyConfig,
    ) -> EmergencyStatus {
        let window_open = self.window.map_or(false, |w| w.is_open(now));

        match self.state.status {
            ReportStatus::Normal => {
                if self.window.is_some() && !window_open {
                    info!("Monitoring window expired without escalation");
                    self.quiesce();
                } else if window_open {
                    self.watch_driver(input, now, config);
                }
            }
            ReportStatus::Alert => {
                let waited = self
                    .state
                    .alert_start_time
                    .map_or(std::time::Duration::ZERO, |start| elapsed(start, now));
                if waited >= config.response_timeout() {
                    self.escalate(now);
                }
            }
            ReportStatus::Reporting => {
                if !window_open {
                    info!("Monitoring window closed after report");
                    self.quiesce();
                }
            }
        }

        self.status(now, config)
    }

    /// Apply a driver acknowledgment
    pub fn acknowledge(&mut self, channel: AckChannel, now: Timestamp) -> AckOutcome {
        match self.state.status {
            ReportStatus::Alert => {
                info!(channel = channel.as_str(), "Driver responded, report cancelled");
                self.state.status = ReportStatus::Normal;
                self.state.alert_start_time = None;
                self.trigger = None;
                self.reset_timers();
                self.sink.record(
                    now,
                    &DriverEvent::ReportCancelled {
                        channel: channel.as_str().to_string(),
                    },
                );
                AckOutcome::Cancelled
            }
            ReportStatus::Reporting => {
                debug!("Response ignored: report already dispatched");
                AckOutcome::IgnoredReported
            }
            ReportStatus::Normal => AckOutcome::IgnoredIdle,
        }
    }

    /// Snapshot for publication
    pub fn status(&self, now: Timestamp, config: &EmergencyConfig) -> EmergencyStatus {
        let monitoring = self.window.map_or(false, |w| w.is_open(now));
        match self.state.status {
            ReportStatus::Normal => EmergencyStatus {
                monitoring,
                ..Default::default()
            },
            ReportStatus::Alert => {
                let waited = self
                    .state
                    .alert_start_time
                    .map_or(std::time::Duration::ZERO, |start| elapsed(start, now));
                let remaining = config
                    .response_timeout()
                    .saturating_sub(waited)
                    .as_secs_f64();
                EmergencyStatus {
                    status: ReportStatus::Alert,
                    message: format!(
                        "Press any key within {:.1} seconds to cancel report",
                        remaining
                    ),
                    remaining_time: remaining,
                    monitoring,
                }
            }
            ReportStatus::Reporting => EmergencyStatus {
                status: ReportStatus::Reporting,
                message: self.report_message.clone(),
                remaining_time: 0.0,
                monitoring,
            },
        }
    }

    fn watch_driver(&mut self, input: EmergencyInput, now: Timestamp, config: &EmergencyConfig) {
        let eyes_closed = self.eyes_closed_timer.observe(
            input.face_detected && input.eyes_closed,
            now,
            config.eyes_closed(),
        );
        let no_face = self
            .no_face_timer
            .observe(!input.face_detected, now, config.no_face());

        let trigger = if eyes_closed {
            Some(TriggerCondition::EyesClosed)
        } else if no_face {
            Some(TriggerCondition::NoFace)
        } else {
            None
        };

        if let Some(trigger) = trigger {
            warn!(condition = %trigger, "Driver unresponsive after impact, alert started");
            self.state.status = ReportStatus::Alert;
            self.state.alert_start_time = Some(now);
            self.trigger = Some(trigger);
            self.sink.record(
                now,
                &DriverEvent::ReportAlertTriggered {
                    condition: trigger.as_str().to_string(),
                },
            );
        }
    }

    fn escalate(&mut self, now: Timestamp) {
        warn!("No response before timeout, reporting emergency");
        self.state.status = ReportStatus::Reporting;
        self.state.alert_start_time = None;
        self.state.report_sent = true;
        self.sink.record(now, &DriverEvent::ReportTriggered);

        if self.state.sms_sent {
            debug!("Emergency message already sent in this window");
            return;
        }

        let report = EmergencyReport {
            generated_at: now,
            impact: self.impact.clone(),
            trigger: self.trigger.unwrap_or(TriggerCondition::NoFace),
        };
        match self.dispatcher.dispatch(&report) {
            Ok(receipt) => {
                info!(reference = ?receipt.reference, "Emergency report sent");
                self.state.sms_sent = true;
                self.report_message = "Report process initiated".to_string();
                self.sink.record(now, &DriverEvent::SmsReportSent);
            }
            Err(e) => {
                error!("Emergency report failed: {}", e);
                self.report_message = format!("Report failed: {}", e);
                self.sink.record(
                    now,
                    &DriverEvent::SmsReportFailed {
                        reason: e.to_string(),
                    },
                );
            }
        }
    }

    fn reset_timers(&mut self) {
        self.eyes_closed_timer.reset();
        self.no_face_timer.reset();
    }

    fn quiesce(&mut self) {
        self.state = ReportState::default();
        self.window = None;
        self.impact = None;
        self.trigger = None;
        self.report_message.clear();
        self.reset_timers();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{DispatchError, DispatchReceipt};
    use chrono::{TimeZone, Utc};
    use event_log::MemoryEventLog;
    use sensors::ImpactKind;
    use std::sync::Mutex;

    #[derive(Clone, Default)]
    struct RecordingDispatcher {
        sent: Arc<Mutex<Vec<EmergencyReport>>>,
        fail: bool,
    }

    impl ReportDispatcher for RecordingDispatcher {
        fn dispatch(&mut self, report: &EmergencyReport) -> Result<DispatchReceipt, DispatchError> {
            self.sent.lock().unwrap().push(report.clone());
            if self.fail {
                Err(DispatchError::Failed("gateway timeout".into()))
            } else {
                Ok(DispatchReceipt::default())
            }
        }
    }

    fn ms(secs: f64) -> i64 {
        (secs * 1000.0).round() as i64
    }

    fn t(secs: f64) -> Timestamp {
        Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap() + chrono::Duration::milliseconds(ms(secs))
    }

    fn impact_at(secs: f64) -> ImpactEvent {
        ImpactEvent {
            occurred_at: t(secs),
            kind: ImpactKind::Stop,
            magnitude: 6.0,
        }
    }

    const NO_FACE: EmergencyInput = EmergencyInput {
        face_detected: false,
        eyes_closed: false,
    };
    const EYES_CLOSED: EmergencyInput = EmergencyInput {
        face_detected: true,
        eyes_closed: true,
    };
    const ATTENTIVE: EmergencyInput = EmergencyInput {
        face_detected: true,
        eyes_closed: false,
    };

    fn engine(fail: bool) -> (EmergencyEngine, RecordingDispatcher, Arc<MemoryEventLog>) {
        let dispatcher = RecordingDispatcher {
            fail,
            ..Default::default()
        };
        let log = Arc::new(MemoryEventLog::new());
        let engine = EmergencyEngine::new(Box::new(dispatcher.clone()), log.clone());
        (engine, dispatcher, log)
    }

    /// Run frames every 100 ms over `[from, to]`
    fn run(
        engine: &mut EmergencyEngine,
        input: EmergencyInput,
        from: f64,
        to: f64,
        config: &EmergencyConfig,
    ) -> EmergencyStatus {
        let mut status = EmergencyStatus::default();
        for step in (ms(from)..=ms(to)).step_by(100) {
            status = engine.update(input, t(step as f64 / 1000.0), config);
        }
        status
    }

    #[test]
    fn test_no_face_escalates_to_single_report() {
        let config = EmergencyConfig::default();
        let (mut engine, dispatcher, log) = engine(false);
        engine.register_impact(impact_at(0.0), &config);

        let status = run(&mut engine, NO_FACE, 0.0, 9.95, &config);
        assert_eq!(status.status, ReportStatus::Normal);
        assert!(status.monitoring);

        let status = engine.update(NO_FACE, t(10.0), &config);
        assert_eq!(status.status, ReportStatus::Alert);
        assert_eq!(status.remaining_time, 10.0);

        run(&mut engine, NO_FACE, 10.1, 19.95, &config);
        assert_eq!(engine.state().status, ReportStatus::Alert);

        let status = engine.update(NO_FACE, t(20.0), &config);
        assert_eq!(status.status, ReportStatus::Reporting);
        assert!(engine.state().sms_sent && engine.state().report_sent);

        run(&mut engine, NO_FACE, 20.1, 59.0, &config);
        assert_eq!(dispatcher.sent.lock().unwrap().len(), 1);
        assert_eq!(dispatcher.sent.lock().unwrap()[0].trigger, TriggerCondition::NoFace);
        assert_eq!(
            log.texts(),
            vec![
                "report_alert_triggered [no_face]",
                "report_triggered",
                "sms_report_sent"
            ]
        );
    }

    #[test]
    fn test_acknowledgment_cancels_alert() {
        let config = EmergencyConfig::default();
        let (mut engine, dispatcher, log) = engine(false);
        engine.register_impact(impact_at(0.0), &config);

        run(&mut engine, NO_FACE, 0.0, 11.95, &config);
        assert_eq!(engine.state().status, ReportStatus::Alert);

        assert_eq!(engine.acknowledge(AckChannel::Remote, t(12.0)), AckOutcome::Cancelled);
        assert_eq!(engine.state().status, ReportStatus::Normal);
        assert_eq!(engine.state().alert_start_time, None);
        // Second channel in the same cycle is a no-op
        assert_eq!(engine.acknowledge(AckChannel::Keyboard, t(12.0)), AckOutcome::IgnoredIdle);

        run(&mut engine, ATTENTIVE, 12.1, 30.0, &config);
        assert!(dispatcher.sent.lock().unwrap().is_empty());
        assert_eq!(log.count("report_cancelled"), 1);
        assert_eq!(log.texts()[1], "report_cancelled [remote]");
    }

    #[test]
    fn test_no_escalation_after_window() {
        let config = EmergencyConfig::default();
        let (mut engine, dispatcher, log) = engine(false);
        engine.register_impact(impact_at(0.0), &config);

        run(&mut engine, ATTENTIVE, 0.0, 64.9, &config);
        let status = run(&mut engine, EYES_CLOSED, 65.0, 120.0, &config);
        assert_eq!(status.status, ReportStatus::Normal);
        assert!(!status.monitoring);
        assert!(engine.window().is_none());
        assert!(dispatcher.sent.lock().unwrap().is_empty());
        assert!(log.texts().is_empty());
    }

    #[test]
    fn test_eyes_closed_trigger() {
        let config = EmergencyConfig::default();
        let (mut engine, _dispatcher, log) = engine(false);
        engine.register_impact(impact_at(0.0), &config);

        run(&mut engine, ATTENTIVE, 0.0, 5.0, &config);
        let status = run(&mut engine, EYES_CLOSED, 5.1, 15.1, &config);
        assert_eq!(status.status, ReportStatus::Alert);
        assert_eq!(log.texts(), vec!["report_alert_triggered [eyes_closed]"]);
    }

    #[test]
    fn test_response_during_reporting_ignored() {
        let config = EmergencyConfig::default();
        let (mut engine, _dispatcher, log) = engine(false);
        engine.register_impact(impact_at(0.0), &config);
        run(&mut engine, NO_FACE, 0.0, 21.0, &config);

        assert_eq!(
            engine.acknowledge(AckChannel::Keyboard, t(21.0)),
            AckOutcome::IgnoredReported
        );
        assert_eq!(engine.state().status, ReportStatus::Reporting);
        assert_eq!(log.count("report_cancelled"), 0);
    }

    #[test]
    fn test_reporting_returns_to_normal_when_window_ends() {
        let config = EmergencyConfig::default();
        let (mut engine, _dispatcher, _log) = engine(false);
        engine.register_impact(impact_at(0.0), &config);
        run(&mut engine, NO_FACE, 0.0, 21.0, &config);

        let status = engine.update(NO_FACE, t(60.0), &config);
        assert_eq!(status.status, ReportStatus::Reporting);
        let status = engine.update(NO_FACE, t(60.1), &config);
        assert_eq!(status.status, ReportStatus::Normal);
        assert_eq!(*engine.state(), ReportState::default());
    }

    #[test]
    fn test_failed_dispatch_is_final() {
        let config = EmergencyConfig::default();
        let (mut engine, dispatcher, log) = engine(true);
        engine.register_impact(impact_at(0.0), &config);

        let status = run(&mut engine, NO_FACE, 0.0, 40.0, &config);
        assert_eq!(status.status, ReportStatus::Reporting);
        assert_eq!(status.message, "Report failed: gateway timeout");
        assert!(!engine.state().sms_sent);
        assert!(engine.state().report_sent);
        assert_eq!(dispatcher.sent.lock().unwrap().len(), 1);
        assert_eq!(log.count("sms_report_failed"), 1);
    }

    #[test]
    fn test_alert_countdown_outlives_window() {
        let config = EmergencyConfig::default();
        let (mut engine, dispatcher, _log) = engine(false);
        engine.register_impact(impact_at(0.0), &config);

        run(&mut engine, ATTENTIVE, 0.0, 45.0, &config);
        let status = run(&mut engine, NO_FACE, 45.1, 55.2, &config);
        assert_eq!(status.status, ReportStatus::Alert);

        // Window closes at 60 s; the countdown still runs to 65 s
        let status = run(&mut engine, NO_FACE, 55.3, 66.0, &config);
        assert_eq!(status.status, ReportStatus::Normal);
        assert_eq!(dispatcher.sent.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_new_impact_resets_flags_and_timers() {
        let config = EmergencyConfig::default();
        let (mut engine, _dispatcher, _log) = engine(false);
        engine.register_impact(impact_at(0.0), &config);
        run(&mut engine, NO_FACE, 0.0, 8.0, &config);

        engine.register_impact(impact_at(8.05), &config);
        let status = run(&mut engine, NO_FACE, 8.1, 17.95, &config);
        assert_eq!(status.status, ReportStatus::Normal);
        assert!(!engine.state().report_sent);
        let status = engine.update(NO_FACE, t(18.1), &config);
        assert_eq!(status.status, ReportStatus::Alert);
    }

    #[test]
    fn test_impact_while_reporting_is_monitored_again() {
        let config = EmergencyConfig::default();
        let (mut engine, dispatcher, log) = engine(false);
        engine.register_impact(impact_at(0.0), &config);
        let status = run(&mut engine, NO_FACE, 0.0, 29.9, &config);
        assert_eq!(status.status, ReportStatus::Reporting);

        engine.register_impact(impact_at(30.0), &config);
        assert_eq!(engine.state().status, ReportStatus::Normal);
        assert!(!engine.state().sms_sent && !engine.state().report_sent);

        let status = run(&mut engine, NO_FACE, 30.0, 39.9, &config);
        assert_eq!(status.status, ReportStatus::Normal);
        assert!(status.monitoring);
        let status = engine.update(NO_FACE, t(40.0), &config);
        assert_eq!(status.status, ReportStatus::Alert);

        let status = run(&mut engine, NO_FACE, 40.1, 89.0, &config);
        assert_eq!(status.status, ReportStatus::Reporting);
        let sent = dispatcher.sent.lock().unwrap();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1].impact.as_ref().map(|i| i.occurred_at), Some(t(30.0)));
        assert_eq!(log.count("report_alert_triggered"), 2);
        assert_eq!(log.count("sms_report_sent"), 2);
    }

    #[test]
    fn test_impact_during_alert_keeps_countdown() {
        let config = EmergencyConfig::default();
        let (mut engine, dispatcher, _log) = engine(false);
        engine.register_impact(impact_at(0.0), &config);
        run(&mut engine, NO_FACE, 0.0, 12.0, &config);
        assert_eq!(engine.state().status, ReportStatus::Alert);

        engine.register_impact(impact_at(12.05), &config);
        let status = run(&mut engine, NO_FACE, 12.1, 19.9, &config);
        assert_eq!(status.status, ReportStatus::Alert);
        let status = engine.update(NO_FACE, t(20.0), &config);
        assert_eq!(status.status, ReportStatus::Reporting);
        assert_eq!(dispatcher.sent.lock().unwrap().len(), 1);
        assert_eq!(
            dispatcher.sent.lock().unwrap()[0].impact.as_ref().map(|i| i.occurred_at),
            Some(t(12.05))
        );

        // The window now runs from the second impact
        let status = run(&mut engine, NO_FACE, 20.1, 65.0, &config);
        assert_eq!(status.status, ReportStatus::Reporting);
        assert!(status.monitoring);
    }

    #[test]
    fn test_idle_without_impact() {
        let config = EmergencyConfig::default();
        let (mut engine, _dispatcher, log) = engine(false);
        let status = run(&mut engine, NO_FACE, 0.0, 30.0, &config);
        assert_eq!(status, EmergencyStatus::default());
        assert!(log.texts().is_empty());
    }
}
