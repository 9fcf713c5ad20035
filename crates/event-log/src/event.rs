//! Event taxonomy and the on-disk line format

use chrono::{NaiveDateTime, TimeZone, Utc};
use sensors::{ImpactKind, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;

/// `strftime` layout of the timestamp column
pub const TIMESTAMP_FORMAT: &str = "%Y %m %d %H %M %S";

/// One logged transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverEvent {
    ProgramStart,
    ProgramQuit,
    Drowsiness,
    NoFaceWhileDriving,
    SuddenAcceleration,
    SuddenStop,
    /// Emergency alert countdown started; carries the firing condition
    ReportAlertTriggered { condition: String },
    /// Alert acknowledged; carries the input channel
    ReportCancelled { channel: String },
    ReportTriggered,
    SmsReportSent,
    SmsReportFailed { reason: String },
    Other(String),
}

impl DriverEvent {
    /// Bare event type without tags
    pub fn label(&self) -> &str {
        match self {
            DriverEvent::ProgramStart => "program_start",
            DriverEvent::ProgramQuit => "program_quit",
            DriverEvent::Drowsiness => "drowsiness",
            DriverEvent::NoFaceWhileDriving => "no_face_while_driving",
            DriverEvent::SuddenAcceleration => "sudden_acceleration",
            DriverEvent::SuddenStop => "sudden_stop",
            DriverEvent::ReportAlertTriggered { .. } => "report_alert_triggered",
            DriverEvent::ReportCancelled { .. } => "report_cancelled",
            DriverEvent::ReportTriggered => "report_triggered",
            DriverEvent::SmsReportSent => "sms_report_sent",
            DriverEvent::SmsReportFailed { .. } => "sms_report_failed",
            DriverEvent::Other(label) => label,
        }
    }

    /// Program lifecycle markers, not driving behaviour
    pub fn is_lifecycle(&self) -> bool {
        matches!(self, DriverEvent::ProgramStart | DriverEvent::ProgramQuit)
    }
}

impl From<ImpactKind> for DriverEvent {
    fn from(kind: ImpactKind) -> Self {
        match kind {
            ImpactKind::Acceleration => DriverEvent::SuddenAcceleration,
            ImpactKind::Stop => DriverEvent::SuddenStop,
        }
    }
}

impl fmt::Display for DriverEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriverEvent::ReportAlertTriggered { condition } => {
                write!(f, "{} [{}]", self.label(), condition)
            }
            DriverEvent::ReportCancelled { channel } => write!(f, "{} [{}]", self.label(), channel),
            // '|' is the column separator
            DriverEvent::SmsReportFailed { reason } => {
                write!(f, "{}: {}", self.label(), reason.replace(['|', '\n', '\r'], " "))
            }
            _ => f.write_str(self.label()),
        }
    }
}

/// One parsed log line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub at: Timestamp,
    /// Full event text, tags included
    pub text: String,
}

impl LogEntry {
    pub fn new(at: Timestamp, event: &DriverEvent) -> Self {
        Self {
            at,
            text: event.to_string(),
        }
    }

    /// Event type with tags stripped; older "sudden stop" style labels are normalized
    pub fn label(&self) -> String {
        let end = self.text.find([' ', ':', '[']).unwrap_or(self.text.len());
        let head = &self.text[..end];
        match self.text.as_str() {
            "sudden acceleration" => "sudden_acceleration".to_string(),
            "sudden stop" => "sudden_stop".to_string(),
            _ => head.to_string(),
        }
    }

    pub fn is_lifecycle(&self) -> bool {
        matches!(self.label().as_str(), "program_start" | "program_quit")
    }

    /// Render as `YYYY MM DD HH MM SS | text`
    pub fn to_line(&self) -> String {
        format!("{} | {}", self.at.format(TIMESTAMP_FORMAT), self.text)
    }

    /// Parse a log line; `None` for malformed lines
    pub fn parse(line: &str) -> Option<Self> {
        let (timestamp, text) = line.split_once('|')?;
        let naive = NaiveDateTime::parse_from_str(timestamp.trim(), TIMESTAMP_FORMAT).ok()?;
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        Some(Self {
            at: Utc.from_utc_datetime(&naive),
            text: text.to_string(),
        })
    }
}
