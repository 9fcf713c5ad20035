//! Report dispatch seam

use sensors::{ImpactEvent, Timestamp};
use serde::Serialize;
use thiserror::Error;

use crate::engine::TriggerCondition;

/// Dispatch errors
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("sms disabled")]
    Disabled,
    #[error("{0}")]
    Failed(String),
}

/// Everything needed to compose an emergency message
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmergencyReport {
    pub generated_at: Timestamp,
    /// Impact that opened the window
    pub impact: Option<ImpactEvent>,
    pub trigger: TriggerCondition,
}

/// Result of a successful dispatch
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DispatchReceipt {
    /// Transport-side identifier, if any
    pub reference: Option<String>,
    /// Location text included in the message
    pub location: Option<String>,
}

/// Sends the emergency report. Called at most once per monitoring window.
pub trait ReportDispatcher: Send {
    fn dispatch(&mut self, report: &EmergencyReport) -> Result<DispatchReceipt, DispatchError>;
}
