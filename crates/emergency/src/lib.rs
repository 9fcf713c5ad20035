//! Emergency Monitoring & Reporting
//!
//! After an impact, watches for an unresponsive driver inside a bounded
//! monitoring window, raises a cancellable alert, and dispatches at most one
//! emergency report per window.

mod config;
mod dispatch;
mod engine;
mod timer;
mod window;

pub use config::EmergencyConfig;
pub use dispatch::{DispatchError, DispatchReceipt, EmergencyReport, ReportDispatcher};
pub use engine::{
    AckChannel, AckOutcome, EmergencyEngine, EmergencyInput, EmergencyStatus, ReportState,
    ReportStatus, TriggerCondition,
};
pub use timer::ConditionTimer;
pub use window::MonitoringWindow;
