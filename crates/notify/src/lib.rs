//! Emergency Report Dispatch
//!
//! Resolves where the vehicle is, composes the emergency text, and sends it
//! through an SMS transport. [`SmsReporter`] plugs into the emergency engine
//! as its [`emergency::ReportDispatcher`].

mod config;
mod location;
mod message;
mod reporter;
mod sms;

pub use config::{LocationConfig, SmsConfig};
pub use location::{IpApiLocator, IpLocator, LastFix, LocationFix, LocationResolver, LocationSource};
pub use message::{compose_report, SmsMessage};
pub use reporter::SmsReporter;
pub use sms::{solapi_signature, DisabledTransport, SmsTransport, SolapiTransport};

use thiserror::Error;

/// Notification errors
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("sms disabled")]
    Disabled,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Gateway rejected request: status={status}, message={message}")]
    Rejected { status: u16, message: String },

    #[error("Location lookup failed: {0}")]
    Location(String),

    #[error("Signing failed: {0}")]
    Signing(String),
}

impl From<reqwest::Error> for NotifyError {
    fn from(e: reqwest::Error) -> Self {
        NotifyError::Network(e.to_string())
    }
}
