//! Emergency report dispatcher backed by SMS

use emergency::{DispatchError, DispatchReceipt, EmergencyReport, ReportDispatcher};
use tracing::{info, warn};

use crate::config::{LocationConfig, SmsConfig};
use crate::location::{IpApiLocator, IpLocator, LastFix, LocationResolver};
use crate::message::{compose_report, SmsMessage};
use crate::sms::{DisabledTransport, SmsTransport, SolapiTransport};
use crate::NotifyError;

/// Resolves location, composes the text and sends it
pub struct SmsReporter {
    transport: Box<dyn SmsTransport>,
    resolver: LocationResolver,
    from: String,
    to: String,
}

impl SmsReporter {
    pub fn new(
        transport: Box<dyn SmsTransport>,
        resolver: LocationResolver,
        from: impl Into<String>,
        to: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            resolver,
            from: from.into(),
            to: to.into(),
        }
    }

    /// Build from configuration: SOLAPI when usable, disabled otherwise
    pub fn from_config(sms: &SmsConfig, location: &LocationConfig, last_fix: LastFix) -> Self {
        let transport: Box<dyn SmsTransport> = if sms.is_usable() {
            match SolapiTransport::new(sms.clone()) {
                Ok(transport) => {
                    info!(to = %sms.to_number, "SMS reporting enabled");
                    Box::new(transport)
                }
                Err(e) => {
                    warn!("Failed to initialize SMS transport: {}", e);
                    Box::new(DisabledTransport)
                }
            }
        } else {
            if sms.enabled {
                warn!("SMS enabled but credentials are incomplete, reporting disabled");
            }
            Box::new(DisabledTransport)
        };

        let ip_locator: Option<Box<dyn IpLocator>> = if location.ip_fallback {
            match IpApiLocator::new(location) {
                Ok(locator) => Some(Box::new(locator)),
                Err(e) => {
                    warn!("IP geolocation unavailable: {}", e);
                    None
                }
            }
        } else {
            None
        };

        Self::new(
            transport,
            LocationResolver::new(last_fix, ip_locator),
            sms.from_number.clone(),
            sms.to_number.clone(),
        )
    }
}

impl ReportDispatcher for SmsReporter {
    fn dispatch(&mut self, report: &EmergencyReport) -> Result<DispatchReceipt, DispatchError> {
        let location = self.resolver.resolve();
        let message = SmsMessage {
            from: self.from.clone(),
            to: self.to.clone(),
            text: compose_report(report, location.as_ref()),
        };

        match self.transport.send(&message) {
            Ok(reference) => Ok(DispatchReceipt {
                reference,
                location: location.map(|fix| fix.describe()),
            }),
            Err(NotifyError::Disabled) => Err(DispatchError::Disabled),
            Err(e) => Err(DispatchError::Failed(e.to_string())),
        }
    }
}
