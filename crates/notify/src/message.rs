//! Emergency message composition

use emergency::{EmergencyReport, TriggerCondition};
use serde::Serialize;

use crate::location::LocationFix;

/// Outgoing text message
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SmsMessage {
    pub from: String,
    pub to: String,
    pub text: String,
}

/// Compose the emergency text for `report`
pub fn compose_report(report: &EmergencyReport, location: Option<&LocationFix>) -> String {
    let mut lines = vec![
        "[EMERGENCY] Driver Monitoring System".to_string(),
        format!("Time: {}", report.generated_at.format("%Y-%m-%d %H:%M:%S UTC")),
    ];

    if let Some(impact) = &report.impact {
        lines.push(format!(
            "Impact: {} {:.2} m/s^2 at {}",
            impact.kind.as_str().replace('_', " "),
            impact.magnitude,
            impact.occurred_at.format("%H:%M:%S")
        ));
    }

    let condition = match report.trigger {
        TriggerCondition::EyesClosed => "eyes closed",
        TriggerCondition::NoFace => "no face detected",
    };
    lines.push(format!(
        "Status: {} after impact, no response from driver",
        condition
    ));

    match location {
        Some(fix) => {
            lines.push(format!("Location: {}", fix.describe()));
            lines.push(fix.map_url());
        }
        None => lines.push("Location: unavailable".to_string()),
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::LocationSource;
    use chrono::{TimeZone, Utc};
    use sensors::{ImpactEvent, ImpactKind};

    fn report() -> EmergencyReport {
        EmergencyReport {
            generated_at: Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 20).unwrap(),
            impact: Some(ImpactEvent {
                occurred_at: Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap(),
                kind: ImpactKind::Stop,
                magnitude: 6.5,
            }),
            trigger: TriggerCondition::NoFace,
        }
    }

    #[test]
    fn test_compose_with_gps() {
        let fix = LocationFix {
            source: LocationSource::Gps,
            lat: 37.5665,
            lon: 126.978,
            label: None,
        };
        let text = compose_report(&report(), Some(&fix));
        assert_eq!(
            text,
            "[EMERGENCY] Driver Monitoring System\n\
             Time: 2024-05-01 08:00:20 UTC\n\
             Impact: sudden stop 6.50 m/s^2 at 08:00:00\n\
             Status: no face detected after impact, no response from driver\n\
             Location: (37.566500, 126.978000) [GPS]\n\
             https://maps.google.com/?q=37.566500,126.978000"
        );
    }

    #[test]
    fn test_compose_without_location() {
        let text = compose_report(&report(), None);
        assert!(text.ends_with("Location: unavailable"));
    }
}
