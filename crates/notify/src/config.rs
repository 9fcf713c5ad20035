//! SMS and location configuration

use serde::{Deserialize, Serialize};
use std::fmt;

/// SMS gateway configuration
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SmsConfig {
    pub enabled: bool,
    pub api_key: String,
    pub api_secret: String,
    /// Registered sender number
    pub from_number: String,
    /// Emergency contact
    pub to_number: String,
    pub api_url: String,
    pub timeout_secs: u64,
}

impl Default for SmsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: String::new(),
            api_secret: String::new(),
            from_number: String::new(),
            to_number: String::new(),
            api_url: "https://api.solapi.com/messages/v4/send".to_string(),
            timeout_secs: 10,
        }
    }
}

impl SmsConfig {
    /// Enabled with every credential present
    pub fn is_usable(&self) -> bool {
        self.enabled
            && !self.api_key.is_empty()
            && !self.api_secret.is_empty()
            && !self.from_number.is_empty()
            && !self.to_number.is_empty()
    }
}

impl fmt::Debug for SmsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmsConfig")
            .field("enabled", &self.enabled)
            .field("api_key", &"***REDACTED***")
            .field("api_secret", &"***REDACTED***")
            .field("from_number", &self.from_number)
            .field("to_number", &self.to_number)
            .field("api_url", &self.api_url)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// Location lookup configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocationConfig {
    /// Fall back to IP geolocation without a GPS fix
    pub ip_fallback: bool,
    pub ip_api_url: String,
    pub timeout_secs: u64,
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            ip_fallback: true,
            ip_api_url: "http://ip-api.com/json".to_string(),
            timeout_secs: 5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_credentials() {
        let config = SmsConfig {
            api_key: "NCS-key".into(),
            api_secret: "very-secret".into(),
            ..Default::default()
        };
        let debug = format!("{:?}", config);
        assert!(!debug.contains("very-secret"));
        assert!(!debug.contains("NCS-key"));
        assert!(debug.contains("REDACTED"));
    }

    #[test]
    fn test_usable_requires_credentials() {
        let mut config = SmsConfig {
            enabled: true,
            ..Default::default()
        };
        assert!(!config.is_usable());
        config.api_key = "k".into();
        config.api_secret = "s".into();
        config.from_number = "010-0000-0000".into();
        config.to_number = "010-1111-1111".into();
        assert!(config.is_usable());
    }
}
