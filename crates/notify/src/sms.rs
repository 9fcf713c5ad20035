//! SMS transports

use chrono::{SecondsFormat, Utc};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::json;
use sha2::Sha256;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::SmsConfig;
use crate::message::SmsMessage;
use crate::NotifyError;

type HmacSha256 = Hmac<Sha256>;

/// Sends one text message; returns a gateway reference
pub trait SmsTransport: Send {
    fn send(&mut self, message: &SmsMessage) -> Result<Option<String>, NotifyError>;
}

/// Transport used when SMS is turned off or not configured
#[derive(Debug, Default)]
pub struct DisabledTransport;

impl SmsTransport for DisabledTransport {
    fn send(&mut self, _message: &SmsMessage) -> Result<Option<String>, NotifyError> {
        info!("SMS reporting is disabled, message not sent");
        Err(NotifyError::Disabled)
    }
}

/// Hex HMAC-SHA256 of `date + salt` keyed by the API secret
pub fn solapi_signature(api_secret: &str, date: &str, salt: &str) -> Result<String, NotifyError> {
    let mut mac = HmacSha256::new_from_slice(api_secret.as_bytes())
        .map_err(|e| NotifyError::Signing(e.to_string()))?;
    mac.update(date.as_bytes());
    mac.update(salt.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

fn digits_only(number: &str) -> String {
    number.chars().filter(|c| c.is_ascii_digit()).collect()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendResponse {
    #[serde(default)]
    message_id: Option<String>,
    #[serde(default)]
    group_id: Option<String>,
    #[serde(default)]
    status_message: Option<String>,
}

/// SOLAPI v4 single-message transport
pub struct SolapiTransport {
    client: reqwest::blocking::Client,
    config: SmsConfig,
}

impl SolapiTransport {
    pub fn new(config: SmsConfig) -> Result<Self, NotifyError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { client, config })
    }

    fn authorization(&self) -> Result<String, NotifyError> {
        let date = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        let salt = uuid::Uuid::new_v4().simple().to_string();
        let signature = solapi_signature(&self.config.api_secret, &date, &salt)?;
        Ok(format!(
            "HMAC-SHA256 apiKey={}, date={}, salt={}, signature={}",
            self.config.api_key, date, salt, signature
        ))
    }
}

impl SmsTransport for SolapiTransport {
    fn send(&mut self, message: &SmsMessage) -> Result<Option<String>, NotifyError> {
        let body = json!({
            "message": {
                "to": digits_only(&message.to),
                "from": digits_only(&message.from),
                "text": message.text,
            }
        });

        debug!(url = %self.config.api_url, "Sending SMS");
        let response = self
            .client
            .post(&self.config.api_url)
            .header(reqwest::header::AUTHORIZATION, self.authorization()?)
            .json(&body)
            .send()?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().unwrap_or_default();
            return Err(NotifyError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: SendResponse = response.json()?;
        info!(
            message_id = ?parsed.message_id,
            status = ?parsed.status_message,
            "SMS accepted by gateway"
        );
        Ok(parsed.message_id.or(parsed.group_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_vector() {
        let signature =
            solapi_signature("secret-key", "2024-05-01T08:00:00Z", "0123456789abcdef").unwrap();
        assert_eq!(
            signature,
            "855a5198179424cc24b96bccfaefd161a45230f9fd6942737084f4ffec7bbc8f"
        );
    }

    #[test]
    fn test_numbers_stripped() {
        assert_eq!(digits_only("010-1234-5678"), "01012345678");
    }

    #[test]
    fn test_disabled_transport_fails() {
        let message = SmsMessage {
            from: String::new(),
            to: String::new(),
            text: "x".into(),
        };
        let err = DisabledTransport.send(&message).unwrap_err();
        assert_eq!(err.to_string(), "sms disabled");
    }

    #[test]
    fn test_authorization_header_shape() {
        let transport = SolapiTransport::new(SmsConfig {
            api_key: "KEY".into(),
            api_secret: "SECRET".into(),
            ..Default::default()
        })
        .unwrap();
        let header = transport.authorization().unwrap();
        assert!(header.starts_with("HMAC-SHA256 apiKey=KEY, date="));
        let signature = header.rsplit("signature=").next().unwrap();
        assert_eq!(signature.len(), 64);
    }
}
