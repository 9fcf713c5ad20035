//! Location resolution: GPS first, IP geolocation as fallback

use sensors::GpsFix;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::LocationConfig;
use crate::NotifyError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationSource {
    Gps,
    IpFallback,
}

/// Resolved position for the emergency message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationFix {
    pub source: LocationSource,
    pub lat: f64,
    pub lon: f64,
    /// Human readable place, e.g. "Seoul, South Korea"
    pub label: Option<String>,
}

impl LocationFix {
    pub fn from_gps(fix: &GpsFix) -> Self {
        Self {
            source: LocationSource::Gps,
            lat: fix.latitude,
            lon: fix.longitude,
            label: None,
        }
    }

    /// Text used in the message body
    pub fn describe(&self) -> String {
        let source = match self.source {
            LocationSource::Gps => "GPS",
            LocationSource::IpFallback => "IP estimate",
        };
        match &self.label {
            Some(label) => format!("{} ({:.6}, {:.6}) [{}]", label, self.lat, self.lon, source),
            None => format!("({:.6}, {:.6}) [{}]", self.lat, self.lon, source),
        }
    }

    /// Map link for the position
    pub fn map_url(&self) -> String {
        format!("https://maps.google.com/?q={:.6},{:.6}", self.lat, self.lon)
    }
}

/// Most recent GPS fix, written by the frame loop and read at report time
#[derive(Debug, Clone, Default)]
pub struct LastFix(Arc<Mutex<Option<GpsFix>>>);

impl LastFix {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, fix: Option<GpsFix>) {
        *self.0.lock().unwrap_or_else(|e| e.into_inner()) = fix;
    }

    pub fn get(&self) -> Option<GpsFix> {
        *self.0.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// IP-based geolocation lookup
pub trait IpLocator: Send {
    fn locate(&self) -> Result<LocationFix, NotifyError>;
}

#[derive(Debug, Deserialize)]
struct IpApiResponse {
    status: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    lat: f64,
    #[serde(default)]
    lon: f64,
    #[serde(default)]
    city: Option<String>,
    #[serde(default)]
    country: Option<String>,
}

impl IpApiResponse {
    fn into_fix(self) -> Result<LocationFix, NotifyError> {
        if self.status != "success" {
            return Err(NotifyError::Location(
                self.message.unwrap_or_else(|| self.status.clone()),
            ));
        }
        let label = match (self.city, self.country) {
            (Some(city), Some(country)) => Some(format!("{}, {}", city, country)),
            (Some(place), None) | (None, Some(place)) => Some(place),
            (None, None) => None,
        };
        Ok(LocationFix {
            source: LocationSource::IpFallback,
            lat: self.lat,
            lon: self.lon,
            label,
        })
    }
}

/// ip-api.com JSON lookup
pub struct IpApiLocator {
    client: reqwest::blocking::Client,
    url: String,
}

impl IpApiLocator {
    pub fn new(config: &LocationConfig) -> Result<Self, NotifyError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            url: config.ip_api_url.clone(),
        })
    }
}

impl IpLocator for IpApiLocator {
    fn locate(&self) -> Result<LocationFix, NotifyError> {
        let response: IpApiResponse = self.client.get(&self.url).send()?.error_for_status()?.json()?;
        response.into_fix()
    }
}

/// Picks the best available location at report time
pub struct LocationResolver {
    last_fix: LastFix,
    ip_locator: Option<Box<dyn IpLocator>>,
}

impl LocationResolver {
    pub fn new(last_fix: LastFix, ip_locator: Option<Box<dyn IpLocator>>) -> Self {
        Self {
            last_fix,
            ip_locator,
        }
    }

    /// GPS when it has a valid fix, otherwise IP geolocation, otherwise nothing
    pub fn resolve(&self) -> Option<LocationFix> {
        if let Some(fix) = self.last_fix.get().filter(GpsFix::is_valid) {
            debug!("Using GPS position for report");
            return Some(LocationFix::from_gps(&fix));
        }

        let locator = self.ip_locator.as_ref()?;
        match locator.locate() {
            Ok(fix) => {
                info!(label = ?fix.label, "Using IP geolocation for report");
                Some(fix)
            }
            Err(e) => {
                warn!("IP geolocation failed: {}", e);
                None
            }
        }
    }
}
