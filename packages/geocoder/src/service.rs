//! The embedded Google Geocoding service definition.
//!
//! The endpoint and default timeout live in `services/google.toml`.
//! Deployments can replace either at runtime with
//! [`GeocodingService::with_overrides`].

use std::time::Duration;

use serde::{Deserialize, Deserializer};

const GOOGLE_TOML: &str = include_str!("../services/google.toml");

/// Endpoint settings for the geocoding provider.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GeocodingService {
    /// Human-readable name, used in logs.
    pub name: String,
    /// Endpoint URL.
    pub base_url: String,
    /// Per-request timeout.
    #[serde(rename = "timeout_ms", deserialize_with = "millis")]
    pub timeout: Duration,
}

fn millis<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    u64::deserialize(deserializer).map(Duration::from_millis)
}

impl GeocodingService {
    /// Replaces the endpoint and/or timeout where an override is given.
    #[must_use]
    pub fn with_overrides(mut self, base_url: Option<&str>, timeout: Option<Duration>) -> Self {
        if let Some(base_url) = base_url {
            self.base_url = base_url.to_string();
        }
        if let Some(timeout) = timeout {
            self.timeout = timeout;
        }
        self
    }
}

/// Returns the Google Geocoding API definition.
///
/// # Panics
///
/// Panics if the embedded TOML is malformed. It is compiled in, so this
/// can only happen with a broken build.
#[must_use]
pub fn google_service() -> GeocodingService {
    toml::de::from_str(GOOGLE_TOML)
        .unwrap_or_else(|e| panic!("Failed to parse embedded Google service definition: {e}"))
}
