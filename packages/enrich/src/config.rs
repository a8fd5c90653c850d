//! Environment configuration.
//!
//! # Environment Variables
//!
//! | Variable | Required | Description |
//! |---|---|---|
//! | `GOOGLE_CLOUD_API_KEY` | Yes | Geocoding API credential |
//! | `OUTPUT_STREAM_NAME` | For stream mode | Destination stream |
//! | `DEFAULT_SEARCH_RADIUS_METERS` | No | Radius for messages that carry none (default 500) |
//! | `GEOCODE_TIMEOUT_MS` | No | Per-lookup timeout (default from `services/google.toml`) |
//! | `BATCH_DEADLINE_MS` | No | Deadline for all lookups in a batch (default 25000) |
//! | `GEOCODE_CONCURRENCY` | No | Concurrent lookups per batch (default 4) |
//! | `GEOCODING_BASE_URL` | No | Endpoint override (default from `services/google.toml`) |

use std::str::FromStr;
use std::time::Duration;

use geoconfirm_geocoder::google::GoogleGeocoder;
use geoconfirm_geocoder::service::{self, GeocodingService};
use thiserror::Error;

use crate::pipeline::PipelineOptions;

/// Default radius in meters.
pub const DEFAULT_SEARCH_RADIUS_METERS: f64 = 500.0;

/// Default batch deadline, leaving headroom under a 30 s invocation limit.
pub const DEFAULT_BATCH_DEADLINE: Duration = Duration::from_millis(25_000);

/// Default number of concurrent lookups.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Missing required environment variable.
    #[error("Missing environment variable: {name}")]
    MissingEnv {
        /// Name of the missing environment variable.
        name: String,
    },

    /// An environment variable could not be interpreted.
    #[error("Invalid value for {name}: {value:?}")]
    Invalid {
        /// Name of the environment variable.
        name: String,
        /// The rejected value.
        value: String,
    },
}

/// Runtime configuration.
#[derive(Clone)]
pub struct Config {
    /// Geocoding API credential.
    pub api_key: String,
    /// Destination stream, if configured.
    pub output_stream_name: Option<String>,
    /// Radius for messages that carry none, in meters.
    pub default_search_radius: f64,
    /// Per-lookup timeout override.
    pub geocode_timeout: Option<Duration>,
    /// Deadline for all lookups in a batch.
    pub batch_deadline: Duration,
    /// Concurrent lookups per batch.
    pub concurrency: usize,
    /// Geocoding endpoint override.
    pub geocoding_base_url: Option<String>,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("output_stream_name", &self.output_stream_name)
            .field("default_search_radius", &self.default_search_radius)
            .field("geocode_timeout", &self.geocode_timeout)
            .field("batch_deadline", &self.batch_deadline)
            .field("concurrency", &self.concurrency)
            .field("geocoding_base_url", &self.geocoding_base_url)
            .finish_non_exhaustive()
    }
}

impl Config {
    /// Reads configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingEnv`] if `GOOGLE_CLOUD_API_KEY` is
    /// unset, or [`ConfigError::Invalid`] if an optional variable is set
    /// to something unusable.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads configuration through `get`, which maps a variable name to
    /// its value.
    ///
    /// # Errors
    ///
    /// See [`Config::from_env`].
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let api_key = get("GOOGLE_CLOUD_API_KEY")
            .filter(|key| !key.is_empty())
            .ok_or_else(|| ConfigError::MissingEnv {
                name: "GOOGLE_CLOUD_API_KEY".to_string(),
            })?;

        let default_search_radius =
            parse_var::<f64>(&get, "DEFAULT_SEARCH_RADIUS_METERS", |r| {
                r.is_finite() && *r > 0.0
            })?
            .unwrap_or(DEFAULT_SEARCH_RADIUS_METERS);

        let geocode_timeout =
            parse_var::<u64>(&get, "GEOCODE_TIMEOUT_MS", |ms| *ms > 0)?.map(Duration::from_millis);

        let batch_deadline = parse_var::<u64>(&get, "BATCH_DEADLINE_MS", |ms| *ms > 0)?
            .map_or(DEFAULT_BATCH_DEADLINE, Duration::from_millis);

        let concurrency =
            parse_var::<usize>(&get, "GEOCODE_CONCURRENCY", |n| *n > 0)?.unwrap_or(DEFAULT_CONCURRENCY);

        Ok(Self {
            api_key,
            output_stream_name: get("OUTPUT_STREAM_NAME").filter(|s| !s.is_empty()),
            default_search_radius,
            geocode_timeout,
            batch_deadline,
            concurrency,
            geocoding_base_url: get("GEOCODING_BASE_URL").filter(|s| !s.is_empty()),
        })
    }

    /// The Google service definition with any endpoint or timeout
    /// override applied.
    #[must_use]
    pub fn service(&self) -> GeocodingService {
        service::google_service()
            .with_overrides(self.geocoding_base_url.as_deref(), self.geocode_timeout)
    }

    /// Builds the geocoding client.
    #[must_use]
    pub fn geocoder(&self, client: reqwest::Client) -> GoogleGeocoder {
        let service = self.service();
        log::debug!("Using {} at {}", service.name, service.base_url);
        GoogleGeocoder::from_service(client, &service, self.api_key.clone())
    }

    /// Pipeline settings for stream mode.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingEnv`] if `OUTPUT_STREAM_NAME` is
    /// unset.
    pub fn pipeline_options(&self) -> Result<PipelineOptions, ConfigError> {
        let stream_name = self
            .output_stream_name
            .clone()
            .ok_or_else(|| ConfigError::MissingEnv {
                name: "OUTPUT_STREAM_NAME".to_string(),
            })?;

        Ok(PipelineOptions {
            stream_name,
            default_search_radius: Some(self.default_search_radius),
            lookup_timeout: self.service().timeout,
            batch_deadline: self.batch_deadline,
            concurrency: self.concurrency,
        })
    }
}

/// Parses an optional variable, rejecting values that fail `accept`.
fn parse_var<T: FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    name: &str,
    accept: impl Fn(&T) -> bool,
) -> Result<Option<T>, ConfigError> {
    let Some(raw) = get(name) else {
        return Ok(None);
    };
    match raw.trim().parse::<T>() {
        Ok(value) if accept(&value) => Ok(Some(value)),
        _ => Err(ConfigError::Invalid {
            name: name.to_string(),
            value: raw,
        }),
    }
}
