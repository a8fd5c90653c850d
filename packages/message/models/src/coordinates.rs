//! Structured coordinate types and the legacy bracket-string codec.
//!
//! Upstream producers encode a point as `"{lat, lng}"`. Inside the
//! pipeline every point is a [`LatLng`]; the bracket form only exists at
//! the message boundary so existing consumers keep working.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A point in decimal degrees (WGS84).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    /// Latitude in decimal degrees.
    pub latitude: f64,
    /// Longitude in decimal degrees.
    pub longitude: f64,
}

impl LatLng {
    /// Creates a new point.
    #[must_use]
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Whether both components are finite numbers.
    #[must_use]
    pub const fn is_finite(&self) -> bool {
        self.latitude.is_finite() && self.longitude.is_finite()
    }

    /// Whether the point is finite and inside the valid latitude and
    /// longitude ranges.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

impl std::fmt::Display for LatLng {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{{}, {}}}", self.latitude, self.longitude)
    }
}

/// Rectangular query region used to bias a geocoding lookup.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoBounds {
    /// South-west corner.
    pub southwest: LatLng,
    /// North-east corner.
    pub northeast: LatLng,
}

/// The encoded coordinate string was not exactly two finite numbers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed coordinate string {input:?}: {reason}")]
pub struct MalformedCoordinateError {
    /// The rejected input.
    pub input: String,
    /// What was wrong with it.
    pub reason: String,
}

/// Parses the legacy `"{lat, lng}"` form into a [`LatLng`].
///
/// The braces are rewritten to array delimiters and the result is read as
/// a JSON number array, so `"{40.75, -73.98}"` and `"{ 40.75,-73.98 }"`
/// both parse.
///
/// # Errors
///
/// Returns [`MalformedCoordinateError`] if the string does not hold
/// exactly two finite numbers.
pub fn parse(encoded: &str) -> Result<LatLng, MalformedCoordinateError> {
    let malformed = |reason: String| MalformedCoordinateError {
        input: encoded.to_string(),
        reason,
    };

    let bracketed = encoded.trim().replace('{', "[").replace('}', "]");
    let values: Vec<f64> =
        serde_json::from_str(&bracketed).map_err(|e| malformed(e.to_string()))?;

    let [latitude, longitude] = values[..] else {
        return Err(malformed(format!(
            "expected 2 components, found {}",
            values.len()
        )));
    };

    let point = LatLng::new(latitude, longitude);
    if !point.is_finite() {
        return Err(malformed("components must be finite".to_string()));
    }

    Ok(point)
}

/// Serializes a point back into the legacy `"{lat, lng}"` form.
///
/// Uses the shortest representation that round-trips exactly, so
/// repeated parse/format passes never drift.
#[must_use]
pub fn format(point: LatLng) -> String {
    point.to_string()
}
