//! Input checks that gate a geocoding attempt.
//!
//! Every check is an explicit predicate; a failure is a routing decision
//! (the record stays unchanged), never a fatal error.

use geoconfirm_message_models::coordinates::{self, LatLng, MalformedCoordinateError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A location context as callers supply it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LocationInput {
    /// Structured `{latitude, longitude}` object.
    Structured {
        /// Latitude in decimal degrees.
        latitude: Option<f64>,
        /// Longitude in decimal degrees.
        longitude: Option<f64>,
    },
    /// Legacy `"{lat, lng}"` string.
    Encoded(String),
}

/// Why an input was not eligible for geocoding.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationFailure {
    /// No text, or text that is not a string.
    #[error("text is missing")]
    MissingText,

    /// Text is an empty string.
    #[error("text is empty")]
    EmptyText,

    /// No location context.
    #[error("location context is missing")]
    MissingLocation,

    /// Location string could not be parsed.
    #[error(transparent)]
    MalformedLocation(#[from] MalformedCoordinateError),

    /// Location is missing a component, not finite, or out of range.
    #[error("location context {latitude:?}, {longitude:?} is not a valid point")]
    InvalidLocation {
        /// Supplied latitude.
        latitude: Option<f64>,
        /// Supplied longitude.
        longitude: Option<f64>,
    },

    /// No search radius.
    #[error("search radius is missing")]
    MissingRadius,

    /// Radius is not a positive finite number.
    #[error("search radius {0} is not a positive number")]
    InvalidRadius(f64),
}

/// Inputs that passed every check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValidatedInput<'a> {
    /// Non-empty free text.
    pub text: &'a str,
    /// Finite, in-range context point.
    pub context: LatLng,
    /// Positive, finite radius in meters.
    pub search_radius: f64,
}

fn check_location(location: Option<&LocationInput>) -> Result<LatLng, ValidationFailure> {
    let point = match location {
        None => return Err(ValidationFailure::MissingLocation),
        Some(LocationInput::Encoded(encoded)) => coordinates::parse(encoded)?,
        Some(LocationInput::Structured {
            latitude: Some(latitude),
            longitude: Some(longitude),
        }) => LatLng::new(*latitude, *longitude),
        Some(LocationInput::Structured {
            latitude,
            longitude,
        }) => {
            return Err(ValidationFailure::InvalidLocation {
                latitude: *latitude,
                longitude: *longitude,
            });
        }
    };

    if point.is_valid() {
        Ok(point)
    } else {
        Err(ValidationFailure::InvalidLocation {
            latitude: Some(point.latitude),
            longitude: Some(point.longitude),
        })
    }
}

/// Checks that all three inputs are present and well-formed.
///
/// A latitude or longitude of exactly zero is a real place and passes.
///
/// # Errors
///
/// Returns the first [`ValidationFailure`] found, checking text, then
/// location, then radius.
pub fn validate<'a>(
    text: Option<&'a str>,
    location: Option<&LocationInput>,
    search_radius: Option<f64>,
) -> Result<ValidatedInput<'a>, ValidationFailure> {
    let text = text.ok_or(ValidationFailure::MissingText)?;
    if text.is_empty() {
        return Err(ValidationFailure::EmptyText);
    }

    let context = check_location(location)?;

    let search_radius = search_radius.ok_or(ValidationFailure::MissingRadius)?;
    if !(search_radius.is_finite() && search_radius > 0.0) {
        return Err(ValidationFailure::InvalidRadius(search_radius));
    }

    Ok(ValidatedInput {
        text,
        context,
        search_radius,
    })
}

/// Whether the inputs pass [`validate`].
#[must_use]
pub fn is_eligible(
    text: Option<&str>,
    location: Option<&LocationInput>,
    search_radius: Option<f64>,
) -> bool {
    validate(text, location, search_radius).is_ok()
}
