#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Radius-constrained geocoding.
//!
//! Given free-form text that may name a place, an approximate location,
//! and a search radius, [`geocode_if_close`] asks a geocoding provider for
//! candidates near the location and accepts the provider's best-ranked
//! candidate that actually lies within the radius.
//!
//! For example, with the text `"Free ice cream, Broadway and W 32nd St"`
//! and a context in midtown Manhattan, the result is the intersection of
//! Broadway and West 32nd Street, provided it lies within the radius.
//!
//! Providers implement [`GeocodingLookup`]. The production provider is the
//! Google Geocoding API ([`google::GoogleGeocoder`]), configured from the
//! embedded [`service`] definition.

pub mod bounds;
pub mod google;
pub mod service;

use async_trait::async_trait;
use geoconfirm_message_models::{GeoBounds, LatLng};
use thiserror::Error;

/// A geocoding candidate returned by a provider.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    /// Location of the match.
    pub location: LatLng,
    /// Canonical address of the match, when the provider supplies one.
    pub formatted_address: Option<String>,
}

/// Errors from geocoding operations.
#[derive(Debug, Error)]
pub enum GeocodeError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Response parsing failed.
    #[error("Parse error: {message}")]
    Parse {
        /// Description of the parsing failure.
        message: String,
    },

    /// The provider rejected the request.
    #[error("Geocoding service error ({status}): {message}")]
    Service {
        /// Provider status (API status string or HTTP status code).
        status: String,
        /// Provider-supplied description.
        message: String,
    },

    /// Rate limit exceeded.
    #[error("Rate limit exceeded")]
    RateLimited,

    /// The lookup did not finish before its deadline.
    #[error("Geocoding lookup timed out after {elapsed_ms} ms")]
    Timeout {
        /// How long the caller waited.
        elapsed_ms: u128,
    },
}

/// A geocoding provider.
///
/// `bounds` is a bias, not a filter: implementations may return
/// candidates outside it. Candidates must be in the provider's relevance
/// order, best first.
#[async_trait]
pub trait GeocodingLookup: Send + Sync {
    /// Looks up `text` near `bounds`.
    ///
    /// # Errors
    ///
    /// Returns [`GeocodeError`] if the provider cannot be reached or
    /// rejects the request. An empty candidate list is not an error.
    async fn lookup(&self, text: &str, bounds: &GeoBounds) -> Result<Vec<Candidate>, GeocodeError>;
}

/// Geocodes `text` and returns the first candidate within
/// `search_radius` meters of `context`, or `None`.
///
/// The provider is queried with a box of the search radius around the
/// context. Since the box is only advisory, every candidate is
/// re-checked by great-circle distance. Among the survivors the
/// provider's ranking wins; candidates are never re-sorted by distance.
///
/// Inputs are assumed valid (finite context, positive radius).
///
/// # Errors
///
/// Returns [`GeocodeError`] if the lookup itself fails. No retries are
/// attempted here.
pub async fn geocode_if_close(
    lookup: &dyn GeocodingLookup,
    text: &str,
    context: LatLng,
    search_radius: f64,
) -> Result<Option<LatLng>, GeocodeError> {
    log::debug!("Computing {search_radius} m bounds around {context}");
    let bounds = bounds::bounds_of_distance(context, search_radius);

    log::debug!("Fetching geocoding candidates for {text:?}");
    let candidates = lookup.lookup(text, &bounds).await?;

    log::debug!("Filtering {} candidate(s) by distance", candidates.len());
    let close_enough = candidates
        .into_iter()
        .find(|c| bounds::is_within_radius(c.location, context, search_radius));

    match close_enough {
        Some(candidate) => {
            log::debug!(
                "Found close enough result {} ({})",
                candidate.location,
                candidate.formatted_address.as_deref().unwrap_or("no address")
            );
            Ok(Some(candidate.location))
        }
        None => {
            log::debug!("Did not find close enough result");
            Ok(None)
        }
    }
}
