//! Per-record enrichment.
//!
//! A record moves through: extracted → skipped or validated → unchanged or
//! enriched → stamped. Whatever branch it takes, it leaves with exactly one
//! new provenance stamp.

use std::time::Duration;

use geoconfirm_geocoder::{GeocodeError, GeocodingLookup, geocode_if_close};
use geoconfirm_message_models::{LatLng, Message};
use tokio::time::Instant;

use crate::provenance::Agent;
use crate::validate::{LocationInput, ValidationFailure, validate};

/// Why a record's coordinates were left alone.
#[derive(Debug, Clone, PartialEq)]
pub enum UnchangedReason {
    /// The source tag is absent, unknown, or already trusted.
    SourceNotEligible,
    /// Text, location, or radius failed validation.
    Invalid(ValidationFailure),
    /// The lookup found nothing within the radius.
    NoMatch,
    /// The lookup failed; the record is passed through.
    LookupFailed(String),
    /// The batch deadline passed before the lookup could start.
    DeadlineExceeded,
}

/// Result of enriching one record.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Coordinates replaced and source promoted.
    Enriched(LatLng),
    /// Coordinates untouched.
    Unchanged(UnchangedReason),
}

impl Outcome {
    /// Whether the coordinates were replaced.
    #[must_use]
    pub const fn is_enriched(&self) -> bool {
        matches!(self, Self::Enriched(_))
    }

    /// Whether a lookup was attempted and failed.
    #[must_use]
    pub const fn is_lookup_failure(&self) -> bool {
        matches!(self, Self::Unchanged(UnchangedReason::LookupFailed(_)))
    }
}

/// Geocodes eligible messages and stamps every message.
pub struct RecordEnricher<'a> {
    lookup: &'a dyn GeocodingLookup,
    agent: &'a Agent,
    default_search_radius: Option<f64>,
    lookup_timeout: Duration,
}

impl<'a> RecordEnricher<'a> {
    /// Creates an enricher.
    ///
    /// `default_search_radius` applies to messages that carry no
    /// `searchRadius` of their own.
    #[must_use]
    pub const fn new(
        lookup: &'a dyn GeocodingLookup,
        agent: &'a Agent,
        default_search_radius: Option<f64>,
        lookup_timeout: Duration,
    ) -> Self {
        Self {
            lookup,
            agent,
            default_search_radius,
            lookup_timeout,
        }
    }

    /// Enriches `message` in place if it is eligible, then appends a
    /// provenance stamp.
    ///
    /// Lookup failures never escape: they route the message to
    /// [`Outcome::Unchanged`]. The lookup is bounded by the enricher's
    /// timeout and, when given, by `deadline`.
    pub async fn process(&self, message: &mut Message, deadline: Option<Instant>) -> Outcome {
        let outcome = self.enrich(message, deadline).await;
        message.stamp(self.agent.stamp());
        outcome
    }

    async fn enrich(&self, message: &mut Message, deadline: Option<Instant>) -> Outcome {
        if !message.source().is_some_and(|s| s.needs_confirmation()) {
            return Outcome::Unchanged(UnchangedReason::SourceNotEligible);
        }

        // A non-null radius carried on the message wins, even when it is invalid.
        let search_radius = if message.has_search_radius() {
            message.search_radius()
        } else {
            self.default_search_radius
        };
        let location = message
            .encoded_coordinates()
            .map(|s| LocationInput::Encoded(s.to_string()));

        let input = match validate(message.text(), location.as_ref(), search_radius) {
            Ok(input) => input,
            Err(failure) => {
                log::debug!("Not geocoding message: {failure}");
                return Outcome::Unchanged(UnchangedReason::Invalid(failure));
            }
        };

        let timeout = match deadline {
            Some(deadline) => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    log::warn!("Batch deadline passed, skipping lookup");
                    return Outcome::Unchanged(UnchangedReason::DeadlineExceeded);
                }
                remaining.min(self.lookup_timeout)
            }
            None => self.lookup_timeout,
        };

        let lookup = geocode_if_close(self.lookup, input.text, input.context, input.search_radius);
        let result = match tokio::time::timeout(timeout, lookup).await {
            Ok(result) => result,
            Err(_) => Err(GeocodeError::Timeout {
                elapsed_ms: timeout.as_millis(),
            }),
        };

        match result {
            Ok(Some(point)) => match message.confirm_coordinates(point) {
                Ok(()) => {
                    log::debug!("Confirmed coordinates {point}");
                    Outcome::Enriched(point)
                }
                Err(e) => {
                    log::warn!("Not applying geocoded coordinates: {e}");
                    Outcome::Unchanged(UnchangedReason::SourceNotEligible)
                }
            },
            Ok(None) => Outcome::Unchanged(UnchangedReason::NoMatch),
            Err(e) => {
                log::warn!("Geocoding lookup failed: {e}");
                Outcome::Unchanged(UnchangedReason::LookupFailed(e.to_string()))
            }
        }
    }
}
