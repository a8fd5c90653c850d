#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Message, coordinate, and provenance types for geoconfirm stream records.
//!
//! A [`Message`] is the decoded payload of one stream record. Only the
//! fields the enrichment pipeline reads or writes are modelled; every
//! other field is carried through untouched in [`Message::extra`].

pub mod coordinates;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use thiserror::Error;

pub use coordinates::{GeoBounds, LatLng, MalformedCoordinateError};

/// Where a message's coordinates came from.
///
/// Serialized as the bare variant name (e.g. `"UnreliableOriginSource"`).
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
pub enum CoordinateSource {
    /// Coordinates from an origin that needs confirmation (e.g. a coarse
    /// network-derived fix). The only source eligible for enrichment.
    UnreliableOriginSource,
    /// Coordinates reported by a device GPS.
    DeviceGpsSource,
    /// Coordinates entered by hand.
    ManualEntrySource,
    /// Coordinates confirmed or replaced by the geocoding service.
    GeocodingApiSource,
}

impl CoordinateSource {
    /// Whether a message tagged with this source should be geocoded.
    #[must_use]
    pub const fn needs_confirmation(self) -> bool {
        matches!(self, Self::UnreliableOriginSource)
    }

    /// Whether moving from `self` to `next` is allowed.
    ///
    /// Tags only move forward: an unreliable source may be promoted to
    /// [`Self::GeocodingApiSource`], and nothing else ever changes.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        self == next || (self.needs_confirmation() && next == Self::GeocodingApiSource)
    }
}

/// Returned when a coordinate update would move the source tag backwards.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot move coordinate source from {from} to {to}")]
pub struct SourceTransitionError {
    /// Current tag, or `"none"` if absent or unrecognized.
    pub from: String,
    /// Requested tag.
    pub to: CoordinateSource,
}

/// Record of one processing stage touching a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvenanceStamp {
    /// Name of the stage that processed the message.
    pub agent_name: String,
    /// Version of that stage.
    pub agent_version: String,
    /// When the stage finished with the message.
    pub processed_at: DateTime<Utc>,
    /// Host the stage ran on.
    pub hostname: String,
}

/// One entry of a message's process log.
///
/// Entries read off the wire are always [`ProcessLogEntry::Other`], even
/// when they look like stamps, so they serialize back byte-for-byte.
/// Only stamps appended in this process are typed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ProcessLogEntry {
    /// A stamp appended by this stage.
    Stamp(ProvenanceStamp),
    /// An entry written by an earlier stage, preserved verbatim.
    Other(serde_json::Value),
}

impl<'de> Deserialize<'de> for ProcessLogEntry {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(Self::Other)
    }
}

/// Keeps an explicit `null` as `Some(Value::Null)` so it is written back.
fn present<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<serde_json::Value>, D::Error> {
    serde_json::Value::deserialize(deserializer).map(Some)
}

/// Decoded payload of a stream record.
///
/// Typed accessors give the shape-checked view; the raw JSON values are
/// kept so a malformed field routes the record to the unchanged path
/// instead of failing the decode. `None` means the field was absent; an
/// explicit `null` is kept and written back.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Free text that may contain an address.
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub content: Option<serde_json::Value>,
    /// Legacy `"{lat, lng}"` coordinate string.
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<serde_json::Value>,
    /// Wire form of the [`CoordinateSource`] tag.
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub coordinate_source: Option<serde_json::Value>,
    /// Per-message search radius override, in meters.
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub search_radius: Option<serde_json::Value>,
    /// Append-only provenance log.
    #[serde(default)]
    pub process_log: Vec<ProcessLogEntry>,
    /// Every other field, carried through unchanged.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Message {
    /// The message text, if present and a string.
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        self.content.as_ref().and_then(serde_json::Value::as_str)
    }

    /// The encoded coordinate string, if present and a string.
    #[must_use]
    pub fn encoded_coordinates(&self) -> Option<&str> {
        self.coordinates.as_ref().and_then(serde_json::Value::as_str)
    }

    /// Whether the message carries a non-null `searchRadius` of its own.
    #[must_use]
    pub fn has_search_radius(&self) -> bool {
        self.search_radius.as_ref().is_some_and(|v| !v.is_null())
    }

    /// The per-message search radius, if present and numeric.
    #[must_use]
    pub fn search_radius(&self) -> Option<f64> {
        self.search_radius.as_ref().and_then(serde_json::Value::as_f64)
    }

    /// The parsed source tag. `None` when absent or unrecognized.
    #[must_use]
    pub fn source(&self) -> Option<CoordinateSource> {
        self.coordinate_source
            .as_ref()
            .and_then(serde_json::Value::as_str)
            .and_then(|s| s.parse().ok())
    }

    /// Replaces the coordinates with a geocoder-confirmed point and
    /// promotes the source tag.
    ///
    /// # Errors
    ///
    /// Returns [`SourceTransitionError`] (leaving the message untouched)
    /// if the current tag cannot move to
    /// [`CoordinateSource::GeocodingApiSource`].
    pub fn confirm_coordinates(&mut self, point: LatLng) -> Result<(), SourceTransitionError> {
        let next = CoordinateSource::GeocodingApiSource;
        match self.source() {
            Some(current) if current.can_transition_to(next) => {}
            current => {
                return Err(SourceTransitionError {
                    from: current.map_or_else(|| "none".to_string(), |s| s.to_string()),
                    to: next,
                });
            }
        }

        self.coordinates = Some(serde_json::Value::String(coordinates::format(point)));
        self.coordinate_source = Some(serde_json::Value::String(next.to_string()));
        Ok(())
    }

    /// Appends a stamp to the process log.
    pub fn stamp(&mut self, stamp: ProvenanceStamp) {
        self.process_log.push(ProcessLogEntry::Stamp(stamp));
    }
}
