#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Geocoding enrichment of stream messages.
//!
//! Messages whose coordinates came from an unreliable source are geocoded
//! from their text. A result within the search radius of the original
//! point replaces the coordinates and promotes the source; anything else
//! leaves the message as it was. Every message, enriched or not, gets one
//! provenance stamp and is re-published.
//!
//! - [`pipeline::process_batch`] handles one stream batch.
//! - [`lookup::handle_lookup`] handles one ad hoc request.
//! - [`config::Config`] reads settings from the environment.

pub mod config;
pub mod enricher;
pub mod lookup;
pub mod pipeline;
pub mod provenance;
pub mod validate;

pub use config::{Config, ConfigError};
pub use enricher::{Outcome, RecordEnricher, UnchangedReason};
pub use lookup::{LookupRequest, LookupResponse, handle_lookup};
pub use pipeline::{BatchReport, PipelineOptions, ProcessedRecord, process_batch};
pub use provenance::Agent;
pub use validate::{LocationInput, ValidationFailure, is_eligible, validate};

/// Raises the global log level to `Debug` when an invocation asks for it.
///
/// Never lowers a level that is already more verbose.
pub fn enable_verbose_logging(debug: bool) {
    if debug && log::max_level() < log::LevelFilter::Debug {
        log::set_max_level(log::LevelFilter::Debug);
        log::debug!("Verbose logging enabled for this invocation");
    }
}
