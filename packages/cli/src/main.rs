#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for geoconfirm.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use geoconfirm_enrich::{Agent, Config, LocationInput, LookupRequest, handle_lookup, process_batch};
use geoconfirm_stream::StreamEvent;
use geoconfirm_stream::kinesis::KinesisSink;
use geoconfirm_stream::publish::{LogSink, RecordSink};

#[derive(Parser)]
#[command(name = "geoconfirm", about = "Radius-constrained geocoding enrichment")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Geocode one piece of text near a location and print the response
    Lookup {
        /// Free text that may name a place
        #[arg(long)]
        text: String,
        /// Latitude of the approximate location
        #[arg(long, allow_hyphen_values = true)]
        latitude: f64,
        /// Longitude of the approximate location
        #[arg(long, allow_hyphen_values = true)]
        longitude: f64,
        /// Acceptance radius in meters (defaults to `DEFAULT_SEARCH_RADIUS_METERS`)
        #[arg(long)]
        radius: Option<f64>,
        /// Enable debug logging
        #[arg(long)]
        debug: bool,
    },
    /// Enrich a stream event and publish the results to `OUTPUT_STREAM_NAME`
    Process {
        /// Path to the event JSON. Reads stdin if not given.
        #[arg(long)]
        event: Option<PathBuf>,
        /// Log records instead of publishing them
        #[arg(long)]
        dry_run: bool,
    },
}

/// Initializes `pretty_env_logger`.
///
/// `RUST_LOG` wins when set. Otherwise the logger accepts everything up to
/// `Debug` but the global level starts at `Info`, so a per-invocation
/// debug flag can raise it later.
fn init_logger() {
    let mut builder = pretty_env_logger::formatted_builder();
    let from_env = std::env::var("RUST_LOG").is_ok();
    if from_env {
        builder.parse_env("RUST_LOG");
    } else {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.try_init().ok();

    if !from_env {
        log::set_max_level(log::LevelFilter::Info);
    }
}

/// Builds a direct lookup request, falling back to `default_radius` when
/// no radius was given.
fn lookup_request(
    text: String,
    latitude: f64,
    longitude: f64,
    radius: Option<f64>,
    default_radius: f64,
    debug: bool,
) -> LookupRequest {
    LookupRequest {
        text: Some(text),
        location_context: Some(LocationInput::Structured {
            latitude: Some(latitude),
            longitude: Some(longitude),
        }),
        search_radius: Some(radius.unwrap_or(default_radius)),
        debug,
    }
}

async fn read_event(path: Option<PathBuf>) -> Result<StreamEvent, Box<dyn std::error::Error>> {
    let raw = match path {
        Some(path) => tokio::fs::read_to_string(&path).await?,
        None => tokio::task::spawn_blocking(|| std::io::read_to_string(std::io::stdin())).await??,
    };
    Ok(serde_json::from_str(&raw)?)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logger();
    let cli = Cli::parse();

    let mut config = Config::from_env()?;
    log::debug!("Loaded {config:?}");
    let geocoder = config.geocoder(reqwest::Client::new());

    match cli.command {
        Commands::Lookup {
            text,
            latitude,
            longitude,
            radius,
            debug,
        } => {
            let request = lookup_request(
                text,
                latitude,
                longitude,
                radius,
                config.default_search_radius,
                debug,
            );
            let response = handle_lookup(&geocoder, &request).await;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Commands::Process { event, dry_run } => {
            let event = read_event(event).await?;

            let sink: Box<dyn RecordSink> = if dry_run {
                config
                    .output_stream_name
                    .get_or_insert_with(|| "dry-run".to_string());
                Box::new(LogSink)
            } else {
                Box::new(KinesisSink::from_env().await)
            };
            let options = config.pipeline_options()?;
            let agent = Agent::current();

            let report = process_batch(&geocoder, sink.as_ref(), &agent, &event, &options).await;

            let messages: Vec<_> = report.messages().collect();
            println!("{}", serde_json::to_string_pretty(&messages)?);

            if !report.publish.is_complete() {
                log::warn!("Some records were not published: {}", report.publish);
            }
        }
    }

    Ok(())
}
