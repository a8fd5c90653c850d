//! Direct (non-stream) single lookup.

use geoconfirm_geocoder::{GeocodingLookup, geocode_if_close};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::enable_verbose_logging;
use crate::validate::{LocationInput, validate};

/// An ad hoc lookup request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LookupRequest {
    /// Free text to geocode.
    #[serde(default)]
    pub text: Option<String>,
    /// Approximate location the result must be near.
    #[serde(default)]
    pub location_context: Option<LocationInput>,
    /// Acceptance radius in meters.
    #[serde(default)]
    pub search_radius: Option<f64>,
    /// Turns on debug logging for this invocation.
    #[serde(default)]
    pub debug: bool,
}

/// Status code plus optional JSON body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LookupResponse {
    /// HTTP-style status.
    pub status_code: u16,
    /// JSON-encoded body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

impl LookupResponse {
    const fn bad_request() -> Self {
        Self {
            status_code: 400,
            body: None,
        }
    }

    fn json(status_code: u16, body: &serde_json::Value) -> Self {
        match serde_json::to_string(body) {
            Ok(body) => Self {
                status_code,
                body: Some(body),
            },
            Err(e) => {
                log::error!("Failed to serialize lookup response: {e}");
                Self {
                    status_code: 500,
                    body: None,
                }
            }
        }
    }
}

/// Validates `request` and runs one radius-constrained lookup.
///
/// Returns 400 with no body if the inputs are not eligible, 200 with the
/// accepted point (or `null` when nothing lies within the radius), or 502
/// with an `error` message when the geocoding service fails.
pub async fn handle_lookup(lookup: &dyn GeocodingLookup, request: &LookupRequest) -> LookupResponse {
    enable_verbose_logging(request.debug);

    let input = match validate(
        request.text.as_deref(),
        request.location_context.as_ref(),
        request.search_radius,
    ) {
        Ok(input) => input,
        Err(failure) => {
            log::info!("Rejecting lookup request: {failure}");
            return LookupResponse::bad_request();
        }
    };

    match geocode_if_close(lookup, input.text, input.context, input.search_radius).await {
        Ok(Some(point)) => LookupResponse::json(200, &json!(point)),
        Ok(None) => LookupResponse::json(200, &serde_json::Value::Null),
        Err(e) => {
            log::error!("Geocoding lookup failed: {e}");
            LookupResponse::json(502, &json!({ "error": e.to_string() }))
        }
    }
}
