//! Google Geocoding API client.
//!
//! Sends the free text as `address` and the search box as `bounds`. The
//! API treats `bounds` as a viewport bias: results outside the box are
//! still returned when Google judges them relevant, so callers must
//! re-check distances themselves (see [`crate::geocode_if_close`]).
//!
//! See <https://developers.google.com/maps/documentation/geocoding/requests-geocoding>

use std::time::Duration;

use async_trait::async_trait;
use geoconfirm_message_models::{GeoBounds, LatLng};

use crate::service::GeocodingService;
use crate::{Candidate, GeocodeError, GeocodingLookup};

/// Client for the Google Geocoding API.
pub struct GoogleGeocoder {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    timeout: Duration,
}

impl std::fmt::Debug for GoogleGeocoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoogleGeocoder")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl GoogleGeocoder {
    /// Creates a client for the given endpoint.
    #[must_use]
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
            timeout,
        }
    }

    /// Creates a client for a service definition, using its endpoint and
    /// timeout.
    #[must_use]
    pub fn from_service(
        client: reqwest::Client,
        service: &GeocodingService,
        api_key: impl Into<String>,
    ) -> Self {
        Self::new(client, service.base_url.clone(), api_key, service.timeout)
    }
}

/// Formats bounds as Google expects: `swLat,swLng|neLat,neLng`.
#[must_use]
pub fn bounds_param(bounds: &GeoBounds) -> String {
    let GeoBounds {
        southwest,
        northeast,
    } = bounds;
    format!(
        "{},{}|{},{}",
        southwest.latitude, southwest.longitude, northeast.latitude, northeast.longitude
    )
}

#[async_trait]
impl GeocodingLookup for GoogleGeocoder {
    async fn lookup(&self, text: &str, bounds: &GeoBounds) -> Result<Vec<Candidate>, GeocodeError> {
        let bounds = bounds_param(bounds);

        let resp = self
            .client
            .get(&self.base_url)
            .query(&[
                ("address", text),
                ("bounds", bounds.as_str()),
                ("key", self.api_key.as_str()),
            ])
            .timeout(self.timeout)
            .send()
            .await
            .map_err(redact)?;

        log::debug!("Google Geocoding API responded with {}", resp.status());

        if resp.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(GeocodeError::RateLimited);
        }

        if !resp.status().is_success() {
            return Err(GeocodeError::Service {
                status: resp.status().as_u16().to_string(),
                message: format!("Google Geocoding API returned HTTP {}", resp.status()),
            });
        }

        let body: serde_json::Value = resp.json().await.map_err(redact)?;
        parse_response(&body)
    }
}

/// Drops the request URL (which carries the API key) from an HTTP error.
fn redact(e: reqwest::Error) -> GeocodeError {
    GeocodeError::Http(e.without_url())
}

/// Parses a Google Geocoding JSON response into candidates, preserving
/// the API's ranking order.
fn parse_response(body: &serde_json::Value) -> Result<Vec<Candidate>, GeocodeError> {
    let status = body
        .get("status")
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| GeocodeError::Parse {
            message: "Google response missing 'status'".to_string(),
        })?;

    match status {
        "OK" => {}
        "ZERO_RESULTS" => return Ok(Vec::new()),
        "OVER_QUERY_LIMIT" => return Err(GeocodeError::RateLimited),
        other => {
            let message = body
                .get("error_message")
                .and_then(serde_json::Value::as_str)
                .unwrap_or("no error message")
                .to_string();
            return Err(GeocodeError::Service {
                status: other.to_string(),
                message,
            });
        }
    }

    let results = body
        .get("results")
        .and_then(serde_json::Value::as_array)
        .ok_or_else(|| GeocodeError::Parse {
            message: "Google response missing 'results' array".to_string(),
        })?;

    results
        .iter()
        .map(|result| {
            let lat = result
                .pointer("/geometry/location/lat")
                .and_then(serde_json::Value::as_f64)
                .ok_or_else(|| GeocodeError::Parse {
                    message: "Result missing geometry.location.lat".to_string(),
                })?;
            let lng = result
                .pointer("/geometry/location/lng")
                .and_then(serde_json::Value::as_f64)
                .ok_or_else(|| GeocodeError::Parse {
                    message: "Result missing geometry.location.lng".to_string(),
                })?;
            let formatted_address = result
                .get("formatted_address")
                .and_then(serde_json::Value::as_str)
                .map(String::from);

            Ok(Candidate {
                location: LatLng::new(lat, lng),
                formatted_address,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sample_bounds() -> GeoBounds {
        GeoBounds {
            southwest: LatLng::new(34.172684, -118.604794),
            northeast: LatLng::new(34.236144, -118.500938),
        }
    }

    #[test]
    fn formats_bounds_southwest_first() {
        assert_eq!(
            bounds_param(&sample_bounds()),
            "34.172684,-118.604794|34.236144,-118.500938"
        );
    }

    #[test]
    fn parses_results_in_order() {
        let body = json!({
            "status": "OK",
            "results": [
                {
                    "formatted_address": "Winnetka, Los Angeles, CA, USA",
                    "geometry": {"location": {"lat": 34.2048, "lng": -118.5739}}
                },
                {
                    "formatted_address": "Winnetka, IL, USA",
                    "geometry": {"location": {"lat": 42.1081, "lng": -87.7359}}
                }
            ]
        });
        let candidates = parse_response(&body).unwrap();
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].location, LatLng::new(34.2048, -118.5739));
        assert_eq!(
            candidates[1].formatted_address.as_deref(),
            Some("Winnetka, IL, USA")
        );
    }

    #[test]
    fn zero_results_is_empty_not_error() {
        let body = json!({"status": "ZERO_RESULTS", "results": []});
        assert!(parse_response(&body).unwrap().is_empty());
    }

    #[test]
    fn denied_request_is_service_error() {
        let body = json!({
            "status": "REQUEST_DENIED",
            "error_message": "The provided API key is invalid.",
            "results": []
        });
        match parse_response(&body) {
            Err(GeocodeError::Service { status, message }) => {
                assert_eq!(status, "REQUEST_DENIED");
                assert_eq!(message, "The provided API key is invalid.");
            }
            other => panic!("expected service error, got {other:?}"),
        }
    }

    #[test]
    fn over_query_limit_is_rate_limited() {
        let body = json!({"status": "OVER_QUERY_LIMIT", "results": []});
        assert!(matches!(
            parse_response(&body),
            Err(GeocodeError::RateLimited)
        ));
    }

    #[test]
    fn result_without_location_is_parse_error() {
        let body = json!({"status": "OK", "results": [{"geometry": {}}]});
        assert!(matches!(
            parse_response(&body),
            Err(GeocodeError::Parse { .. })
        ));
    }

    #[tokio::test]
    async fn sends_address_bounds_and_key() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/geocode/json"))
            .and(query_param("address", "Winnetka"))
            .and(query_param(
                "bounds",
                "34.172684,-118.604794|34.236144,-118.500938",
            ))
            .and(query_param("key", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "OK",
                "results": [{"geometry": {"location": {"lat": 34.2048, "lng": -118.5739}}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let geocoder = GoogleGeocoder::new(
            reqwest::Client::new(),
            format!("{}/geocode/json", server.uri()),
            "test-key",
            Duration::from_secs(5),
        );
        let candidates = geocoder
            .lookup("Winnetka", &sample_bounds())
            .await
            .unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].location, LatLng::new(34.2048, -118.5739));
    }

    #[tokio::test]
    async fn http_failure_is_service_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let geocoder = GoogleGeocoder::new(
            reqwest::Client::new(),
            server.uri(),
            "test-key",
            Duration::from_secs(5),
        );
        let err = geocoder
            .lookup("Winnetka", &sample_bounds())
            .await
            .unwrap_err();
        assert!(matches!(err, GeocodeError::Service { ref status, .. } if status == "503"));
    }

    #[tokio::test]
    async fn slow_response_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"status": "ZERO_RESULTS", "results": []}))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let geocoder = GoogleGeocoder::new(
            reqwest::Client::new(),
            server.uri(),
            "test-key",
            Duration::from_millis(50),
        );
        let err = geocoder
            .lookup("Winnetka", &sample_bounds())
            .await
            .unwrap_err();
        assert!(matches!(err, GeocodeError::Http(ref e) if e.is_timeout()));
        assert!(!err.to_string().contains("test-key"));
    }

    #[tokio::test]
    async fn undecodable_body_error_does_not_leak_key() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let geocoder = GoogleGeocoder::new(
            reqwest::Client::new(),
            server.uri(),
            "test-key",
            Duration::from_secs(5),
        );
        let err = geocoder
            .lookup("Winnetka", &sample_bounds())
            .await
            .unwrap_err();
        assert!(matches!(err, GeocodeError::Http(ref e) if e.is_decode()));
        assert!(!err.to_string().contains("test-key"));
    }

    #[test]
    fn debug_output_hides_api_key() {
        let geocoder = GoogleGeocoder::new(
            reqwest::Client::new(),
            "https://example.invalid",
            "super-secret",
            Duration::from_secs(1),
        );
        assert!(!format!("{geocoder:?}").contains("super-secret"));
    }
}
