//! Great-circle bounds and radius checks.
//!
//! Distances use the haversine formula on a sphere of mean earth radius,
//! the same model [`geo::Haversine`] uses, so a point accepted by
//! [`is_within_radius`] always lies inside [`bounds_of_distance`] for the
//! same center and radius.

use std::f64::consts::{FRAC_PI_2, PI};

use geo::{Distance as _, Haversine, Point};
use geoconfirm_message_models::{GeoBounds, LatLng};

/// Mean earth radius in meters (IUGG), matching [`geo::Haversine`].
pub const MEAN_EARTH_RADIUS_METERS: f64 = 6_371_008.8;

fn to_point(p: LatLng) -> Point<f64> {
    Point::new(p.longitude, p.latitude)
}

/// Great-circle distance between two points, in meters.
#[must_use]
pub fn distance_meters(a: LatLng, b: LatLng) -> f64 {
    Haversine.distance(to_point(a), to_point(b))
}

/// Whether `point` lies within `radius_meters` of `center`.
#[must_use]
pub fn is_within_radius(point: LatLng, center: LatLng, radius_meters: f64) -> bool {
    distance_meters(point, center) <= radius_meters
}

/// Computes the smallest latitude/longitude rectangle containing every
/// point within `radius_meters` of `center`.
///
/// Near the poles, when the circle reaches past ±90° latitude, the box
/// spans all longitudes and the latitude extent is clamped. A box that
/// crosses the antimeridian has `southwest.longitude >
/// northeast.longitude`.
#[must_use]
pub fn bounds_of_distance(center: LatLng, radius_meters: f64) -> GeoBounds {
    let lat = center.latitude.to_radians();
    let lng = center.longitude.to_radians();
    let angular = radius_meters / MEAN_EARTH_RADIUS_METERS;

    let mut min_lat = lat - angular;
    let mut max_lat = lat + angular;

    let (min_lng, max_lng) = if min_lat > -FRAC_PI_2 && max_lat < FRAC_PI_2 {
        let delta_lng = (angular.sin() / lat.cos()).asin();
        let mut min_lng = lng - delta_lng;
        if min_lng < -PI {
            min_lng += 2.0 * PI;
        }
        let mut max_lng = lng + delta_lng;
        if max_lng > PI {
            max_lng -= 2.0 * PI;
        }
        (min_lng, max_lng)
    } else {
        min_lat = min_lat.max(-FRAC_PI_2);
        max_lat = max_lat.min(FRAC_PI_2);
        (-PI, PI)
    };

    GeoBounds {
        southwest: LatLng::new(min_lat.to_degrees(), min_lng.to_degrees()),
        northeast: LatLng::new(max_lat.to_degrees(), max_lng.to_degrees()),
    }
}
