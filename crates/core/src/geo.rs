//! Great-circle geometry for property radius search.
//!
//! Lives in `core` so the query planner, store adapters and tests agree on
//! exactly one distance function and one bounding-box construction.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::geo_index::IndexState;

/// Mean Earth radius (IUGG), in kilometres.
pub const EARTH_RADIUS_KM: f64 = 6371.0088;

/// Largest radius accepted by property search.
pub const MAX_SEARCH_RADIUS_KM: f64 = 1000.0;

/// Padding (degrees) added to bounding boxes so float rounding never drops a
/// point that is exactly on the circle.
const BBOX_EPSILON_DEG: f64 = 1e-9;

// ---------------------------------------------------------------------------
// Points
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if !self.lat.is_finite() || !(-90.0..=90.0).contains(&self.lat) {
            return Err(CoreError::Validation(format!(
                "Latitude must be within [-90, 90], got {}",
                self.lat
            )));
        }
        if !self.lng.is_finite() || !(-180.0..=180.0).contains(&self.lng) {
            return Err(CoreError::Validation(format!(
                "Longitude must be within [-180, 180], got {}",
                self.lng
            )));
        }
        Ok(())
    }

    pub fn distance_km(&self, other: &GeoPoint) -> f64 {
        haversine_km(*self, *other)
    }
}

/// Haversine great-circle distance in kilometres.
pub fn haversine_km(a: GeoPoint, b: GeoPoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let dlat = (b.lat - a.lat).to_radians();
    let dlng = (b.lng - a.lng).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().min(1.0).asin()
}

pub fn validate_radius(radius_km: f64) -> Result<(), CoreError> {
    if !radius_km.is_finite() || radius_km <= 0.0 || radius_km > MAX_SEARCH_RADIUS_KM {
        return Err(CoreError::Validation(format!(
            "Radius must be in (0, {MAX_SEARCH_RADIUS_KM}] km, got {radius_km}"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Bounding box
// ---------------------------------------------------------------------------

/// Axis-aligned lat/lng box, always a superset of the search circle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl BoundingBox {
    /// Smallest box enclosing the circle of `radius_km` around `center`.
    ///
    /// Widens to the full longitude range when the circle reaches a pole or
    /// crosses the antimeridian.
    pub fn around(center: GeoPoint, radius_km: f64) -> Self {
        let angular = (radius_km / EARTH_RADIUS_KM).to_degrees();
        let min_lat = center.lat - angular - BBOX_EPSILON_DEG;
        let max_lat = center.lat + angular + BBOX_EPSILON_DEG;

        if min_lat <= -90.0 || max_lat >= 90.0 {
            return Self {
                min_lat: min_lat.max(-90.0),
                max_lat: max_lat.min(90.0),
                min_lng: -180.0,
                max_lng: 180.0,
            };
        }

        let delta_lng = ((radius_km / EARTH_RADIUS_KM).sin() / center.lat.to_radians().cos())
            .min(1.0)
            .asin()
            .to_degrees()
            + BBOX_EPSILON_DEG;
        let min_lng = center.lng - delta_lng;
        let max_lng = center.lng + delta_lng;

        if min_lng < -180.0 || max_lng > 180.0 {
            return Self {
                min_lat,
                max_lat,
                min_lng: -180.0,
                max_lng: 180.0,
            };
        }

        Self {
            min_lat,
            max_lat,
            min_lng,
            max_lng,
        }
    }

    pub fn contains(&self, point: GeoPoint) -> bool {
        (self.min_lat..=self.max_lat).contains(&point.lat)
            && (self.min_lng..=self.max_lng).contains(&point.lng)
    }
}

// ---------------------------------------------------------------------------
// Query plans
// ---------------------------------------------------------------------------

/// How a radius search will be executed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum QueryPlan {
    /// Radius query served by the active geospatial index.
    Indexed {
        index_name: String,
        center: GeoPoint,
        radius_km: f64,
    },
    /// Index-free bounding-box scan followed by exact distance filtering.
    Fallback {
        bbox: BoundingBox,
        center: GeoPoint,
        radius_km: f64,
        index_state: IndexState,
    },
}

impl QueryPlan {
    pub fn is_indexed(&self) -> bool {
        matches!(self, QueryPlan::Indexed { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISBON: GeoPoint = GeoPoint { lat: 38.7223, lng: -9.1393 };
    const PORTO: GeoPoint = GeoPoint { lat: 41.1579, lng: -8.6291 };

    #[test]
    fn lisbon_to_porto_is_about_274_km() {
        let d = haversine_km(LISBON, PORTO);
        assert!((d - 274.0).abs() < 2.0, "got {d}");
    }

    #[test]
    fn distance_to_self_is_zero() {
        assert_eq!(LISBON.distance_km(&LISBON), 0.0);
    }

    #[test]
    fn out_of_range_coordinates_are_rejected() {
        assert!(GeoPoint::new(91.0, 0.0).validate().is_err());
        assert!(GeoPoint::new(0.0, -181.0).validate().is_err());
        assert!(GeoPoint::new(f64::NAN, 0.0).validate().is_err());
        assert!(LISBON.validate().is_ok());
    }

    #[test]
    fn radius_bounds() {
        assert!(validate_radius(0.0).is_err());
        assert!(validate_radius(-1.0).is_err());
        assert!(validate_radius(MAX_SEARCH_RADIUS_KM + 1.0).is_err());
        assert!(validate_radius(f64::INFINITY).is_err());
        assert!(validate_radius(25.0).is_ok());
    }

    #[test]
    fn bbox_contains_points_on_the_circle() {
        let radius = 50.0;
        let bbox = BoundingBox::around(LISBON, radius);
        // Walk the circle and check every sampled boundary point is inside.
        for step in 0..360 {
            let bearing = (step as f64).to_radians();
            let angular = radius / EARTH_RADIUS_KM;
            let lat1 = LISBON.lat.to_radians();
            let lng1 = LISBON.lng.to_radians();
            let lat2 = (lat1.sin() * angular.cos() + lat1.cos() * angular.sin() * bearing.cos()).asin();
            let lng2 = lng1
                + (bearing.sin() * angular.sin() * lat1.cos())
                    .atan2(angular.cos() - lat1.sin() * lat2.sin());
            let p = GeoPoint::new(lat2.to_degrees(), lng2.to_degrees());
            assert!(bbox.contains(p), "boundary point {p:?} outside {bbox:?}");
        }
        assert!(!bbox.contains(PORTO));
    }

    #[test]
    fn bbox_near_pole_spans_all_longitudes() {
        let bbox = BoundingBox::around(GeoPoint::new(89.9, 10.0), 50.0);
        assert_eq!(bbox.min_lng, -180.0);
        assert_eq!(bbox.max_lng, 180.0);
        assert_eq!(bbox.max_lat, 90.0);
    }

    #[test]
    fn bbox_across_antimeridian_spans_all_longitudes() {
        let bbox = BoundingBox::around(GeoPoint::new(-17.7, 179.9), 100.0);
        assert_eq!(bbox.min_lng, -180.0);
        assert_eq!(bbox.max_lng, 180.0);
        assert!(bbox.contains(GeoPoint::new(-17.7, -179.8)));
    }

    #[test]
    fn plan_serializes_with_strategy_tag() {
        let plan = QueryPlan::Indexed {
            index_name: "idx".into(),
            center: LISBON,
            radius_km: 5.0,
        };
        let json = serde_json::to_value(&plan).unwrap();
        assert_eq!(json["strategy"], "indexed");
        assert!(plan.is_indexed());
    }
}
