//! Properties as seen by the property service's location search.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::geo::GeoPoint;
use crate::types::DbId;

/// Property types accepted by the property service.
pub const PROPERTY_TYPES: &[&str] = &["Apartment", "House", "Villa", "Condo", "Townhouse", "Studio"];

pub fn is_valid_property_type(value: &str) -> bool {
    PROPERTY_TYPES.contains(&value)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    pub id: DbId,
    pub owner_id: DbId,
    pub name: String,
    pub property_type: String,
    pub city: String,
    pub country: String,
    /// `None` for listings created without coordinates; those never match
    /// a radius search.
    pub location: Option<GeoPoint>,
    pub base_price: f64,
    pub max_guests: i32,
}

/// Attribute filters applied on top of a radius search.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PropertyFilter {
    pub property_type: Option<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub guests: Option<i32>,
}

impl PropertyFilter {
    pub fn validate(&self) -> Result<(), CoreError> {
        if let Some(t) = &self.property_type {
            if !is_valid_property_type(t) {
                return Err(CoreError::Validation(format!(
                    "Unknown property type '{t}'"
                )));
            }
        }
        for price in [self.min_price, self.max_price].into_iter().flatten() {
            if !price.is_finite() || price < 0.0 {
                return Err(CoreError::Validation(
                    "Prices must be non-negative".to_string(),
                ));
            }
        }
        if let (Some(min), Some(max)) = (self.min_price, self.max_price) {
            if min > max {
                return Err(CoreError::Validation(format!(
                    "min_price {min} is greater than max_price {max}"
                )));
            }
        }
        if let Some(guests) = self.guests {
            if guests < 1 {
                return Err(CoreError::Validation(
                    "guests must be at least 1".to_string(),
                ));
            }
        }
        Ok(())
    }

    pub fn matches(&self, property: &Property) -> bool {
        self.property_type
            .as_deref()
            .map_or(true, |t| property.property_type == t)
            && self.min_price.map_or(true, |min| property.base_price >= min)
            && self.max_price.map_or(true, |max| property.base_price <= max)
            && self.guests.map_or(true, |g| property.max_guests >= g)
    }
}

/// A property within the search radius, with its distance from the center.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PropertyMatch {
    #[serde(flatten)]
    pub property: Property,
    pub distance_km: f64,
}

/// Keep properties within `radius_km` of `center` and order them nearest
/// first, ties broken by id.
pub fn rank_by_distance(center: GeoPoint, radius_km: f64, properties: Vec<Property>) -> Vec<PropertyMatch> {
    let mut matches: Vec<PropertyMatch> = properties
        .into_iter()
        .filter_map(|property| {
            let distance_km = center.distance_km(&property.location?);
            (distance_km <= radius_km).then_some(PropertyMatch {
                property,
                distance_km,
            })
        })
        .collect();

    matches.sort_by(|a, b| {
        a.distance_km
            .partial_cmp(&b.distance_km)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.property.id.cmp(&b.property.id))
    });
    matches
}
