//! Property rows as read by location search.

use serde::Deserialize;
use sqlx::FromRow;
use staybook_core::geo::GeoPoint;
use staybook_core::property::Property;
use staybook_core::types::DbId;

/// The subset of `properties` columns location search needs.
#[derive(Debug, Clone, FromRow)]
pub struct PropertyRow {
    pub id: DbId,
    pub owner_id: DbId,
    pub name: String,
    pub property_type: String,
    pub city: String,
    pub country: String,
    pub location_lat: Option<f64>,
    pub location_lng: Option<f64>,
    pub base_price: f64,
    pub max_guests: i32,
}

impl From<PropertyRow> for Property {
    fn from(row: PropertyRow) -> Self {
        let location = match (row.location_lat, row.location_lng) {
            (Some(lat), Some(lng)) => Some(GeoPoint::new(lat, lng)),
            _ => None,
        };
        Property {
            id: row.id,
            owner_id: row.owner_id,
            name: row.name,
            property_type: row.property_type,
            city: row.city,
            country: row.country,
            location,
            base_price: row.base_price,
            max_guests: row.max_guests,
        }
    }
}

/// DTO for inserting a property (seeding and tests).
#[derive(Debug, Clone, Deserialize)]
pub struct CreateProperty {
    pub owner_id: DbId,
    pub name: String,
    pub property_type: String,
    pub city: String,
    pub country: String,
    pub location: Option<GeoPoint>,
    pub base_price: f64,
    pub max_guests: i32,
}
