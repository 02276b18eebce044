//! Query parameter types for API handlers.

use serde::Deserialize;
use staybook_core::booking::{BookingFilter, Page};
use staybook_core::error::AggregationError;
use staybook_core::geo::GeoPoint;
use staybook_core::property::PropertyFilter;
use staybook_core::types::{DbId, StayDate};

/// `GET /bookings/views` parameters. `limit`/`offset` are clamped by
/// [`Page::new`].
#[derive(Debug, Default, Deserialize)]
pub struct BookingViewParams {
    pub status: Option<String>,
    /// Inclusive `YYYY-MM-DD` bounds of the stay window.
    pub from: Option<StayDate>,
    pub to: Option<StayDate>,
    pub owner_id: Option<DbId>,
    pub traveler_id: Option<DbId>,
    /// `created_at`, `start_date` or `total_price`, `-` prefix for descending.
    pub sort: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl BookingViewParams {
    pub fn page(&self) -> Page {
        Page::new(self.limit, self.offset)
    }

    pub fn filter(&self) -> Result<BookingFilter, AggregationError> {
        BookingFilter::parse(
            self.status.as_deref(),
            self.from,
            self.to,
            self.owner_id,
            self.traveler_id,
            self.sort.as_deref(),
        )
    }
}

/// `GET /properties/near` parameters.
#[derive(Debug, Deserialize)]
pub struct NearbyParams {
    pub lat: f64,
    pub lng: f64,
    pub radius_km: f64,
    #[serde(rename = "type")]
    pub property_type: Option<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub guests: Option<i32>,
}

impl NearbyParams {
    pub fn center(&self) -> GeoPoint {
        GeoPoint::new(self.lat, self.lng)
    }

    pub fn filter(&self) -> PropertyFilter {
        PropertyFilter {
            property_type: self.property_type.clone(),
            min_price: self.min_price,
            max_price: self.max_price,
            guests: self.guests,
        }
    }
}
