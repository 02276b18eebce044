//! Builders for common test records.

use chrono::{NaiveDate, TimeZone, Utc};
use serde_json::{json, Value};
use staybook_core::booking::{Booking, BookingStatus};
use staybook_core::geo::GeoPoint;
use staybook_core::property::Property;
use staybook_core::types::DbId;

/// A pending two-night booking in March 2026 referencing the given ids.
pub fn booking(id: DbId, traveler_id: DbId, owner_id: DbId, property_id: DbId) -> Booking {
    let start = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap() + chrono::Duration::days(id % 28);
    let created = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap() + chrono::Duration::hours(id);
    Booking {
        id,
        traveler_id,
        owner_id,
        property_id,
        start_date: start,
        end_date: start + chrono::Duration::days(2),
        guests: 2,
        total_price: 100.0 + id as f64,
        status: BookingStatus::Pending,
        created_at: created,
        updated_at: created,
    }
}

/// Traveler or owner document as stored by the user services.
pub fn person_doc(name: &str) -> Value {
    json!({
        "name": name,
        "email": format!("{}@example.com", name.to_lowercase()),
        "phone": "+351 900 000 000",
        "password_hash": "not-for-display",
    })
}

/// Property document as stored by the property service.
pub fn property_doc(name: &str, lat: f64, lng: f64) -> Value {
    json!({
        "name": name,
        "photos": ["https://img.example.com/1.jpg"],
        "location": { "city": "Lisbon", "country": "Portugal", "coordinates": { "lat": lat, "lng": lng } },
        "pricing": { "basePrice": 120, "currency": "EUR" },
        "internal_notes": "not-for-display",
    })
}

/// An apartment at the given coordinates.
pub fn property_at(id: DbId, lat: f64, lng: f64) -> Property {
    Property {
        id,
        owner_id: 1,
        name: format!("Property {id}"),
        property_type: "Apartment".to_string(),
        city: "Lisbon".to_string(),
        country: "Portugal".to_string(),
        location: Some(GeoPoint::new(lat, lng)),
        base_price: 100.0,
        max_guests: 4,
    }
}
