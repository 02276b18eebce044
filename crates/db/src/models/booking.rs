//! Booking rows (`bookings` table).

use serde::Deserialize;
use sqlx::FromRow;
use staybook_core::booking::{validate_stay_dates, Booking, BookingStatus};
use staybook_core::error::StoreError;
use staybook_core::types::{DbId, StayDate, Timestamp};

/// A row from the `bookings` table.
#[derive(Debug, Clone, FromRow)]
pub struct BookingRow {
    pub id: DbId,
    pub traveler_id: DbId,
    pub owner_id: DbId,
    pub property_id: DbId,
    pub start_date: StayDate,
    pub end_date: StayDate,
    pub guests: i32,
    pub total_price: f64,
    pub status: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Rows with an unknown status or an empty stay are rejected as corrupt.
impl TryFrom<BookingRow> for Booking {
    type Error = StoreError;

    fn try_from(row: BookingRow) -> Result<Self, Self::Error> {
        let status = BookingStatus::parse(&row.status)
            .map_err(|e| StoreError::Corrupt(format!("booking {}: {e}", row.id)))?;
        validate_stay_dates(row.start_date, row.end_date)
            .map_err(|e| StoreError::Corrupt(format!("booking {}: {e}", row.id)))?;
        Ok(Booking {
            id: row.id,
            traveler_id: row.traveler_id,
            owner_id: row.owner_id,
            property_id: row.property_id,
            start_date: row.start_date,
            end_date: row.end_date,
            guests: row.guests,
            total_price: row.total_price,
            status,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// DTO for inserting a booking. Used by seeding and tests; bookings are
/// otherwise created by the booking service's write path.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateBooking {
    pub traveler_id: DbId,
    pub owner_id: DbId,
    pub property_id: DbId,
    pub start_date: StayDate,
    pub end_date: StayDate,
    pub guests: i32,
    pub total_price: f64,
    pub status: Option<String>,
}
