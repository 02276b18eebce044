//! Repository for the `bookings` table.

use sqlx::PgPool;
use staybook_core::booking::BookingFilter;
use staybook_core::types::DbId;

use crate::models::booking::{BookingRow, CreateBooking};

/// Column list for `bookings` queries.
const COLUMNS: &str = "id, traveler_id, owner_id, property_id, start_date, end_date, \
                       guests, total_price, status, created_at, updated_at";

/// Provides read access to bookings, plus inserts for seeding.
pub struct BookingRepo;

impl BookingRepo {
    /// Insert a booking, returning the created row.
    pub async fn create(pool: &PgPool, input: &CreateBooking) -> Result<BookingRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO bookings \
                (traveler_id, owner_id, property_id, start_date, end_date, guests, total_price, status) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, COALESCE($8, 'pending')) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, BookingRow>(&query)
            .bind(input.traveler_id)
            .bind(input.owner_id)
            .bind(input.property_id)
            .bind(input.start_date)
            .bind(input.end_date)
            .bind(input.guests)
            .bind(input.total_price)
            .bind(&input.status)
            .fetch_one(pool)
            .await
    }

    /// Find a booking by its internal ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<BookingRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM bookings WHERE id = $1");
        sqlx::query_as::<_, BookingRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// List bookings matching `filter`.
    ///
    /// Ordered by id unless the filter names a sort key, in which case id
    /// breaks ties so windows never overlap or skip rows. A stay matches a
    /// date range when `[start_date, end_date)` overlaps `[from, to]`.
    pub async fn list(
        pool: &PgPool,
        filter: &BookingFilter,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<BookingRow>, sqlx::Error> {
        let order_by = match filter.sort {
            Some(sort) => format!(
                "{} {}, id ASC",
                sort.key.column(),
                if sort.descending { "DESC" } else { "ASC" }
            ),
            None => "id ASC".to_string(),
        };
        // Legacy rows spell confirmed as accepted.
        let statuses: Option<Vec<&str>> = filter.status.map(|s| match s.as_str() {
            "confirmed" => vec!["confirmed", "accepted"],
            other => vec![other],
        });
        let query = format!(
            "SELECT {COLUMNS} FROM bookings \
             WHERE ($1::TEXT[] IS NULL OR status = ANY($1)) \
               AND ($2::DATE IS NULL OR end_date > $2) \
               AND ($3::DATE IS NULL OR start_date <= $3) \
               AND ($4::BIGINT IS NULL OR owner_id = $4) \
               AND ($5::BIGINT IS NULL OR traveler_id = $5) \
             ORDER BY {order_by} \
             LIMIT $6 OFFSET $7"
        );
        sqlx::query_as::<_, BookingRow>(&query)
            .bind(statuses)
            .bind(filter.date_range.from)
            .bind(filter.date_range.to)
            .bind(filter.owner_id)
            .bind(filter.traveler_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
    }
}
