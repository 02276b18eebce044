//! Location queries over the `properties` table.

use sqlx::PgPool;
use staybook_core::geo::{BoundingBox, GeoPoint, EARTH_RADIUS_KM};
use staybook_core::property::PropertyFilter;

use crate::models::property::{CreateProperty, PropertyRow};

/// Column list for location search.
const COLUMNS: &str = "id, owner_id, name, property_type, city, country, \
                       location_lat, location_lng, base_price, max_guests";

/// Attribute filters, bound as `$1..$4` in every search query.
const FILTER_CLAUSE: &str = "($1::TEXT IS NULL OR property_type = $1) \
                             AND ($2::FLOAT8 IS NULL OR base_price >= $2) \
                             AND ($3::FLOAT8 IS NULL OR base_price <= $3) \
                             AND ($4::INT IS NULL OR max_guests >= $4)";

pub struct PropertyRepo;

impl PropertyRepo {
    /// Insert a property (seeding and tests).
    pub async fn create(pool: &PgPool, input: &CreateProperty) -> Result<PropertyRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO properties \
                (owner_id, name, property_type, city, country, location_lat, location_lng, base_price, max_guests) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, PropertyRow>(&query)
            .bind(input.owner_id)
            .bind(&input.name)
            .bind(&input.property_type)
            .bind(&input.city)
            .bind(&input.country)
            .bind(input.location.map(|p| p.lat))
            .bind(input.location.map(|p| p.lng))
            .bind(input.base_price)
            .bind(input.max_guests)
            .fetch_one(pool)
            .await
    }

    /// Radius search shaped to hit the GiST index on
    /// `point(location_lng, location_lat)`: the box containment prunes via
    /// the index, the haversine predicate keeps only points on the sphere
    /// within `radius_km`.
    pub async fn within_radius(
        pool: &PgPool,
        center: GeoPoint,
        radius_km: f64,
        filter: &PropertyFilter,
    ) -> Result<Vec<PropertyRow>, sqlx::Error> {
        let bbox = BoundingBox::around(center, radius_km);
        let query = format!(
            "SELECT {COLUMNS} FROM properties \
             WHERE {FILTER_CLAUSE} \
               AND point(location_lng, location_lat) <@ box(point($5, $6), point($7, $8)) \
               AND 2 * {EARTH_RADIUS_KM} * asin(least(1, sqrt( \
                     power(sin(radians(location_lat - $9) / 2), 2) \
                     + cos(radians($9)) * cos(radians(location_lat)) \
                       * power(sin(radians(location_lng - $10) / 2), 2)))) <= $11 \
             ORDER BY id"
        );
        sqlx::query_as::<_, PropertyRow>(&query)
            .bind(&filter.property_type)
            .bind(filter.min_price)
            .bind(filter.max_price)
            .bind(filter.guests)
            .bind(bbox.min_lng)
            .bind(bbox.min_lat)
            .bind(bbox.max_lng)
            .bind(bbox.max_lat)
            .bind(center.lat)
            .bind(center.lng)
            .bind(radius_km)
            .fetch_all(pool)
            .await
    }

    /// Plain range scan on the coordinate columns. Needs no index; the
    /// caller filters by exact distance.
    pub async fn in_bounding_box(
        pool: &PgPool,
        bbox: &BoundingBox,
        filter: &PropertyFilter,
    ) -> Result<Vec<PropertyRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM properties \
             WHERE {FILTER_CLAUSE} \
               AND location_lat BETWEEN $5 AND $6 \
               AND location_lng BETWEEN $7 AND $8 \
             ORDER BY id"
        );
        sqlx::query_as::<_, PropertyRow>(&query)
            .bind(&filter.property_type)
            .bind(filter.min_price)
            .bind(filter.max_price)
            .bind(filter.guests)
            .bind(bbox.min_lat)
            .bind(bbox.max_lat)
            .bind(bbox.min_lng)
            .bind(bbox.max_lng)
            .fetch_all(pool)
            .await
    }

    /// Coordinates of the lowest-id located property, if any.
    pub async fn sample_location(pool: &PgPool) -> Result<Option<(f64, f64)>, sqlx::Error> {
        sqlx::query_as::<_, (f64, f64)>(
            "SELECT location_lat, location_lng FROM properties \
             WHERE location_lat IS NOT NULL AND location_lng IS NOT NULL \
             ORDER BY id LIMIT 1",
        )
        .fetch_optional(pool)
        .await
    }
}
