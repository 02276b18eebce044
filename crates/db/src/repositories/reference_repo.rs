//! Schema-agnostic reads of records owned by other services.
//!
//! Rows are returned as JSON documents via `to_jsonb`, so a column added,
//! renamed or dropped by the owning service never breaks these queries.

use serde_json::Value;
use sqlx::PgPool;
use staybook_core::entity::EntityKind;
use staybook_core::types::DbId;

/// Document expression per kind.
///
/// Properties store coordinates and price as flat columns; they are folded
/// into the nested `location` and `pricing` objects the property service
/// exposes. Missing columns read as JSON null rather than failing.
fn document_expr(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Traveler | EntityKind::Owner => "to_jsonb(t)",
        EntityKind::Property => {
            "to_jsonb(t) || jsonb_build_object( \
                'location', jsonb_build_object( \
                    'city', to_jsonb(t) -> 'city', \
                    'country', to_jsonb(t) -> 'country', \
                    'coordinates', jsonb_build_object( \
                        'lat', to_jsonb(t) -> 'location_lat', \
                        'lng', to_jsonb(t) -> 'location_lng')), \
                'pricing', jsonb_build_object( \
                    'base_price', to_jsonb(t) -> 'base_price'))"
        }
    }
}

pub struct ReferenceRepo;

impl ReferenceRepo {
    /// Fetch all listed ids of one kind in a single round-trip. Missing ids
    /// are absent from the result.
    pub async fn fetch_many(
        pool: &PgPool,
        kind: EntityKind,
        ids: &[DbId],
    ) -> Result<Vec<(DbId, Value)>, sqlx::Error> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let query = format!(
            "SELECT t.id, {} AS doc FROM {} t WHERE t.id = ANY($1)",
            document_expr(kind),
            kind.table_name()
        );
        sqlx::query_as::<_, (DbId, Value)>(&query)
            .bind(ids)
            .fetch_all(pool)
            .await
    }
}
