//! Rows of the geospatial index catalog (`geo_index_states`,
//! `geo_index_leases`) and of the PostgreSQL index catalog.

use sqlx::FromRow;
use staybook_core::error::StoreError;
use staybook_core::geo_index::{GeoIndexDescriptor, GeoIndexKind, IndexInfo, IndexState, Lease};
use staybook_core::types::Timestamp;

// ---------------------------------------------------------------------------
// geo_index_states
// ---------------------------------------------------------------------------

/// A row from the `geo_index_states` table.
#[derive(Debug, Clone, FromRow)]
pub struct GeoIndexStateRow {
    pub key_spec: String,
    pub index_name: String,
    pub index_kind: String,
    pub state: String,
    pub updated_at: Timestamp,
}

impl TryFrom<GeoIndexStateRow> for GeoIndexDescriptor {
    type Error = StoreError;

    fn try_from(row: GeoIndexStateRow) -> Result<Self, Self::Error> {
        let state = IndexState::parse(&row.state)
            .map_err(|e| StoreError::Corrupt(format!("state for {}: {e}", row.key_spec)))?;
        let index_kind = match row.index_kind.as_str() {
            "2dsphere" => GeoIndexKind::Sphere,
            other => {
                return Err(StoreError::Corrupt(format!(
                    "unknown index kind '{other}' for {}",
                    row.key_spec
                )))
            }
        };
        Ok(GeoIndexDescriptor {
            key_spec: row.key_spec,
            index_name: row.index_name,
            index_kind,
            state,
            updated_at: Some(row.updated_at),
        })
    }
}

// ---------------------------------------------------------------------------
// geo_index_leases
// ---------------------------------------------------------------------------

/// A row from the `geo_index_leases` table.
#[derive(Debug, Clone, FromRow)]
pub struct LeaseRow {
    pub key_spec: String,
    pub holder: String,
    pub acquired_at: Timestamp,
    pub expires_at: Timestamp,
}

impl From<LeaseRow> for Lease {
    fn from(row: LeaseRow) -> Self {
        Lease {
            key_spec: row.key_spec,
            holder: row.holder,
            acquired_at: row.acquired_at,
            expires_at: row.expires_at,
        }
    }
}

// ---------------------------------------------------------------------------
// pg_index
// ---------------------------------------------------------------------------

/// One physical index on a table, as reported by `pg_index`.
#[derive(Debug, Clone, FromRow)]
pub struct IndexInfoRow {
    pub name: String,
    pub definition: String,
    pub is_valid: bool,
}

impl From<IndexInfoRow> for IndexInfo {
    fn from(row: IndexInfoRow) -> Self {
        IndexInfo {
            name: row.name,
            definition: row.definition,
            is_valid: row.is_valid,
        }
    }
}
