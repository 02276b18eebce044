//! Repositories for the geospatial index catalog and for physical index DDL.

use sqlx::PgPool;
use staybook_core::geo_index::{GeoIndexSpec, IndexState};

use crate::models::geo_index::{GeoIndexStateRow, IndexInfoRow, LeaseRow};

// ---------------------------------------------------------------------------
// GeoIndexStateRepo
// ---------------------------------------------------------------------------

/// Column list for `geo_index_states` queries.
const STATE_COLUMNS: &str = "key_spec, index_name, index_kind, state, updated_at";

/// Persisted lifecycle state per index key specification.
pub struct GeoIndexStateRepo;

impl GeoIndexStateRepo {
    pub async fn find(pool: &PgPool, key_spec: &str) -> Result<Option<GeoIndexStateRow>, sqlx::Error> {
        let query = format!("SELECT {STATE_COLUMNS} FROM geo_index_states WHERE key_spec = $1");
        sqlx::query_as::<_, GeoIndexStateRow>(&query)
            .bind(key_spec)
            .fetch_optional(pool)
            .await
    }

    /// Compare-and-set the state of `spec` from `from` to `to`.
    ///
    /// A missing row counts as `absent`, so leaving `absent` upserts while
    /// every other transition is a conditional update. Returns `true` if the
    /// row was written.
    pub async fn transition(
        pool: &PgPool,
        spec: &GeoIndexSpec,
        from: IndexState,
        to: IndexState,
    ) -> Result<bool, sqlx::Error> {
        let result = if from == IndexState::Absent {
            sqlx::query(
                "INSERT INTO geo_index_states (key_spec, index_name, index_kind, state, updated_at) \
                 VALUES ($1, $2, $3, $5, NOW()) \
                 ON CONFLICT (key_spec) DO UPDATE \
                    SET state = EXCLUDED.state, updated_at = NOW() \
                 WHERE geo_index_states.state = $4",
            )
            .bind(spec.key_spec())
            .bind(spec.index_name())
            .bind(spec.kind().as_str())
            .bind(from.as_str())
            .bind(to.as_str())
            .execute(pool)
            .await?
        } else {
            sqlx::query(
                "UPDATE geo_index_states SET state = $3, updated_at = NOW() \
                 WHERE key_spec = $1 AND state = $2",
            )
            .bind(spec.key_spec())
            .bind(from.as_str())
            .bind(to.as_str())
            .execute(pool)
            .await?
        };
        Ok(result.rows_affected() > 0)
    }
}

// ---------------------------------------------------------------------------
// GeoIndexLeaseRepo
// ---------------------------------------------------------------------------

/// Column list for `geo_index_leases` queries.
const LEASE_COLUMNS: &str = "key_spec, holder, acquired_at, expires_at";

/// Expiring exclusive leases over index key specifications.
pub struct GeoIndexLeaseRepo;

impl GeoIndexLeaseRepo {
    /// Take the lease if it is free or expired.
    ///
    /// Uses `INSERT ... ON CONFLICT DO UPDATE ... WHERE expires_at < NOW()`,
    /// so at most one caller wins. Returns `None` if an unexpired lease is
    /// held by someone else.
    pub async fn try_acquire(
        pool: &PgPool,
        key_spec: &str,
        holder: &str,
        ttl_secs: f64,
    ) -> Result<Option<LeaseRow>, sqlx::Error> {
        let query = format!(
            "INSERT INTO geo_index_leases (key_spec, holder, acquired_at, expires_at) \
             VALUES ($1, $2, NOW(), NOW() + make_interval(secs => $3)) \
             ON CONFLICT (key_spec) DO UPDATE \
                SET holder = EXCLUDED.holder, \
                    acquired_at = EXCLUDED.acquired_at, \
                    expires_at = EXCLUDED.expires_at \
             WHERE geo_index_leases.expires_at < NOW() \
             RETURNING {LEASE_COLUMNS}"
        );
        sqlx::query_as::<_, LeaseRow>(&query)
            .bind(key_spec)
            .bind(holder)
            .bind(ttl_secs)
            .fetch_optional(pool)
            .await
    }

    /// Extend a lease. Only the holder can renew.
    pub async fn renew(
        pool: &PgPool,
        key_spec: &str,
        holder: &str,
        ttl_secs: f64,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE geo_index_leases SET expires_at = NOW() + make_interval(secs => $3) \
             WHERE key_spec = $1 AND holder = $2",
        )
        .bind(key_spec)
        .bind(holder)
        .bind(ttl_secs)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Release a lease. Only the holder can release.
    pub async fn release(pool: &PgPool, key_spec: &str, holder: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM geo_index_leases WHERE key_spec = $1 AND holder = $2")
            .bind(key_spec)
            .bind(holder)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// The unexpired lease for `key_spec`, if any.
    pub async fn find_active(pool: &PgPool, key_spec: &str) -> Result<Option<LeaseRow>, sqlx::Error> {
        let query = format!(
            "SELECT {LEASE_COLUMNS} FROM geo_index_leases \
             WHERE key_spec = $1 AND expires_at >= NOW()"
        );
        sqlx::query_as::<_, LeaseRow>(&query)
            .bind(key_spec)
            .fetch_optional(pool)
            .await
    }

    /// Delete expired leases. Returns the number removed.
    pub async fn purge_expired(pool: &PgPool) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM geo_index_leases WHERE expires_at < NOW()")
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}

// ---------------------------------------------------------------------------
// IndexAdminRepo
// ---------------------------------------------------------------------------

/// Quote an identifier for interpolation into DDL.
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Physical index DDL and introspection.
pub struct IndexAdminRepo;

impl IndexAdminRepo {
    /// Build the GiST expression index for `spec` without locking out
    /// writers. `CONCURRENTLY` cannot run inside a transaction, hence the
    /// simple-query protocol.
    ///
    /// A failed concurrent build leaves an invalid index behind; callers
    /// detect it through [`IndexAdminRepo::list_for_table`] and drop it.
    pub async fn create_gist_point_index(pool: &PgPool, spec: &GeoIndexSpec) -> Result<(), sqlx::Error> {
        let sql = format!(
            "CREATE INDEX CONCURRENTLY IF NOT EXISTS {} ON {} USING gist (point({}, {}))",
            quote_ident(&spec.index_name()),
            quote_ident(spec.collection()),
            quote_ident(&spec.lng_column()),
            quote_ident(&spec.lat_column()),
        );
        sqlx::raw_sql(&sql).execute(pool).await?;
        Ok(())
    }

    pub async fn drop_index(pool: &PgPool, name: &str) -> Result<(), sqlx::Error> {
        let sql = format!("DROP INDEX CONCURRENTLY IF EXISTS {}", quote_ident(name));
        sqlx::raw_sql(&sql).execute(pool).await?;
        Ok(())
    }

    /// Indexes on `table` in the current schema, including invalid ones.
    pub async fn list_for_table(pool: &PgPool, table: &str) -> Result<Vec<IndexInfoRow>, sqlx::Error> {
        sqlx::query_as::<_, IndexInfoRow>(
            "SELECT ic.relname::TEXT AS name, \
                    pg_get_indexdef(i.indexrelid) AS definition, \
                    i.indisvalid AS is_valid \
             FROM pg_index i \
             JOIN pg_class ic ON ic.oid = i.indexrelid \
             JOIN pg_class tc ON tc.oid = i.indrelid \
             JOIN pg_namespace n ON n.oid = tc.relnamespace \
             WHERE tc.relname = $1 AND n.nspname = current_schema() \
             ORDER BY ic.relname",
        )
        .bind(table)
        .fetch_all(pool)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers_are_quoted() {
        assert_eq!(quote_ident("idx_a"), "\"idx_a\"");
        assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
    }
}
