//! PostgreSQL persistence for the booking platform.
//!
//! Repositories are zero-sized structs taking `&PgPool`; [`stores`] wraps
//! them behind the store traits declared in `staybook-core`.

use sqlx::postgres::PgPoolOptions;
use staybook_core::error::StoreError;

pub mod models;
pub mod repositories;
pub mod stores;

pub type DbPool = sqlx::PgPool;

/// Default upper bound on pooled connections.
pub const DEFAULT_MAX_CONNECTIONS: u32 = 20;

/// Create a connection pool from a database URL.
pub async fn create_pool(database_url: &str, max_connections: u32) -> Result<DbPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
}

/// Round-trip a trivial query to confirm the database is reachable.
pub async fn health_check(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

/// Apply pending migrations from `crates/db/migrations`.
pub async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

/// Map a driver error onto the store taxonomy.
///
/// Everything reaching this point is an infrastructure fault: absent rows
/// are reported as `None`/missing map entries by the repositories, never as
/// `RowNotFound`.
pub fn store_error(err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::PoolTimedOut => StoreError::Timeout,
        other => StoreError::Unavailable(other.to_string()),
    }
}
