//! PostgreSQL implementations of the `staybook-core` store traits.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use staybook_core::booking::{Booking, BookingFilter};
use staybook_core::entity::EntityKind;
use staybook_core::error::StoreError;
use staybook_core::geo::{BoundingBox, GeoPoint};
use staybook_core::geo_index::{
    GeoIndexDescriptor, GeoIndexSpec, IndexInfo, IndexState, Lease, LeaseAttempt,
};
use staybook_core::property::{Property, PropertyFilter};
use staybook_core::store::{
    BookingStore, EntityStore, IndexAdmin, IndexCatalog, PropertyStore, StoreHealth,
};
use staybook_core::types::DbId;

use crate::repositories::{
    BookingRepo, GeoIndexLeaseRepo, GeoIndexStateRepo, IndexAdminRepo, PropertyRepo,
    ReferenceRepo,
};
use crate::{store_error, DbPool};

/// Attempts to read the competing lease after losing an acquire race to a
/// holder that released in between.
const LEASE_ACQUIRE_ROUNDS: usize = 3;

/// All store seams backed by one connection pool.
#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

#[async_trait]
impl EntityStore for PgStore {
    async fn fetch_many(
        &self,
        kind: EntityKind,
        ids: &[DbId],
    ) -> Result<HashMap<DbId, serde_json::Value>, StoreError> {
        let rows = ReferenceRepo::fetch_many(&self.pool, kind, ids)
            .await
            .map_err(store_error)?;
        Ok(rows.into_iter().collect())
    }
}

#[async_trait]
impl BookingStore for PgStore {
    async fn find(&self, id: DbId) -> Result<Option<Booking>, StoreError> {
        BookingRepo::find_by_id(&self.pool, id)
            .await
            .map_err(store_error)?
            .map(Booking::try_from)
            .transpose()
    }

    async fn list(
        &self,
        filter: &BookingFilter,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<Booking>, StoreError> {
        BookingRepo::list(&self.pool, filter, offset, limit)
            .await
            .map_err(store_error)?
            .into_iter()
            .map(Booking::try_from)
            .collect()
    }
}

#[async_trait]
impl PropertyStore for PgStore {
    async fn query_within_radius(
        &self,
        index_name: &str,
        center: GeoPoint,
        radius_km: f64,
        filter: &PropertyFilter,
    ) -> Result<Vec<Property>, StoreError> {
        tracing::debug!(index_name, radius_km, "Running indexed radius query");
        let rows = PropertyRepo::within_radius(&self.pool, center, radius_km, filter)
            .await
            .map_err(store_error)?;
        Ok(rows.into_iter().map(Property::from).collect())
    }

    async fn query_bounding_box(
        &self,
        bbox: &BoundingBox,
        filter: &PropertyFilter,
    ) -> Result<Vec<Property>, StoreError> {
        let rows = PropertyRepo::in_bounding_box(&self.pool, bbox, filter)
            .await
            .map_err(store_error)?;
        Ok(rows.into_iter().map(Property::from).collect())
    }

    async fn sample_location(&self) -> Result<Option<GeoPoint>, StoreError> {
        let sample = PropertyRepo::sample_location(&self.pool)
            .await
            .map_err(store_error)?;
        Ok(sample.map(|(lat, lng)| GeoPoint::new(lat, lng)))
    }
}

#[async_trait]
impl IndexAdmin for PgStore {
    async fn create_index(&self, spec: &GeoIndexSpec) -> Result<(), StoreError> {
        IndexAdminRepo::create_gist_point_index(&self.pool, spec)
            .await
            .map_err(store_error)
    }

    async fn drop_index(&self, name: &str) -> Result<(), StoreError> {
        IndexAdminRepo::drop_index(&self.pool, name)
            .await
            .map_err(store_error)
    }

    async fn list_indexes(&self, collection: &str) -> Result<Vec<IndexInfo>, StoreError> {
        let rows = IndexAdminRepo::list_for_table(&self.pool, collection)
            .await
            .map_err(store_error)?;
        Ok(rows.into_iter().map(IndexInfo::from).collect())
    }
}

#[async_trait]
impl IndexCatalog for PgStore {
    async fn load_state(&self, spec: &GeoIndexSpec) -> Result<GeoIndexDescriptor, StoreError> {
        match GeoIndexStateRepo::find(&self.pool, &spec.key_spec())
            .await
            .map_err(store_error)?
        {
            Some(row) => GeoIndexDescriptor::try_from(row),
            None => Ok(GeoIndexDescriptor::absent(spec)),
        }
    }

    async fn transition_state(
        &self,
        spec: &GeoIndexSpec,
        from: IndexState,
        to: IndexState,
    ) -> Result<bool, StoreError> {
        GeoIndexStateRepo::transition(&self.pool, spec, from, to)
            .await
            .map_err(store_error)
    }

    async fn try_acquire_lease(
        &self,
        key_spec: &str,
        holder: &str,
        ttl: Duration,
    ) -> Result<LeaseAttempt, StoreError> {
        for _ in 0..LEASE_ACQUIRE_ROUNDS {
            if let Some(row) =
                GeoIndexLeaseRepo::try_acquire(&self.pool, key_spec, holder, ttl.as_secs_f64())
                    .await
                    .map_err(store_error)?
            {
                return Ok(LeaseAttempt::Acquired(row.into()));
            }
            if let Some(row) = GeoIndexLeaseRepo::find_active(&self.pool, key_spec)
                .await
                .map_err(store_error)?
            {
                return Ok(LeaseAttempt::Held(row.into()));
            }
        }
        Err(StoreError::Unavailable(format!(
            "lease for {key_spec} changed hands {LEASE_ACQUIRE_ROUNDS} times during acquisition"
        )))
    }

    async fn renew_lease(&self, key_spec: &str, holder: &str, ttl: Duration) -> Result<bool, StoreError> {
        GeoIndexLeaseRepo::renew(&self.pool, key_spec, holder, ttl.as_secs_f64())
            .await
            .map_err(store_error)
    }

    async fn release_lease(&self, key_spec: &str, holder: &str) -> Result<bool, StoreError> {
        GeoIndexLeaseRepo::release(&self.pool, key_spec, holder)
            .await
            .map_err(store_error)
    }

    async fn current_lease(&self, key_spec: &str) -> Result<Option<Lease>, StoreError> {
        let row = GeoIndexLeaseRepo::find_active(&self.pool, key_spec)
            .await
            .map_err(store_error)?;
        Ok(row.map(Lease::from))
    }

    async fn purge_expired_leases(&self) -> Result<u64, StoreError> {
        GeoIndexLeaseRepo::purge_expired(&self.pool)
            .await
            .map_err(store_error)
    }
}

#[async_trait]
impl StoreHealth for PgStore {
    async fn ping(&self) -> Result<(), StoreError> {
        crate::health_check(&self.pool).await.map_err(store_error)
    }
}
