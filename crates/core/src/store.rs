//! Store seams.
//!
//! Every read or write the engine performs goes through one of these
//! traits. `staybook-db` implements them on PostgreSQL; `staybook-testing`
//! provides in-memory versions with fault injection.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;

use crate::booking::{Booking, BookingFilter};
use crate::entity::EntityKind;
use crate::error::StoreError;
use crate::geo::{BoundingBox, GeoPoint};
use crate::geo_index::{GeoIndexDescriptor, GeoIndexSpec, IndexInfo, IndexState, Lease, LeaseAttempt};
use crate::property::{Property, PropertyFilter};
use crate::types::DbId;

/// Batched, read-only lookup into another service's records.
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Fetch every listed id of one kind in a single query. Ids that no
    /// longer exist are simply absent from the returned map.
    async fn fetch_many(
        &self,
        kind: EntityKind,
        ids: &[DbId],
    ) -> Result<HashMap<DbId, serde_json::Value>, StoreError>;
}

/// The booking service's own records.
#[async_trait]
pub trait BookingStore: Send + Sync {
    async fn find(&self, id: DbId) -> Result<Option<Booking>, StoreError>;

    /// One window of bookings matching `filter`, in natural (id) order
    /// unless the filter requests a sort key.
    async fn list(
        &self,
        filter: &BookingFilter,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<Booking>, StoreError>;
}

/// Location queries over properties.
#[async_trait]
pub trait PropertyStore: Send + Sync {
    /// Radius query meant to be served by the named geospatial index.
    /// Returns only properties within `radius_km`.
    async fn query_within_radius(
        &self,
        index_name: &str,
        center: GeoPoint,
        radius_km: f64,
        filter: &PropertyFilter,
    ) -> Result<Vec<Property>, StoreError>;

    /// Index-free scan of properties whose coordinates fall in `bbox`.
    async fn query_bounding_box(
        &self,
        bbox: &BoundingBox,
        filter: &PropertyFilter,
    ) -> Result<Vec<Property>, StoreError>;

    /// Coordinates of some existing property, used as a verification probe.
    async fn sample_location(&self) -> Result<Option<GeoPoint>, StoreError>;
}

/// Index administration on the underlying store.
#[async_trait]
pub trait IndexAdmin: Send + Sync {
    /// Build the index without blocking reads or writes on the collection.
    async fn create_index(&self, spec: &GeoIndexSpec) -> Result<(), StoreError>;

    /// Drop the named index if present.
    async fn drop_index(&self, name: &str) -> Result<(), StoreError>;

    async fn list_indexes(&self, collection: &str) -> Result<Vec<IndexInfo>, StoreError>;
}

/// Persisted index states and leases, kept apart from application data.
#[async_trait]
pub trait IndexCatalog: Send + Sync {
    /// Current descriptor; `absent` when no record exists.
    async fn load_state(&self, spec: &GeoIndexSpec) -> Result<GeoIndexDescriptor, StoreError>;

    /// Compare-and-set the state. Returns `false` if the stored state was
    /// not `from`.
    async fn transition_state(
        &self,
        spec: &GeoIndexSpec,
        from: IndexState,
        to: IndexState,
    ) -> Result<bool, StoreError>;

    /// Take the lease unless someone else holds an unexpired one.
    async fn try_acquire_lease(
        &self,
        key_spec: &str,
        holder: &str,
        ttl: Duration,
    ) -> Result<LeaseAttempt, StoreError>;

    /// Push the expiry forward. `false` if `holder` no longer holds it.
    async fn renew_lease(&self, key_spec: &str, holder: &str, ttl: Duration) -> Result<bool, StoreError>;

    /// `false` if `holder` did not hold the lease.
    async fn release_lease(&self, key_spec: &str, holder: &str) -> Result<bool, StoreError>;

    /// The unexpired lease, if any.
    async fn current_lease(&self, key_spec: &str) -> Result<Option<Lease>, StoreError>;

    /// Delete expired lease records. Returns how many were removed.
    async fn purge_expired_leases(&self) -> Result<u64, StoreError>;
}

/// Liveness probe for the shared store.
#[async_trait]
pub trait StoreHealth: Send + Sync {
    async fn ping(&self) -> Result<(), StoreError>;
}
