//! In-memory property store.
//!
//! Radius queries are brute force. When linked to an
//! [`InMemoryIndexAdmin`], an indexed query fails unless the named index
//! physically exists and is valid, the way a hinted query would.

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use staybook_core::error::StoreError;
use staybook_core::geo::{BoundingBox, GeoPoint};
use staybook_core::property::{Property, PropertyFilter};
use staybook_core::store::PropertyStore;

use crate::index::InMemoryIndexAdmin;

#[derive(Debug, Default)]
struct Inner {
    properties: RwLock<Vec<Property>>,
    indexed_calls: AtomicUsize,
    fallback_calls: AtomicUsize,
    indexed_failures: AtomicU32,
    admin: RwLock<Option<InMemoryIndexAdmin>>,
}

#[derive(Clone, Debug, Default)]
pub struct InMemoryPropertyStore {
    inner: Arc<Inner>,
}

impl InMemoryPropertyStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, property: Property) {
        let mut properties = self.inner.properties.write().unwrap();
        properties.retain(|p| p.id != property.id);
        properties.push(property);
        properties.sort_by_key(|p| p.id);
    }

    /// Require a physical index for indexed queries.
    pub fn link_index_admin(&self, admin: InMemoryIndexAdmin) {
        *self.inner.admin.write().unwrap() = Some(admin);
    }

    /// Make the next `n` indexed queries fail.
    pub fn fail_indexed_queries(&self, n: u32) {
        self.inner.indexed_failures.store(n, Ordering::SeqCst);
    }

    #[must_use]
    pub fn indexed_calls(&self) -> usize {
        self.inner.indexed_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn fallback_calls(&self) -> usize {
        self.inner.fallback_calls.load(Ordering::SeqCst)
    }

    fn matching(&self, filter: &PropertyFilter, keep: impl Fn(GeoPoint) -> bool) -> Vec<Property> {
        self.inner
            .properties
            .read()
            .unwrap()
            .iter()
            .filter(|p| filter.matches(p) && p.location.is_some_and(&keep))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl PropertyStore for InMemoryPropertyStore {
    async fn query_within_radius(
        &self,
        index_name: &str,
        center: GeoPoint,
        radius_km: f64,
        filter: &PropertyFilter,
    ) -> Result<Vec<Property>, StoreError> {
        self.inner.indexed_calls.fetch_add(1, Ordering::SeqCst);

        let injected = self
            .inner
            .indexed_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(StoreError::Unavailable("indexed query failed".to_string()));
        }

        let index_missing = self
            .inner
            .admin
            .read()
            .unwrap()
            .as_ref()
            .is_some_and(|admin| !admin.has_valid_index(index_name));
        if index_missing {
            return Err(StoreError::Unavailable(format!(
                "index {index_name} does not exist"
            )));
        }

        Ok(self.matching(filter, |p| center.distance_km(&p) <= radius_km))
    }

    async fn query_bounding_box(
        &self,
        bbox: &BoundingBox,
        filter: &PropertyFilter,
    ) -> Result<Vec<Property>, StoreError> {
        self.inner.fallback_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.matching(filter, |p| bbox.contains(p)))
    }

    async fn sample_location(&self) -> Result<Option<GeoPoint>, StoreError> {
        Ok(self
            .inner
            .properties
            .read()
            .unwrap()
            .iter()
            .find_map(|p| p.location))
    }
}
