//! In-memory foreign entity store with per-kind call log and fault injection.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use staybook_core::entity::EntityKind;
use staybook_core::error::StoreError;
use staybook_core::store::EntityStore;
use staybook_core::types::DbId;

#[derive(Debug, Default)]
struct Inner {
    records: RwLock<HashMap<(EntityKind, DbId), Value>>,
    calls: Mutex<Vec<(EntityKind, Vec<DbId>)>>,
    pending_failures: Mutex<HashMap<EntityKind, u32>>,
    latency: Mutex<Option<Duration>>,
}

/// Traveler, owner and property documents keyed by kind and id.
#[derive(Clone, Debug, Default)]
pub struct InMemoryEntityStore {
    inner: Arc<Inner>,
}

impl InMemoryEntityStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, kind: EntityKind, id: DbId, document: Value) {
        self.inner.records.write().unwrap().insert((kind, id), document);
    }

    /// Simulate the owning service deleting the entity.
    pub fn remove(&self, kind: EntityKind, id: DbId) {
        self.inner.records.write().unwrap().remove(&(kind, id));
    }

    /// Make the next `n` lookups of `kind` fail with `Unavailable`.
    /// `u32::MAX` keeps the kind down for the rest of the test.
    pub fn fail_next(&self, kind: EntityKind, n: u32) {
        self.inner.pending_failures.lock().unwrap().insert(kind, n);
    }

    /// Delay every lookup, to exercise cancellation.
    pub fn set_latency(&self, latency: Duration) {
        *self.inner.latency.lock().unwrap() = Some(latency);
    }

    /// Every lookup so far, in call order.
    #[must_use]
    pub fn calls(&self) -> Vec<(EntityKind, Vec<DbId>)> {
        self.inner.calls.lock().unwrap().clone()
    }

    #[must_use]
    pub fn call_count(&self, kind: EntityKind) -> usize {
        self.inner
            .calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(k, _)| *k == kind)
            .count()
    }

    #[must_use]
    pub fn total_calls(&self) -> usize {
        self.inner.calls.lock().unwrap().len()
    }

    pub fn reset_calls(&self) {
        self.inner.calls.lock().unwrap().clear();
    }

    fn take_failure(&self, kind: EntityKind) -> bool {
        let mut failures = self.inner.pending_failures.lock().unwrap();
        match failures.get_mut(&kind) {
            Some(0) | None => false,
            Some(n) => {
                if *n != u32::MAX {
                    *n -= 1;
                }
                true
            }
        }
    }
}

#[async_trait]
impl EntityStore for InMemoryEntityStore {
    async fn fetch_many(
        &self,
        kind: EntityKind,
        ids: &[DbId],
    ) -> Result<HashMap<DbId, Value>, StoreError> {
        self.inner.calls.lock().unwrap().push((kind, ids.to_vec()));

        let latency = *self.inner.latency.lock().unwrap();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        if self.take_failure(kind) {
            return Err(StoreError::Unavailable(format!("{kind} store is down")));
        }

        let records = self.inner.records.read().unwrap();
        Ok(ids
            .iter()
            .filter_map(|id| records.get(&(kind, *id)).map(|doc| (*id, doc.clone())))
            .collect())
    }
}
