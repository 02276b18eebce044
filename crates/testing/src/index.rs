//! In-memory index catalog (states + leases) and index administration.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use staybook_core::error::StoreError;
use staybook_core::geo_index::{
    GeoIndexDescriptor, GeoIndexSpec, IndexInfo, IndexState, Lease, LeaseAttempt,
};
use staybook_core::store::{IndexAdmin, IndexCatalog};
use staybook_core::types::Timestamp;

fn injected(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

fn expiry(ttl: Duration) -> Timestamp {
    Utc::now() + chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::days(365))
}

// ---------------------------------------------------------------------------
// InMemoryIndexCatalog
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct CatalogInner {
    states: Mutex<HashMap<String, GeoIndexDescriptor>>,
    leases: Mutex<HashMap<String, Lease>>,
    transitions: Mutex<Vec<(IndexState, IndexState)>>,
    state_read_failures: AtomicU32,
    failing_transition: Mutex<Option<IndexState>>,
}

/// Index states and leases with wall-clock expiry.
#[derive(Clone, Debug, Default)]
pub struct InMemoryIndexCatalog {
    inner: Arc<CatalogInner>,
}

impl InMemoryIndexCatalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Force a state, e.g. to simulate a process that crashed mid-build.
    pub fn set_state(&self, spec: &GeoIndexSpec, state: IndexState) {
        let descriptor = GeoIndexDescriptor {
            state,
            updated_at: Some(Utc::now()),
            ..GeoIndexDescriptor::absent(spec)
        };
        self.inner
            .states
            .lock()
            .unwrap()
            .insert(spec.key_spec(), descriptor);
    }

    #[must_use]
    pub fn state(&self, spec: &GeoIndexSpec) -> IndexState {
        self.inner
            .states
            .lock()
            .unwrap()
            .get(&spec.key_spec())
            .map_or(IndexState::Absent, |d| d.state)
    }

    /// Install a lease directly, bypassing acquisition.
    pub fn plant_lease(&self, key_spec: &str, holder: &str, expires_at: Timestamp) {
        let lease = Lease {
            key_spec: key_spec.to_string(),
            holder: holder.to_string(),
            acquired_at: Utc::now(),
            expires_at,
        };
        self.inner
            .leases
            .lock()
            .unwrap()
            .insert(key_spec.to_string(), lease);
    }

    /// The stored lease record, expired or not.
    #[must_use]
    pub fn lease_record(&self, key_spec: &str) -> Option<Lease> {
        self.inner.leases.lock().unwrap().get(key_spec).cloned()
    }

    /// Every successful state transition, in order.
    #[must_use]
    pub fn transitions(&self) -> Vec<(IndexState, IndexState)> {
        self.inner.transitions.lock().unwrap().clone()
    }

    /// Make the next `n` state reads fail with `Unavailable`.
    pub fn fail_state_reads(&self, n: u32) {
        self.inner.state_read_failures.store(n, Ordering::SeqCst);
    }

    /// Make the next transition into `to` fail with `Unavailable`.
    pub fn fail_next_transition_to(&self, to: IndexState) {
        *self.inner.failing_transition.lock().unwrap() = Some(to);
    }
}

#[async_trait]
impl IndexCatalog for InMemoryIndexCatalog {
    async fn load_state(&self, spec: &GeoIndexSpec) -> Result<GeoIndexDescriptor, StoreError> {
        if injected(&self.inner.state_read_failures) {
            return Err(StoreError::Unavailable("index catalog is down".to_string()));
        }
        Ok(self
            .inner
            .states
            .lock()
            .unwrap()
            .get(&spec.key_spec())
            .cloned()
            .unwrap_or_else(|| GeoIndexDescriptor::absent(spec)))
    }

    async fn transition_state(
        &self,
        spec: &GeoIndexSpec,
        from: IndexState,
        to: IndexState,
    ) -> Result<bool, StoreError> {
        {
            let mut failing = self.inner.failing_transition.lock().unwrap();
            if *failing == Some(to) {
                *failing = None;
                return Err(StoreError::Unavailable(format!("transition to {to} failed")));
            }
        }
        let mut states = self.inner.states.lock().unwrap();
        let current = states
            .get(&spec.key_spec())
            .map_or(IndexState::Absent, |d| d.state);
        if current != from {
            return Ok(false);
        }
        states.insert(
            spec.key_spec(),
            GeoIndexDescriptor {
                state: to,
                updated_at: Some(Utc::now()),
                ..GeoIndexDescriptor::absent(spec)
            },
        );
        self.inner.transitions.lock().unwrap().push((from, to));
        Ok(true)
    }

    async fn try_acquire_lease(
        &self,
        key_spec: &str,
        holder: &str,
        ttl: Duration,
    ) -> Result<LeaseAttempt, StoreError> {
        let mut leases = self.inner.leases.lock().unwrap();
        let now = Utc::now();
        if let Some(existing) = leases.get(key_spec) {
            if !existing.is_expired_at(now) {
                return Ok(LeaseAttempt::Held(existing.clone()));
            }
        }
        let lease = Lease {
            key_spec: key_spec.to_string(),
            holder: holder.to_string(),
            acquired_at: now,
            expires_at: expiry(ttl),
        };
        leases.insert(key_spec.to_string(), lease.clone());
        Ok(LeaseAttempt::Acquired(lease))
    }

    async fn renew_lease(&self, key_spec: &str, holder: &str, ttl: Duration) -> Result<bool, StoreError> {
        let mut leases = self.inner.leases.lock().unwrap();
        match leases.get_mut(key_spec) {
            Some(lease) if lease.holder == holder => {
                lease.expires_at = expiry(ttl);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release_lease(&self, key_spec: &str, holder: &str) -> Result<bool, StoreError> {
        let mut leases = self.inner.leases.lock().unwrap();
        if leases.get(key_spec).is_some_and(|l| l.holder == holder) {
            leases.remove(key_spec);
            return Ok(true);
        }
        Ok(false)
    }

    async fn current_lease(&self, key_spec: &str) -> Result<Option<Lease>, StoreError> {
        let now = Utc::now();
        Ok(self
            .inner
            .leases
            .lock()
            .unwrap()
            .get(key_spec)
            .filter(|l| !l.is_expired_at(now))
            .cloned())
    }

    async fn purge_expired_leases(&self) -> Result<u64, StoreError> {
        let now = Utc::now();
        let mut leases = self.inner.leases.lock().unwrap();
        let before = leases.len();
        leases.retain(|_, l| !l.is_expired_at(now));
        Ok((before - leases.len()) as u64)
    }
}

// ---------------------------------------------------------------------------
// InMemoryIndexAdmin
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct AdminInner {
    /// `(collection, index)` pairs.
    indexes: Mutex<Vec<(String, IndexInfo)>>,
    create_calls: AtomicUsize,
    drop_calls: AtomicUsize,
    build_delay: Mutex<Option<Duration>>,
    create_failures: AtomicU32,
    drop_failures: AtomicU32,
    build_invalid: AtomicBool,
}

/// Physical indexes, with a configurable build time and failure modes.
#[derive(Clone, Debug, Default)]
pub struct InMemoryIndexAdmin {
    inner: Arc<AdminInner>,
}

impl InMemoryIndexAdmin {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// How long each `create_index` call takes.
    pub fn set_build_delay(&self, delay: Duration) {
        *self.inner.build_delay.lock().unwrap() = Some(delay);
    }

    /// Make the next `n` builds fail.
    pub fn fail_next_creates(&self, n: u32) {
        self.inner.create_failures.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` drops fail.
    pub fn fail_next_drops(&self, n: u32) {
        self.inner.drop_failures.store(n, Ordering::SeqCst);
    }

    /// Builds succeed but leave an invalid index, like an interrupted
    /// concurrent build.
    pub fn build_invalid_indexes(&self, invalid: bool) {
        self.inner.build_invalid.store(invalid, Ordering::SeqCst);
    }

    /// Add an index directly, e.g. one left behind by a crashed process.
    pub fn plant_index(&self, collection: &str, name: &str, is_valid: bool) {
        self.inner.indexes.lock().unwrap().push((
            collection.to_string(),
            IndexInfo {
                name: name.to_string(),
                definition: format!("CREATE INDEX {name} ON {collection} USING gist"),
                is_valid,
            },
        ));
    }

    #[must_use]
    pub fn create_calls(&self) -> usize {
        self.inner.create_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn drop_calls(&self) -> usize {
        self.inner.drop_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn has_index(&self, name: &str) -> bool {
        self.inner
            .indexes
            .lock()
            .unwrap()
            .iter()
            .any(|(_, i)| i.name == name)
    }

    #[must_use]
    pub fn has_valid_index(&self, name: &str) -> bool {
        self.inner
            .indexes
            .lock()
            .unwrap()
            .iter()
            .any(|(_, i)| i.name == name && i.is_valid)
    }
}

#[async_trait]
impl IndexAdmin for InMemoryIndexAdmin {
    async fn create_index(&self, spec: &GeoIndexSpec) -> Result<(), StoreError> {
        self.inner.create_calls.fetch_add(1, Ordering::SeqCst);

        let delay = *self.inner.build_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if injected(&self.inner.create_failures) {
            return Err(StoreError::Unavailable(format!(
                "build of {} was interrupted",
                spec.index_name()
            )));
        }

        let name = spec.index_name();
        let mut indexes = self.inner.indexes.lock().unwrap();
        if indexes.iter().any(|(_, i)| i.name == name) {
            return Ok(());
        }
        indexes.push((
            spec.collection().to_string(),
            IndexInfo {
                definition: format!(
                    "CREATE INDEX {name} ON {} USING gist (point({}, {}))",
                    spec.collection(),
                    spec.lng_column(),
                    spec.lat_column()
                ),
                name,
                is_valid: !self.inner.build_invalid.load(Ordering::SeqCst),
            },
        ));
        Ok(())
    }

    async fn drop_index(&self, name: &str) -> Result<(), StoreError> {
        self.inner.drop_calls.fetch_add(1, Ordering::SeqCst);
        if injected(&self.inner.drop_failures) {
            return Err(StoreError::Unavailable(format!("drop of {name} failed")));
        }
        self.inner
            .indexes
            .lock()
            .unwrap()
            .retain(|(_, i)| i.name != name);
        Ok(())
    }

    async fn list_indexes(&self, collection: &str) -> Result<Vec<IndexInfo>, StoreError> {
        Ok(self
            .inner
            .indexes
            .lock()
            .unwrap()
            .iter()
            .filter(|(c, _)| c == collection)
            .map(|(_, i)| i.clone())
            .collect())
    }
}
