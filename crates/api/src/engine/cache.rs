//! Bounded TTL cache of resolved reference records.
//!
//! Only successful resolutions are cached, so a deleted entity is noticed
//! no later than one TTL after the deletion.

use std::collections::HashMap;
use std::time::Duration;

use staybook_core::entity::ForeignEntityRef;
use staybook_core::reference::ReferenceRecord;
use tokio::sync::RwLock;
use tokio::time::Instant;

struct CacheEntry {
    record: ReferenceRecord,
    inserted_at: Instant,
}

pub struct ResolutionCache {
    ttl: Duration,
    capacity: usize,
    entries: RwLock<HashMap<ForeignEntityRef, CacheEntry>>,
}

impl ResolutionCache {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            ttl,
            capacity: capacity.max(1),
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// A fresh record for `entity_ref`, if cached.
    pub async fn get(&self, entity_ref: &ForeignEntityRef) -> Option<ReferenceRecord> {
        let entries = self.entries.read().await;
        entries
            .get(entity_ref)
            .filter(|e| e.inserted_at.elapsed() < self.ttl)
            .map(|e| e.record.clone())
    }

    /// Cache `record`, evicting expired entries first and then the oldest
    /// one when at capacity.
    pub async fn insert(&self, record: ReferenceRecord) {
        let mut entries = self.entries.write().await;
        let key = record.entity_ref();

        if !entries.contains_key(&key) && entries.len() >= self.capacity {
            let ttl = self.ttl;
            entries.retain(|_, e| e.inserted_at.elapsed() < ttl);
            if entries.len() >= self.capacity {
                if let Some(oldest) = entries
                    .iter()
                    .min_by_key(|(_, e)| e.inserted_at)
                    .map(|(k, _)| *k)
                {
                    entries.remove(&oldest);
                }
            }
        }

        entries.insert(
            key,
            CacheEntry {
                record,
                inserted_at: Instant::now(),
            },
        );
    }

    #[cfg(test)]
    async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use staybook_core::entity::EntityKind;

    use super::*;

    fn owner(id: i64) -> ReferenceRecord {
        ReferenceRecord::from_document(EntityKind::Owner, id, json!({ "name": "Olga" }))
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_ttl() {
        let cache = ResolutionCache::new(Duration::from_secs(10), 10);
        cache.insert(owner(1)).await;
        assert!(cache.get(&ForeignEntityRef::owner(1)).await.is_some());

        tokio::time::advance(Duration::from_secs(11)).await;
        assert!(cache.get(&ForeignEntityRef::owner(1)).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn oldest_entry_is_evicted_at_capacity() {
        let cache = ResolutionCache::new(Duration::from_secs(60), 2);
        cache.insert(owner(1)).await;
        tokio::time::advance(Duration::from_millis(5)).await;
        cache.insert(owner(2)).await;
        tokio::time::advance(Duration::from_millis(5)).await;
        cache.insert(owner(3)).await;

        assert_eq!(cache.len().await, 2);
        assert!(cache.get(&ForeignEntityRef::owner(1)).await.is_none());
        assert!(cache.get(&ForeignEntityRef::owner(3)).await.is_some());
    }
}
