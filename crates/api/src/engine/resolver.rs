//! Batched resolution of foreign entity references.
//!
//! References are grouped by kind and each kind is fetched with one store
//! call per attempt, all kinds concurrently. Only kinds whose lookup failed
//! are retried, with exponential backoff. `NotFound` is a final answer and
//! is never retried.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use futures::future::join_all;
use staybook_core::entity::{EntityKind, ForeignEntityRef};
use staybook_core::error::{ResolutionError, StoreError};
use staybook_core::reference::{ReferenceRecord, ResolutionMap};
use staybook_core::retry::RetryPolicy;
use staybook_core::store::EntityStore;
use staybook_core::types::DbId;
use tokio_util::sync::CancellationToken;

use super::cache::ResolutionCache;

pub struct EntityResolver {
    store: Arc<dyn EntityStore>,
    policy: RetryPolicy,
    cache: Option<ResolutionCache>,
}

impl EntityResolver {
    pub fn new(store: Arc<dyn EntityStore>, policy: RetryPolicy) -> Self {
        Self {
            store,
            policy,
            cache: None,
        }
    }

    pub fn with_cache(mut self, cache: ResolutionCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Resolve every distinct reference in `refs`.
    ///
    /// The returned map has exactly one entry per distinct reference. Found
    /// records are projected to the fields a booking view exposes for their
    /// kind. If `cancel` fires, every still-pending reference resolves to
    /// `Cancelled` and in-flight lookups are dropped.
    pub async fn resolve(&self, refs: &[ForeignEntityRef], cancel: &CancellationToken) -> ResolutionMap {
        let mut resolved = ResolutionMap::new();
        let mut pending: BTreeMap<EntityKind, Vec<DbId>> = BTreeMap::new();

        let distinct: BTreeSet<ForeignEntityRef> = refs.iter().copied().collect();
        for entity_ref in distinct {
            if let Some(record) = self.cached(&entity_ref).await {
                resolved.insert(entity_ref, Ok(record));
                continue;
            }
            pending.entry(entity_ref.kind).or_default().push(entity_ref.id);
        }

        let mut last_errors: BTreeMap<EntityKind, StoreError> = BTreeMap::new();
        let mut attempt: u32 = 1;

        while !pending.is_empty() {
            let store = &self.store;
            let lookups = join_all(pending.iter().map(|(kind, ids)| async move {
                (*kind, store.fetch_many(*kind, ids).await)
            }));

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                results = lookups => Some(results),
            };
            let Some(results) = outcome else {
                fail_pending(&mut resolved, &pending, ResolutionError::cancelled);
                return resolved;
            };

            for (kind, result) in results {
                match result {
                    Ok(mut documents) => {
                        let ids = pending.remove(&kind).unwrap_or_default();
                        for id in ids {
                            let entity_ref = ForeignEntityRef::new(kind, id);
                            let resolution = match documents.remove(&id) {
                                Some(document) => {
                                    let record = to_view_record(kind, id, document);
                                    if let Some(cache) = &self.cache {
                                        cache.insert(record.clone()).await;
                                    }
                                    Ok(record)
                                }
                                None => Err(ResolutionError::not_found(entity_ref)),
                            };
                            resolved.insert(entity_ref, resolution);
                        }
                        last_errors.remove(&kind);
                    }
                    Err(err) => {
                        tracing::warn!(
                            kind = %kind,
                            attempt,
                            max_attempts = self.policy.max_attempts,
                            error = %err,
                            "Entity lookup failed"
                        );
                        last_errors.insert(kind, err);
                    }
                }
            }

            if pending.is_empty() {
                break;
            }

            if attempt >= self.policy.max_attempts {
                for (kind, ids) in &pending {
                    let detail = last_errors
                        .get(kind)
                        .map(ToString::to_string)
                        .unwrap_or_default();
                    for id in ids {
                        let entity_ref = ForeignEntityRef::new(*kind, *id);
                        resolved.insert(
                            entity_ref,
                            Err(ResolutionError::unavailable(entity_ref, detail.clone())),
                        );
                    }
                }
                break;
            }

            let delay = self.policy.delay_after(attempt);
            let cancelled = tokio::select! {
                biased;
                _ = cancel.cancelled() => true,
                _ = tokio::time::sleep(delay) => false,
            };
            if cancelled {
                fail_pending(&mut resolved, &pending, ResolutionError::cancelled);
                return resolved;
            }
            attempt += 1;
        }

        resolved
    }

    async fn cached(&self, entity_ref: &ForeignEntityRef) -> Option<ReferenceRecord> {
        match &self.cache {
            Some(cache) => cache.get(entity_ref).await,
            None => None,
        }
    }
}

fn fail_pending(
    resolved: &mut ResolutionMap,
    pending: &BTreeMap<EntityKind, Vec<DbId>>,
    make_error: fn(ForeignEntityRef) -> ResolutionError,
) {
    for (kind, ids) in pending {
        for id in ids {
            let entity_ref = ForeignEntityRef::new(*kind, *id);
            resolved.insert(entity_ref, Err(make_error(entity_ref)));
        }
    }
}

/// Wrap a raw document and cut it down to the fields a booking view shows.
fn to_view_record(kind: EntityKind, id: DbId, document: serde_json::Value) -> ReferenceRecord {
    let record = ReferenceRecord::from_document(kind, id, document);
    let missing = record.drifted_fields(kind.view_fields());
    if !missing.is_empty() {
        tracing::debug!(
            entity = %record.entity_ref(),
            missing = ?missing,
            "Reference record lacks expected fields"
        );
    }
    record.project(kind.view_fields())
}
