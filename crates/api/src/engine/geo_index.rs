//! Lifecycle of the geospatial index over property locations.
//!
//! Every mutating episode (ensure, retire, reconcile) runs under a lease on
//! the index's key specification. The lease is renewed in the background
//! while the episode runs and released when it ends; an instance that
//! crashes simply lets it expire. Callers that find the lease held are
//! deferred with [`IndexError::LeaseContention`] instead of waiting.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use staybook_core::error::IndexError;
use staybook_core::geo::BoundingBox;
use staybook_core::geo_index::{
    renewal_interval, GeoIndexDescriptor, GeoIndexSpec, IndexInfo, IndexState, Lease, LeaseAttempt,
    VERIFY_PROBE_RADIUS_KM,
};
use staybook_core::property::{rank_by_distance, Property, PropertyFilter};
use staybook_core::store::{IndexAdmin, IndexCatalog, PropertyStore};
use staybook_core::types::DbId;
use tokio::time::{Instant, MissedTickBehavior};

use crate::config::GeoIndexConfig;

/// Lower bound on the renewal cadence, for very short lease TTLs.
const MIN_RENEWAL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum EnsureOutcome {
    AlreadyActive,
    Built,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RetireOutcome {
    AlreadyAbsent,
    Retired,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub before: IndexState,
    pub after: IndexState,
    pub actions: Vec<String>,
}

/// The lease-guarded operations, named in logs and lease-loss errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Episode {
    Ensure,
    Retire,
    Reconcile,
}

impl Episode {
    fn as_str(self) -> &'static str {
        match self {
            Episode::Ensure => "ensure",
            Episode::Retire => "retire",
            Episode::Reconcile => "reconcile",
        }
    }

    fn lease_lost(self, key_spec: String) -> IndexError {
        match self {
            Episode::Ensure => IndexError::BuildFailed {
                key_spec,
                reason: "lease lost while the build was running".to_string(),
            },
            other => IndexError::LeaseLost {
                key_spec,
                episode: other.as_str(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexStatus {
    #[serde(flatten)]
    pub descriptor: GeoIndexDescriptor,
    pub lease: Option<Lease>,
    /// The physical index, if the store has one by this name.
    pub physical: Option<IndexInfo>,
}

pub struct GeoIndexManager {
    spec: GeoIndexSpec,
    catalog: Arc<dyn IndexCatalog>,
    admin: Arc<dyn IndexAdmin>,
    properties: Arc<dyn PropertyStore>,
    lease_ttl: Duration,
    retire_grace: Duration,
    instance_id: String,
}

impl GeoIndexManager {
    pub fn new(
        spec: GeoIndexSpec,
        catalog: Arc<dyn IndexCatalog>,
        admin: Arc<dyn IndexAdmin>,
        properties: Arc<dyn PropertyStore>,
        config: &GeoIndexConfig,
    ) -> Self {
        Self {
            spec,
            catalog,
            admin,
            properties,
            lease_ttl: config.lease_ttl(),
            retire_grace: config.retire_grace(),
            instance_id: config.instance_id.clone(),
        }
    }

    pub fn spec(&self) -> &GeoIndexSpec {
        &self.spec
    }

    /// Persisted lifecycle state, read for query planning.
    ///
    /// A catalog outage degrades to `absent` so searches keep working on the
    /// fallback path.
    pub async fn current_state(&self) -> IndexState {
        match self.catalog.load_state(&self.spec).await {
            Ok(descriptor) => descriptor.state,
            Err(e) => {
                tracing::warn!(
                    key_spec = %self.spec,
                    error = %e,
                    "Index catalog unavailable, planning without index"
                );
                IndexState::Absent
            }
        }
    }

    pub async fn status(&self) -> Result<IndexStatus, IndexError> {
        let descriptor = self.catalog.load_state(&self.spec).await?;
        let lease = self.catalog.current_lease(&self.spec.key_spec()).await?;
        let physical = self.physical_index().await?;
        Ok(IndexStatus {
            descriptor,
            lease,
            physical,
        })
    }

    // -----------------------------------------------------------------------
    // Episodes
    // -----------------------------------------------------------------------

    /// Make sure the index exists, is verified, and is `active`.
    ///
    /// A no-op when already active. Otherwise builds the index without
    /// blocking writes, verifies it against an index-free scan, and only
    /// then marks it queryable. Any failure rolls the state back to
    /// `absent` and drops whatever was built.
    pub async fn ensure_index(&self) -> Result<EnsureOutcome, IndexError> {
        if self.catalog.load_state(&self.spec).await?.state == IndexState::Active {
            return Ok(EnsureOutcome::AlreadyActive);
        }

        let holder = self.acquire_lease().await?;
        let result = self.with_renewal(&holder, Episode::Ensure, self.ensure_locked()).await;
        self.release_lease(&holder).await;
        result
    }

    /// Take the index out of service and drop it.
    ///
    /// The state moves to `retiring` first so planners stop routing to the
    /// index, then waits out the drain window before the physical drop. If
    /// the drop fails while the index is still intact, it returns to
    /// `active`.
    pub async fn retire_index(&self) -> Result<RetireOutcome, IndexError> {
        if self.catalog.load_state(&self.spec).await?.state == IndexState::Absent {
            return Ok(RetireOutcome::AlreadyAbsent);
        }

        let holder = self.acquire_lease().await?;
        let result = self.with_renewal(&holder, Episode::Retire, self.retire_locked()).await;
        self.release_lease(&holder).await;
        result
    }

    /// Bring the persisted state back in line with the physical index.
    ///
    /// Finishes or rolls back episodes interrupted by a crash (state stuck
    /// in `building` or `retiring` with no live lease), demotes an `active`
    /// state whose index is missing or invalid, and drops indexes the
    /// catalog does not know about.
    pub async fn reconcile(&self) -> Result<ReconcileReport, IndexError> {
        let holder = self.acquire_lease().await?;
        let result = self.with_renewal(&holder, Episode::Reconcile, self.reconcile_locked()).await;
        self.release_lease(&holder).await;
        result
    }

    async fn ensure_locked(&self) -> Result<EnsureOutcome, IndexError> {
        let mut state = self.catalog.load_state(&self.spec).await?.state;
        if state.is_transient() {
            state = self.recover_locked(state, &mut Vec::new()).await?;
        }
        match state {
            IndexState::Active => return Ok(EnsureOutcome::AlreadyActive),
            IndexState::Absent => {}
            other => {
                return Err(IndexError::InvalidTransition {
                    from: other,
                    to: IndexState::Building,
                })
            }
        }

        self.transition(IndexState::Absent, IndexState::Building).await?;
        tracing::info!(key_spec = %self.spec, index = %self.spec.index_name(), "Building geo index");

        if let Err(err) = self.build_and_verify().await {
            tracing::error!(key_spec = %self.spec, error = %err, "Geo index build failed, rolling back");
            self.rollback_build().await;
            return Err(err);
        }

        if let Err(err) = self.transition(IndexState::Building, IndexState::Active).await {
            if matches!(err, IndexError::StateConflict { .. }) {
                // Someone else owns the state now; leave it to them.
                tracing::error!(key_spec = %self.spec, error = %err, "Index state moved during build");
            } else {
                tracing::error!(key_spec = %self.spec, error = %err, "Failed to activate geo index, rolling back");
                self.rollback_build().await;
            }
            return Err(err);
        }
        tracing::info!(key_spec = %self.spec, "Geo index active");
        Ok(EnsureOutcome::Built)
    }

    async fn retire_locked(&self) -> Result<RetireOutcome, IndexError> {
        let mut state = self.catalog.load_state(&self.spec).await?.state;
        if state == IndexState::Building {
            state = self.recover_locked(state, &mut Vec::new()).await?;
        }

        match state {
            IndexState::Absent => return Ok(RetireOutcome::AlreadyAbsent),
            IndexState::Active => {
                self.transition(IndexState::Active, IndexState::Retiring).await?;
                tracing::info!(
                    key_spec = %self.spec,
                    grace_secs = self.retire_grace.as_secs(),
                    "Geo index retiring"
                );
                tokio::time::sleep(self.retire_grace).await;
            }
            // Drained by an earlier episode that died before dropping.
            IndexState::Retiring => {}
            IndexState::Building => {
                return Err(IndexError::StateConflict {
                    key_spec: self.spec.key_spec(),
                    expected: IndexState::Active,
                })
            }
        }

        self.drop_retiring().await?;
        tracing::info!(key_spec = %self.spec, "Geo index retired");
        Ok(RetireOutcome::Retired)
    }

    async fn reconcile_locked(&self) -> Result<ReconcileReport, IndexError> {
        let before = self.catalog.load_state(&self.spec).await?.state;
        let mut actions = Vec::new();

        let after = match before {
            IndexState::Building | IndexState::Retiring => {
                self.recover_locked(before, &mut actions).await?
            }
            IndexState::Active => {
                if self.has_valid_index().await? {
                    IndexState::Active
                } else {
                    tracing::warn!(key_spec = %self.spec, "Active geo index is missing or invalid");
                    self.transition(IndexState::Active, IndexState::Retiring).await?;
                    self.drop_retiring().await?;
                    actions.push("demoted active state without a valid index".to_string());
                    IndexState::Absent
                }
            }
            IndexState::Absent => {
                if let Some(orphan) = self.physical_index().await? {
                    self.admin.drop_index(&orphan.name).await?;
                    actions.push(format!("dropped orphaned index {}", orphan.name));
                }
                IndexState::Absent
            }
        };

        if !actions.is_empty() {
            tracing::info!(
                key_spec = %self.spec,
                before = %before,
                after = %after,
                actions = ?actions,
                "Geo index reconciled"
            );
        }
        Ok(ReconcileReport {
            before,
            after,
            actions,
        })
    }

    /// Resolve a transient state left by an interrupted episode. Returns the
    /// resulting stable state.
    async fn recover_locked(
        &self,
        state: IndexState,
        actions: &mut Vec<String>,
    ) -> Result<IndexState, IndexError> {
        match state {
            IndexState::Building => match self.verify().await {
                Ok(()) => {
                    self.transition(IndexState::Building, IndexState::Active).await?;
                    actions.push("completed interrupted build".to_string());
                    Ok(IndexState::Active)
                }
                Err(IndexError::VerificationFailed { reason, .. }) => {
                    tracing::warn!(key_spec = %self.spec, reason = %reason, "Interrupted build did not verify");
                    self.admin.drop_index(&self.spec.index_name()).await?;
                    self.transition(IndexState::Building, IndexState::Absent).await?;
                    actions.push("rolled back interrupted build".to_string());
                    Ok(IndexState::Absent)
                }
                Err(other) => Err(other),
            },
            IndexState::Retiring => {
                self.drop_retiring().await?;
                actions.push("completed interrupted retirement".to_string());
                Ok(IndexState::Absent)
            }
            stable => Ok(stable),
        }
    }

    // -----------------------------------------------------------------------
    // Build, verify, drop
    // -----------------------------------------------------------------------

    async fn build_and_verify(&self) -> Result<(), IndexError> {
        self.admin
            .create_index(&self.spec)
            .await
            .map_err(|e| IndexError::BuildFailed {
                key_spec: self.spec.key_spec(),
                reason: e.to_string(),
            })?;
        self.verify().await
    }

    /// The index must exist, be valid, and return exactly what an index-free
    /// scan returns for a probe query around a real property.
    async fn verify(&self) -> Result<(), IndexError> {
        let failed = |reason: String| IndexError::VerificationFailed {
            key_spec: self.spec.key_spec(),
            reason,
        };

        match self.physical_index().await? {
            None => return Err(failed("index does not exist".to_string())),
            Some(info) if !info.is_valid => return Err(failed("index is not valid".to_string())),
            Some(_) => {}
        }

        let Some(probe) = self.properties.sample_location().await? else {
            tracing::debug!(key_spec = %self.spec, "No located properties, skipping probe query");
            return Ok(());
        };

        let filter = PropertyFilter::default();
        let indexed = self
            .properties
            .query_within_radius(&self.spec.index_name(), probe, VERIFY_PROBE_RADIUS_KM, &filter)
            .await
            .map_err(|e| failed(format!("probe query failed: {e}")))?;
        let scanned = self
            .properties
            .query_bounding_box(&BoundingBox::around(probe, VERIFY_PROBE_RADIUS_KM), &filter)
            .await?;

        let ids = |rows: Vec<Property>| -> Vec<DbId> {
            rank_by_distance(probe, VERIFY_PROBE_RADIUS_KM, rows)
                .into_iter()
                .map(|m| m.property.id)
                .collect()
        };
        let (indexed, scanned) = (ids(indexed), ids(scanned));
        if indexed != scanned {
            return Err(failed(format!(
                "probe returned {} properties via index but {} via scan",
                indexed.len(),
                scanned.len()
            )));
        }
        Ok(())
    }

    /// Best effort: the build already failed and that error is what the
    /// caller sees.
    async fn rollback_build(&self) {
        if let Err(e) = self.admin.drop_index(&self.spec.index_name()).await {
            tracing::error!(key_spec = %self.spec, error = %e, "Failed to drop index during rollback");
        }
        if let Err(e) = self.transition(IndexState::Building, IndexState::Absent).await {
            tracing::error!(key_spec = %self.spec, error = %e, "Failed to roll back index state");
        }
    }

    /// Drop the index of a `retiring` state and finish at `absent`. A drop
    /// failure that leaves a valid index behind rolls back to `active`.
    async fn drop_retiring(&self) -> Result<(), IndexError> {
        match self.admin.drop_index(&self.spec.index_name()).await {
            Ok(()) => self.transition(IndexState::Retiring, IndexState::Absent).await,
            Err(err) => {
                tracing::error!(key_spec = %self.spec, error = %err, "Failed to drop retiring index");
                if matches!(self.has_valid_index().await, Ok(true)) {
                    self.transition(IndexState::Retiring, IndexState::Active).await?;
                    tracing::warn!(key_spec = %self.spec, "Geo index restored to active");
                }
                Err(err.into())
            }
        }
    }

    async fn physical_index(&self) -> Result<Option<IndexInfo>, IndexError> {
        let name = self.spec.index_name();
        Ok(self
            .admin
            .list_indexes(self.spec.collection())
            .await?
            .into_iter()
            .find(|info| info.name == name))
    }

    async fn has_valid_index(&self) -> Result<bool, IndexError> {
        Ok(self.physical_index().await?.is_some_and(|info| info.is_valid))
    }

    async fn transition(&self, from: IndexState, to: IndexState) -> Result<(), IndexError> {
        if !from.can_transition_to(to) {
            return Err(IndexError::InvalidTransition { from, to });
        }
        if !self.catalog.transition_state(&self.spec, from, to).await? {
            return Err(IndexError::StateConflict {
                key_spec: self.spec.key_spec(),
                expected: from,
            });
        }
        tracing::debug!(key_spec = %self.spec, from = %from, to = %to, "Index state transition");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Lease
    // -----------------------------------------------------------------------

    async fn acquire_lease(&self) -> Result<String, IndexError> {
        let key_spec = self.spec.key_spec();
        let holder = format!("{}:{}", self.instance_id, uuid::Uuid::new_v4());

        match self
            .catalog
            .try_acquire_lease(&key_spec, &holder, self.lease_ttl)
            .await?
        {
            LeaseAttempt::Acquired(lease) => {
                tracing::debug!(key_spec = %key_spec, holder = %holder, expires_at = %lease.expires_at, "Lease acquired");
                Ok(holder)
            }
            LeaseAttempt::Held(lease) => {
                tracing::info!(key_spec = %key_spec, holder = %lease.holder, "Lease held elsewhere, deferring");
                Err(IndexError::LeaseContention {
                    key_spec,
                    holder: lease.holder,
                    expires_at: lease.expires_at,
                })
            }
        }
    }

    async fn release_lease(&self, holder: &str) {
        match self.catalog.release_lease(&self.spec.key_spec(), holder).await {
            Ok(true) => tracing::debug!(key_spec = %self.spec, holder, "Lease released"),
            Ok(false) => tracing::warn!(key_spec = %self.spec, holder, "Lease expired before release"),
            Err(e) => tracing::warn!(key_spec = %self.spec, holder, error = %e, "Failed to release lease"),
        }
    }

    /// Drive `work` to completion while renewing the lease.
    ///
    /// If the lease is found to belong to someone else, `work` is dropped
    /// where it stands and the episode fails: a build with `BuildFailed`,
    /// anything else with `LeaseLost`. The state is left for the new holder
    /// to reconcile. A renewal that merely errors is retried at the next
    /// tick.
    async fn with_renewal<T>(
        &self,
        holder: &str,
        episode: Episode,
        work: impl Future<Output = Result<T, IndexError>>,
    ) -> Result<T, IndexError> {
        let every = renewal_interval(self.lease_ttl).max(MIN_RENEWAL_INTERVAL);
        let mut ticker = tokio::time::interval_at(Instant::now() + every, every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let key_spec = self.spec.key_spec();

        tokio::pin!(work);
        loop {
            tokio::select! {
                out = &mut work => return out,
                _ = ticker.tick() => {
                    match self.catalog.renew_lease(&key_spec, holder, self.lease_ttl).await {
                        Ok(true) => tracing::debug!(key_spec = %key_spec, holder, "Lease renewed"),
                        Ok(false) => {
                            tracing::error!(
                                key_spec = %key_spec,
                                holder,
                                episode = episode.as_str(),
                                "Lease lost during episode, aborting"
                            );
                            return Err(episode.lease_lost(key_spec));
                        }
                        Err(e) => tracing::warn!(key_spec = %key_spec, holder, error = %e, "Lease renewal failed"),
                    }
                }
            }
        }
    }
}
