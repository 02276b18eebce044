//! Startup pass over the property location index.
//!
//! Repairs whatever a previous process left half-done, then optionally makes
//! sure the index exists. Deferral is expected when several instances start
//! at once: exactly one of them does the work.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::engine::GeoIndexManager;

pub async fn run(manager: Arc<GeoIndexManager>, auto_ensure: bool, cancel: CancellationToken) {
    tokio::select! {
        _ = cancel.cancelled() => {
            tracing::info!("Geo index startup pass cancelled");
        }
        _ = startup_pass(&manager, auto_ensure) => {}
    }
}

async fn startup_pass(manager: &GeoIndexManager, auto_ensure: bool) {
    match manager.reconcile().await {
        Ok(report) => tracing::info!(
            key_spec = %manager.spec(),
            state = %report.after,
            repaired = report.actions.len(),
            "Geo index reconciled at startup"
        ),
        Err(e) if e.is_deferral() => {
            tracing::info!(error = %e, "Geo index reconcile deferred to another instance");
            return;
        }
        Err(e) => tracing::error!(error = %e, "Geo index reconcile failed"),
    }

    if !auto_ensure {
        return;
    }
    match manager.ensure_index().await {
        Ok(outcome) => tracing::info!(outcome = ?outcome, "Geo index ensured at startup"),
        Err(e) if e.is_deferral() => {
            tracing::info!(error = %e, "Geo index ensure deferred to another instance")
        }
        Err(e) => tracing::error!(error = %e, "Geo index ensure failed at startup"),
    }
}

#[cfg(test)]
mod tests {
    use staybook_core::geo_index::{GeoIndexSpec, IndexState};
    use staybook_testing::{InMemoryIndexAdmin, InMemoryIndexCatalog, InMemoryPropertyStore};

    use super::*;
    use crate::config::GeoIndexConfig;

    fn manager(catalog: &InMemoryIndexCatalog, admin: &InMemoryIndexAdmin) -> Arc<GeoIndexManager> {
        Arc::new(GeoIndexManager::new(
            GeoIndexSpec::property_location(),
            Arc::new(catalog.clone()),
            Arc::new(admin.clone()),
            Arc::new(InMemoryPropertyStore::new()),
            &GeoIndexConfig::default(),
        ))
    }

    #[tokio::test]
    async fn repairs_then_builds_when_auto_ensure() {
        let spec = GeoIndexSpec::property_location();
        let catalog = InMemoryIndexCatalog::new();
        let admin = InMemoryIndexAdmin::new();
        catalog.set_state(&spec, IndexState::Retiring);

        run(manager(&catalog, &admin), true, CancellationToken::new()).await;

        assert_eq!(catalog.state(&spec), IndexState::Active);
        assert!(admin.has_valid_index(&spec.index_name()));
    }

    #[tokio::test]
    async fn leaves_index_absent_without_auto_ensure() {
        let spec = GeoIndexSpec::property_location();
        let catalog = InMemoryIndexCatalog::new();
        let admin = InMemoryIndexAdmin::new();

        run(manager(&catalog, &admin), false, CancellationToken::new()).await;

        assert_eq!(catalog.state(&spec), IndexState::Absent);
        assert_eq!(admin.create_calls(), 0);
    }
}
