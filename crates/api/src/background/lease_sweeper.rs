//! Periodic removal of expired index lease records.
//!
//! Expired leases never block acquisition, so this is housekeeping: it keeps
//! the lease table small and makes a crashed holder visible in the logs.

use std::sync::Arc;
use std::time::Duration;

use staybook_core::store::IndexCatalog;
use tokio_util::sync::CancellationToken;

/// Run the sweep loop until `cancel` is triggered.
pub async fn run(catalog: Arc<dyn IndexCatalog>, every: Duration, cancel: CancellationToken) {
    tracing::info!(interval_secs = every.as_secs(), "Lease sweeper started");

    let mut interval = tokio::time::interval(every);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Lease sweeper stopping");
                break;
            }
            _ = interval.tick() => {
                match catalog.purge_expired_leases().await {
                    Ok(0) => tracing::debug!("Lease sweep: nothing expired"),
                    Ok(purged) => tracing::info!(purged, "Lease sweep: removed expired leases"),
                    Err(e) => tracing::error!(error = %e, "Lease sweep failed"),
                }
            }
        }
    }
}
