//! Liveness and store reachability, mounted at the root (not under `/api/v1`).
//!
//! The probe always answers 200; a store that cannot be pinged only degrades
//! the reported status so orchestrators keep the instance in rotation while
//! booking views answer with retryable 503s.

use axum::extract::State;
use axum::{routing::get, Json, Router};
use serde::Serialize;
use staybook_core::geo_index::IndexState;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    /// `ok` or `degraded`.
    pub status: &'static str,
    pub version: &'static str,
    /// Whether the [`StoreHealth`](staybook_core::store::StoreHealth) ping
    /// succeeded.
    pub store_healthy: bool,
    /// State the planner currently sees for the property location index.
    pub geo_index: IndexState,
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let store_healthy = match state.health.ping().await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, "Health check: store ping failed");
            false
        }
    };
    let geo_index = state.geo_index.current_state().await;

    Json(HealthResponse {
        status: if store_healthy { "ok" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        store_healthy,
        geo_index,
    })
}

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
