//! Admin handlers for the property location index lifecycle.
//!
//! Lifecycle operations that find another instance holding the lease answer
//! `202 Accepted` with outcome `deferred`: the work is already in progress
//! elsewhere and the caller can poll the status endpoint.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use staybook_core::error::IndexError;

use crate::engine::geo_index::IndexStatus;
use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

#[derive(Debug, Serialize)]
struct Deferred {
    outcome: &'static str,
    reason: String,
}

fn respond<T: Serialize>(result: Result<T, IndexError>) -> AppResult<Response> {
    match result {
        Ok(data) => Ok(Json(DataResponse { data }).into_response()),
        Err(err) if err.is_deferral() => Ok((
            StatusCode::ACCEPTED,
            Json(DataResponse {
                data: Deferred {
                    outcome: "deferred",
                    reason: err.to_string(),
                },
            }),
        )
            .into_response()),
        Err(err) => Err(err.into()),
    }
}

/// GET /api/v1/admin/geo-index
pub async fn get_status(State(state): State<AppState>) -> AppResult<Json<DataResponse<IndexStatus>>> {
    let status = state.geo_index.status().await?;
    Ok(Json(DataResponse { data: status }))
}

/// POST /api/v1/admin/geo-index/ensure
pub async fn ensure(State(state): State<AppState>) -> AppResult<Response> {
    respond(state.geo_index.ensure_index().await)
}

/// POST /api/v1/admin/geo-index/retire
pub async fn retire(State(state): State<AppState>) -> AppResult<Response> {
    respond(state.geo_index.retire_index().await)
}

/// POST /api/v1/admin/geo-index/reconcile
pub async fn reconcile(State(state): State<AppState>) -> AppResult<Response> {
    respond(state.geo_index.reconcile().await)
}
