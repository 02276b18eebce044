//! Handlers for aggregated booking views.
//!
//! Each request gets its own cancellation token, tied to the handler future
//! by a drop guard: a client disconnect or request timeout drops the future
//! and cancels any entity lookups still in flight.

use axum::extract::{Path, Query, State};
use axum::Json;
use staybook_core::booking::BookingView;
use staybook_core::types::DbId;
use tokio_util::sync::CancellationToken;

use crate::error::AppResult;
use crate::query::BookingViewParams;
use crate::response::DataResponse;
use crate::state::AppState;

/// GET /api/v1/bookings/views
///
/// One page of booking views. Supports `status`, `from`, `to`, `owner_id`,
/// `traveler_id`, `sort`, `limit` and `offset` query parameters.
pub async fn list_booking_views(
    State(state): State<AppState>,
    Query(params): Query<BookingViewParams>,
) -> AppResult<Json<DataResponse<Vec<BookingView>>>> {
    let filter = params.filter()?;
    let page = params.page();

    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    let views = state
        .aggregator
        .collect_booking_views(filter, page, cancel)
        .await?;

    tracing::debug!(
        offset = page.offset,
        limit = page.limit,
        returned = views.len(),
        "Listed booking views"
    );
    Ok(Json(DataResponse { data: views }))
}

/// GET /api/v1/bookings/{id}/view
pub async fn get_booking_view(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<BookingView>>> {
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    let view = state.aggregator.get_booking_view(id, &cancel).await?;
    Ok(Json(DataResponse { data: view }))
}
