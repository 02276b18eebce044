use axum::extract::{Query, State};
use axum::Json;

use crate::engine::planner::PropertySearch;
use crate::error::AppResult;
use crate::query::NearbyParams;
use crate::response::DataResponse;
use crate::state::AppState;

/// GET /api/v1/properties/near?lat=&lng=&radius_km=
///
/// Properties within the radius, nearest first, with the plan used to find
/// them. Optional `type`, `min_price`, `max_price` and `guests` narrow the
/// results.
pub async fn search_near(
    State(state): State<AppState>,
    Query(params): Query<NearbyParams>,
) -> AppResult<Json<DataResponse<PropertySearch>>> {
    let search = state
        .planner
        .search_properties_near(params.center(), params.radius_km, &params.filter())
        .await?;
    Ok(Json(DataResponse { data: search }))
}
