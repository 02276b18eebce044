//! Route definitions for `/admin/geo-index`.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::geo_index;
use crate::state::AppState;

/// Routes mounted at `/admin/geo-index`.
///
/// ```text
/// GET  /                -> get_status
/// POST /ensure          -> ensure
/// POST /retire          -> retire
/// POST /reconcile       -> reconcile
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(geo_index::get_status))
        .route("/ensure", post(geo_index::ensure))
        .route("/retire", post(geo_index::retire))
        .route("/reconcile", post(geo_index::reconcile))
}
