pub mod admin;
pub mod bookings;
pub mod health;
pub mod properties;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /bookings/views                      list booking views (GET)
/// /bookings/{id}/view                  one booking view (GET)
///
/// /properties/near                     radius search (GET)
///
/// /admin/geo-index                     index state, lease, physical index (GET)
/// /admin/geo-index/ensure              build and activate (POST)
/// /admin/geo-index/retire              drain and drop (POST)
/// /admin/geo-index/reconcile           repair interrupted episodes (POST)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/bookings", bookings::router())
        .nest("/properties", properties::router())
        .nest("/admin/geo-index", admin::router())
}
