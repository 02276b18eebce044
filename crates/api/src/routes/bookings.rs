use axum::routing::get;
use axum::Router;

use crate::handlers::bookings;
use crate::state::AppState;

/// Routes mounted at `/bookings`.
///
/// ```text
/// GET /views                -> list_booking_views
/// GET /{id}/view            -> get_booking_view
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/views", get(bookings::list_booking_views))
        .route("/{id}/view", get(bookings::get_booking_view))
}
