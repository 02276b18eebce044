use axum::routing::get;
use axum::Router;

use crate::handlers::properties;
use crate::state::AppState;

/// Routes mounted at `/properties`.
pub fn router() -> Router<AppState> {
    Router::new().route("/near", get(properties::search_near))
}
