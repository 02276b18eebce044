//! Request-path orchestration over the store seams.
//!
//! - [`resolver`]: batched, retrying lookup of foreign entity references
//! - [`aggregation`]: booking views assembled from bookings + resolutions
//! - [`geo_index`]: lifecycle of the property location index
//! - [`planner`]: index-aware property radius search

pub mod aggregation;
pub mod cache;
pub mod geo_index;
pub mod planner;
pub mod resolver;

pub use aggregation::BookingAggregator;
pub use cache::ResolutionCache;
pub use geo_index::GeoIndexManager;
pub use planner::GeoQueryPlanner;
pub use resolver::EntityResolver;
