//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods that
//! accept `&PgPool` as the first argument.

pub mod booking_repo;
pub mod geo_index_repo;
pub mod property_repo;
pub mod reference_repo;

pub use booking_repo::BookingRepo;
pub use geo_index_repo::{GeoIndexLeaseRepo, GeoIndexStateRepo, IndexAdminRepo};
pub use property_repo::PropertyRepo;
pub use reference_repo::ReferenceRepo;
