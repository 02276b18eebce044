//! Row structs and DTOs.
//!
//! Rows mirror table columns one-to-one and convert into the domain types
//! of `staybook-core` at the repository boundary.

pub mod booking;
pub mod geo_index;
pub mod property;
