//! Domain types and pure logic shared by the booking and property services.
//!
//! This crate has zero internal dependencies: the store seams are declared
//! here as traits and implemented by `staybook-db` (PostgreSQL) and
//! `staybook-testing` (in-memory).

pub mod booking;
pub mod entity;
pub mod error;
pub mod geo;
pub mod geo_index;
pub mod property;
pub mod reference;
pub mod retry;
pub mod store;
pub mod types;
