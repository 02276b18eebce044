//! In-memory implementations of the store traits.
//!
//! Each store is cheaply cloneable (shared state behind `Arc`) so a test can
//! hand one clone to the engine and keep another for assertions. All of
//! them record calls and support fault injection.

#![allow(clippy::unwrap_used)] // Poisoned test locks should fail loudly.

pub mod bookings;
pub mod entities;
pub mod fixtures;
pub mod health;
pub mod index;
pub mod properties;

pub use bookings::InMemoryBookingStore;
pub use entities::InMemoryEntityStore;
pub use health::StaticHealth;
pub use index::{InMemoryIndexAdmin, InMemoryIndexCatalog};
pub use properties::InMemoryPropertyStore;
