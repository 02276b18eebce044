pub mod bookings;
pub mod geo_index;
pub mod properties;
