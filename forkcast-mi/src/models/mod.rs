//! Domain models for forkcast-mi

pub mod freshness;
pub mod restaurant;

pub use freshness::Freshness;
pub use restaurant::{MenuStats, RestaurantIdentity, RestaurantRecord, StoredMenuItem};
