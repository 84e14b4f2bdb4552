//! HTTP API handlers for forkcast-mi

pub mod analysis;
pub mod health;
pub mod menu;
pub mod protocols;
pub mod restaurants;

pub use analysis::analysis_routes;
pub use health::health_routes;
pub use menu::menu_routes;
pub use protocols::protocol_routes;
pub use restaurants::restaurant_routes;
