//! External service clients

pub mod places_client;
pub mod vision_client;

pub use places_client::{PlacesClient, PlacesError};
pub use vision_client::AnthropicVisionClient;
