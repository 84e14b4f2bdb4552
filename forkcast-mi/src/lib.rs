//! forkcast-mi library interface
//!
//! Exposes the pipeline, store, and API surface for integration testing.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod geo;
pub mod models;
pub mod pipeline;
pub mod protocols;
pub mod services;
pub mod types;

pub use crate::error::{ApiError, ApiResult};

use std::sync::Arc;

use axum::Router;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::pipeline::MenuPipeline;
use crate::protocols::ProtocolRegistry;
use crate::services::PlacesClient;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    /// Places provider client for discovery endpoints
    pub places: Arc<PlacesClient>,
    /// Analysis pipeline (screening, classification, store commits)
    pub pipeline: Arc<MenuPipeline>,
    /// Dietary protocol registry
    pub protocols: Arc<ProtocolRegistry>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(
        db: SqlitePool,
        places: Arc<PlacesClient>,
        pipeline: Arc<MenuPipeline>,
        protocols: Arc<ProtocolRegistry>,
    ) -> Self {
        Self {
            db,
            places,
            pipeline,
            protocols,
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
///
/// CORS is permissive: the caller is a mobile client running from
/// arbitrary origins.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::health_routes())
        .merge(api::protocol_routes())
        .merge(api::restaurant_routes())
        .merge(api::menu_routes())
        .merge(api::analysis_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
