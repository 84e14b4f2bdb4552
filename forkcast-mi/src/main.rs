//! forkcast-mi - Menu Intelligence service
//!
//! Turns restaurant photo catalogs into dietary-safety menu data: screens
//! provider photos for menus, classifies items against the caller's
//! dietary protocols, and serves committed results with freshness
//! labeling.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use forkcast_common::config::{load_toml_config, RootFolderInitializer, RootFolderResolver};
use forkcast_mi::config::{self, MiConfig};
use forkcast_mi::pipeline::{MenuPipeline, PhotoSource, PlaceDirectory};
use forkcast_mi::protocols::ProtocolRegistry;
use forkcast_mi::services::{AnthropicVisionClient, PlacesClient};
use forkcast_mi::types::VisionCapability;
use forkcast_mi::AppState;

/// Command-line arguments for forkcast-mi
#[derive(Parser, Debug)]
#[command(name = "forkcast-mi")]
#[command(about = "Menu intelligence microservice for Forkcast")]
#[command(version)]
struct Args {
    /// Port to listen on (falls back to the TOML config, then 5741)
    #[arg(short, long, env = "FORKCAST_MI_PORT")]
    port: Option<u16>,

    /// Root folder holding the database and service config
    #[arg(short, long, env = "FORKCAST_ROOT")]
    root_folder: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "forkcast_mi=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    info!("Starting Forkcast Menu Intelligence");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    // Resolve and prepare the root folder
    let resolver = RootFolderResolver::new("forkcast-mi");
    let root_folder = resolver.resolve(args.root_folder.as_deref());
    let initializer = RootFolderInitializer::new(root_folder);
    initializer
        .ensure_directory_exists()
        .context("Failed to initialize root folder")?;

    // Open or create the database
    let db_path = initializer.database_path();
    info!("Database: {}", db_path.display());
    let db = forkcast_mi::db::init_database_pool(&db_path)
        .await
        .context("Failed to open database")?;
    info!("Database connection established");

    // Load service config and resolve API keys (database -> env -> TOML)
    let config_path = initializer.service_config_path("forkcast-mi");
    let toml_config: MiConfig =
        load_toml_config(&config_path).context("Failed to load service config")?;
    let places_key = config::resolve_places_api_key(&db, &toml_config, &config_path).await?;
    let anthropic_key = config::resolve_anthropic_api_key(&db, &toml_config, &config_path).await?;

    // Construct provider clients and the pipeline
    let places = Arc::new(PlacesClient::new(places_key).context("Places client")?);
    let vision =
        Arc::new(AnthropicVisionClient::new(anthropic_key).context("Vision client")?);
    let protocols = Arc::new(ProtocolRegistry::new());
    let pipeline = Arc::new(MenuPipeline::new(
        db.clone(),
        places.clone() as Arc<dyn PlaceDirectory>,
        places.clone() as Arc<dyn PhotoSource>,
        vision as Arc<dyn VisionCapability>,
        protocols.clone(),
        toml_config.screening.to_config(),
    ));
    info!(
        protocols = protocols.known_ids().len(),
        "Pipeline initialized"
    );

    let state = AppState::new(db, places, pipeline, protocols);
    let app = forkcast_mi::build_router(state);

    let port = args
        .port
        .or(toml_config.port)
        .unwrap_or(config::DEFAULT_PORT);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
