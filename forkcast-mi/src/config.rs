//! Configuration resolution for forkcast-mi
//!
//! Service tuning lives in a per-service TOML file inside the root folder.
//! API keys resolve through three tiers with Database -> ENV -> TOML
//! priority; keys found in a lower tier are written back to the database so
//! the next start resolves from tier one.

use std::path::Path;

use serde::{Deserialize, Serialize};
use sqlx::{Pool, Sqlite};
use tracing::{info, warn};

use forkcast_common::{Error, Result};

use crate::db::settings;
use crate::pipeline::ScreeningConfig;

/// Default HTTP port for the menu intelligence service.
pub const DEFAULT_PORT: u16 = 5741;

/// Per-service TOML config (`<root>/forkcast-mi.toml`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MiConfig {
    /// HTTP listen port; CLI and env override this.
    pub port: Option<u16>,
    pub google_places_api_key: Option<String>,
    pub anthropic_api_key: Option<String>,
    #[serde(default)]
    pub screening: ScreeningSettings,
}

/// Catalog screening tuning. Absent fields fall back to the built-in
/// defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScreeningSettings {
    pub max_photos: Option<usize>,
    pub required_acceptances: Option<usize>,
    pub min_confidence: Option<f64>,
    pub concurrency: Option<usize>,
}

impl ScreeningSettings {
    pub fn to_config(&self) -> ScreeningConfig {
        let defaults = ScreeningConfig::default();
        ScreeningConfig {
            max_photos: self.max_photos.unwrap_or(defaults.max_photos),
            required_acceptances: self
                .required_acceptances
                .unwrap_or(defaults.required_acceptances),
            min_confidence: self.min_confidence.unwrap_or(defaults.min_confidence),
            concurrency: self.concurrency.unwrap_or(defaults.concurrency),
        }
    }
}

/// One resolvable API key: where it lives in each tier.
struct KeyDescriptor {
    display_name: &'static str,
    setting_key: &'static str,
    env_var: &'static str,
    toml_field: &'static str,
    obtain_hint: &'static str,
}

const PLACES_KEY: KeyDescriptor = KeyDescriptor {
    display_name: "Google Places API key",
    setting_key: settings::GOOGLE_PLACES_API_KEY,
    env_var: "GOOGLE_PLACES_API_KEY",
    toml_field: "google_places_api_key",
    obtain_hint: "https://console.cloud.google.com/apis/credentials",
};

const ANTHROPIC_KEY: KeyDescriptor = KeyDescriptor {
    display_name: "Anthropic API key",
    setting_key: settings::ANTHROPIC_API_KEY,
    env_var: "ANTHROPIC_API_KEY",
    toml_field: "anthropic_api_key",
    obtain_hint: "https://console.anthropic.com/settings/keys",
};

/// Resolve the Google Places API key from 3-tier configuration.
pub async fn resolve_places_api_key(
    db: &Pool<Sqlite>,
    toml_config: &MiConfig,
    toml_path: &Path,
) -> Result<String> {
    resolve_api_key(
        &PLACES_KEY,
        db,
        toml_config.google_places_api_key.as_deref(),
        toml_path,
    )
    .await
}

/// Resolve the Anthropic API key from 3-tier configuration.
pub async fn resolve_anthropic_api_key(
    db: &Pool<Sqlite>,
    toml_config: &MiConfig,
    toml_path: &Path,
) -> Result<String> {
    resolve_api_key(
        &ANTHROPIC_KEY,
        db,
        toml_config.anthropic_api_key.as_deref(),
        toml_path,
    )
    .await
}

/// Database -> ENV -> TOML resolution with write-back.
///
/// The database is authoritative. A key found only in ENV or TOML is
/// written to the database so later starts resolve from tier one; an ENV
/// key is additionally mirrored to the TOML file as a backup.
async fn resolve_api_key(
    desc: &KeyDescriptor,
    db: &Pool<Sqlite>,
    toml_key: Option<&str>,
    toml_path: &Path,
) -> Result<String> {
    let db_key: Option<String> = settings::get_setting(db, desc.setting_key).await?;
    let env_key = std::env::var(desc.env_var).ok();

    let mut sources = Vec::new();
    if db_key.as_deref().is_some_and(is_valid_key) {
        sources.push("database");
    }
    if env_key.as_deref().is_some_and(is_valid_key) {
        sources.push("environment");
    }
    if toml_key.is_some_and(is_valid_key) {
        sources.push("TOML");
    }
    if sources.len() > 1 {
        warn!(
            "{} found in multiple sources: {}. Using database (highest priority).",
            desc.display_name,
            sources.join(", ")
        );
    }

    if let Some(key) = db_key {
        if is_valid_key(&key) {
            info!("{} loaded from database", desc.display_name);
            return Ok(key);
        }
    }

    if let Some(key) = env_key {
        if is_valid_key(&key) {
            info!("{} loaded from environment variable", desc.display_name);
            migrate_key_to_database(desc, key.clone(), "environment", db, toml_path).await?;
            return Ok(key);
        }
    }

    if let Some(key) = toml_key {
        if is_valid_key(key) {
            info!("{} loaded from TOML config", desc.display_name);
            migrate_key_to_database(desc, key.to_string(), "TOML", db, toml_path).await?;
            return Ok(key.to_string());
        }
    }

    Err(Error::Config(format!(
        "{name} not configured. Please configure using one of:\n\
         1. Environment: {env}=your-key-here\n\
         2. TOML config: <root>/forkcast-mi.toml ({field} = \"your-key\")\n\
         3. Settings table in the database ({setting})\n\
         \n\
         Obtain a key at: {hint}",
        name = desc.display_name,
        env = desc.env_var,
        field = desc.toml_field,
        setting = desc.setting_key,
        hint = desc.obtain_hint,
    )))
}

/// Validate API key (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}

/// Write a resolved key to the database, mirroring ENV keys into the TOML
/// file as a backup. TOML write failure is non-fatal once the database
/// write succeeded.
async fn migrate_key_to_database(
    desc: &KeyDescriptor,
    key: String,
    source: &str,
    db: &Pool<Sqlite>,
    toml_path: &Path,
) -> Result<()> {
    settings::set_setting(db, desc.setting_key, key.clone()).await?;

    if source == "environment" {
        let mut config: MiConfig = forkcast_common::config::load_toml_config(toml_path)?;
        match desc.setting_key {
            settings::GOOGLE_PLACES_API_KEY => config.google_places_api_key = Some(key),
            settings::ANTHROPIC_API_KEY => config.anthropic_api_key = Some(key),
            other => {
                return Err(Error::Internal(format!("unknown setting key: {}", other)));
            }
        }
        match forkcast_common::config::write_toml_config(&config, toml_path) {
            Ok(()) => info!("Settings synced to TOML: {}", toml_path.display()),
            Err(e) => warn!("TOML write failed (database write succeeded): {}", e),
        }
    }

    info!("{} migrated from {} to database", desc.display_name, source);
    Ok(())
}
