//! Configuration loading and root folder resolution
//!
//! The root folder holds everything a Forkcast service writes: the SQLite
//! database and the per-service TOML config. Resolution priority:
//! 1. Command-line argument (highest priority)
//! 2. `FORKCAST_ROOT` environment variable
//! 3. `root_folder` key in the platform config file
//! 4. OS-dependent default (fallback)

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Resolves the root folder for a named service.
#[derive(Debug, Clone)]
pub struct RootFolderResolver {
    service_name: String,
}

impl RootFolderResolver {
    pub fn new(service_name: &str) -> Self {
        Self {
            service_name: service_name.to_string(),
        }
    }

    /// Resolve the root folder using the documented priority order.
    pub fn resolve(&self, cli_arg: Option<&Path>) -> PathBuf {
        // Priority 1: Command-line argument
        if let Some(path) = cli_arg {
            return path.to_path_buf();
        }

        // Priority 2: Environment variable
        if let Ok(path) = std::env::var("FORKCAST_ROOT") {
            if !path.trim().is_empty() {
                return PathBuf::from(path);
            }
        }

        // Priority 3: Platform config file
        if let Ok(config_path) = platform_config_file() {
            if let Ok(content) = std::fs::read_to_string(&config_path) {
                if let Ok(config) = toml::from_str::<toml::Value>(&content) {
                    if let Some(root) = config.get("root_folder").and_then(|v| v.as_str()) {
                        tracing::debug!(
                            service = %self.service_name,
                            config = %config_path.display(),
                            "Root folder taken from platform config file"
                        );
                        return PathBuf::from(root);
                    }
                }
            }
        }

        // Priority 4: OS-dependent default
        default_root_folder()
    }
}

/// Prepares a resolved root folder for use.
#[derive(Debug, Clone)]
pub struct RootFolderInitializer {
    root: PathBuf,
}

impl RootFolderInitializer {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Create the root folder if it does not exist yet.
    pub fn ensure_directory_exists(&self) -> Result<()> {
        if !self.root.exists() {
            std::fs::create_dir_all(&self.root)?;
            tracing::info!(root = %self.root.display(), "Created root folder");
        }
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the shared SQLite database inside the root folder.
    pub fn database_path(&self) -> PathBuf {
        self.root.join("forkcast.db")
    }

    /// Path of a per-service TOML config inside the root folder.
    pub fn service_config_path(&self, service_name: &str) -> PathBuf {
        self.root.join(format!("{}.toml", service_name))
    }
}

/// Locate the platform config file (`<config dir>/forkcast/config.toml`).
fn platform_config_file() -> Result<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("forkcast").join("config.toml"));

    if let Some(path) = &user_config {
        if path.exists() {
            return Ok(path.clone());
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/forkcast/config.toml");
        if system_config.exists() {
            return Ok(system_config);
        }
    }

    Err(Error::Config("No config file found".to_string()))
}

/// OS-dependent default root folder path.
fn default_root_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        dirs::data_local_dir()
            .map(|d| d.join("forkcast"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/forkcast"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("forkcast"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/forkcast"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("forkcast"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\forkcast"))
    } else {
        PathBuf::from("./forkcast_data")
    }
}

/// Load a TOML config file into a typed value.
///
/// A missing file yields the type's `Default`, so first start works without
/// any configuration present.
pub fn load_toml_config<T>(path: &Path) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    if !path.exists() {
        return Ok(T::default());
    }
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read TOML failed ({}): {}", path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse TOML failed ({}): {}", path.display(), e)))
}

/// Write a typed value to a TOML config file, creating parent directories.
pub fn write_toml_config<T>(value: &T, path: &Path) -> Result<()>
where
    T: Serialize,
{
    let content = toml::to_string_pretty(value)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, content)?;
    Ok(())
}
