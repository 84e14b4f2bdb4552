//! Settings database access
//!
//! Key-value store backing API key persistence. Keys configured once (from
//! environment or config file) are written here so later runs need no
//! external configuration.

use sqlx::{Pool, Sqlite};
use std::str::FromStr;

use forkcast_common::{Error, Result};

pub const GOOGLE_PLACES_API_KEY: &str = "google_places_api_key";
pub const ANTHROPIC_API_KEY: &str = "anthropic_api_key";

/// Generic setting getter. Returns None if the key is absent.
pub async fn get_setting<T: FromStr>(db: &Pool<Sqlite>, key: &str) -> Result<Option<T>> {
    let value: Option<String> = sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_optional(db)
        .await?;

    match value {
        Some(s) => match s.parse::<T>() {
            Ok(parsed) => Ok(Some(parsed)),
            Err(_) => Err(Error::Config(format!(
                "Failed to parse setting '{}' value: {}",
                key, s
            ))),
        },
        None => Ok(None),
    }
}

/// Generic setting setter. Inserts or updates.
pub async fn set_setting<T: ToString>(db: &Pool<Sqlite>, key: &str, value: T) -> Result<()> {
    let value_str = value.to_string();

    sqlx::query(
        r#"
        INSERT INTO settings (key, value)
        VALUES (?, ?)
        ON CONFLICT(key) DO UPDATE SET value = excluded.value
        "#,
    )
    .bind(key)
    .bind(value_str)
    .execute(db)
    .await?;

    Ok(())
}
