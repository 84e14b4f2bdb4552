//! Database access for forkcast-mi
//!
//! One SQLite database (`forkcast.db` in the root folder) holds restaurant
//! identity rows, versioned menu item rows, and the settings key-value
//! table. Schema creation is idempotent at startup.

pub mod menu_store;
pub mod restaurants;
pub mod settings;

use std::path::Path;

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

/// Initialize database connection pool, creating the file and schema as
/// needed.
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // SQLite URI with mode=rwc (read, write, create)
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    tracing::debug!("Connecting to database: {}", db_url);

    let pool = SqlitePool::connect(&db_url).await?;
    init_tables(&pool).await?;

    Ok(pool)
}

async fn init_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS restaurants (
            id TEXT PRIMARY KEY,
            place_id TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            address TEXT,
            latitude REAL,
            longitude REAL,
            cuisine_type TEXT,
            menu_last_analyzed TEXT,
            contribution_count INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS menu_items (
            id TEXT PRIMARY KEY,
            restaurant_id TEXT NOT NULL REFERENCES restaurants(id),
            name TEXT NOT NULL,
            safety TEXT NOT NULL,
            triggers TEXT NOT NULL,
            notes TEXT NOT NULL DEFAULT '',
            protocols TEXT NOT NULL,
            active INTEGER NOT NULL DEFAULT 1,
            generation INTEGER NOT NULL,
            first_seen TEXT NOT NULL,
            last_seen TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_menu_items_restaurant_active
        ON menu_items(restaurant_id, active)
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    tracing::info!("Database tables initialized (restaurants, menu_items, settings)");

    Ok(())
}

/// Parse an RFC 3339 column value back to UTC.
pub(crate) fn parse_timestamp(value: &str, column: &str) -> forkcast_common::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| forkcast_common::Error::Internal(format!("Failed to parse {}: {}", column, e)))
}

#[cfg(test)]
pub(crate) async fn test_pool() -> SqlitePool {
    use sqlx::sqlite::SqlitePoolOptions;

    // One connection: a pooled :memory: database is per-connection.
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory pool");
    init_tables(&pool).await.expect("schema init");
    pool
}
