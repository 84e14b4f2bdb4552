//! Restaurant row access

use std::collections::HashMap;

use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use forkcast_common::{Error, Result};

use super::parse_timestamp;
use crate::models::{MenuStats, RestaurantRecord};

/// Load one restaurant by its places-provider identity.
pub async fn find_by_place_id(
    pool: &SqlitePool,
    place_id: &str,
) -> Result<Option<RestaurantRecord>> {
    let row = sqlx::query(
        r#"
        SELECT id, place_id, name, address, latitude, longitude, cuisine_type,
               menu_last_analyzed, contribution_count, created_at, updated_at
        FROM restaurants
        WHERE place_id = ?
        "#,
    )
    .bind(place_id)
    .fetch_optional(pool)
    .await?;

    row.map(parse_restaurant_row).transpose()
}

/// Aggregate per-restaurant menu stats, keyed by place id. Counts cover
/// active rows only. Used to annotate search and nearby results.
pub async fn menu_stats(pool: &SqlitePool) -> Result<HashMap<String, MenuStats>> {
    let rows = sqlx::query(
        r#"
        SELECT r.place_id, r.menu_last_analyzed, r.contribution_count,
               COUNT(m.id) AS item_count,
               COALESCE(SUM(CASE WHEN m.safety = 'safe' THEN 1 ELSE 0 END), 0) AS safe_item_count
        FROM restaurants r
        LEFT JOIN menu_items m ON m.restaurant_id = r.id AND m.active = 1
        GROUP BY r.id
        "#,
    )
    .fetch_all(pool)
    .await?;

    let mut stats = HashMap::with_capacity(rows.len());
    for row in rows {
        let place_id: String = row.get("place_id");
        let last_analyzed: Option<String> = row.get("menu_last_analyzed");
        let last_analyzed = last_analyzed
            .map(|s| parse_timestamp(&s, "menu_last_analyzed"))
            .transpose()?;
        stats.insert(
            place_id,
            MenuStats {
                item_count: row.get("item_count"),
                safe_item_count: row.get("safe_item_count"),
                last_analyzed,
                contribution_count: row.get("contribution_count"),
            },
        );
    }
    Ok(stats)
}

pub(crate) fn parse_restaurant_row(row: sqlx::sqlite::SqliteRow) -> Result<RestaurantRecord> {
    let id: String = row.get("id");
    let id = Uuid::parse_str(&id)
        .map_err(|e| Error::Internal(format!("Invalid restaurant id: {}", e)))?;

    let menu_last_analyzed: Option<String> = row.get("menu_last_analyzed");
    let menu_last_analyzed = menu_last_analyzed
        .map(|s| parse_timestamp(&s, "menu_last_analyzed"))
        .transpose()?;

    let created_at: String = row.get("created_at");
    let updated_at: String = row.get("updated_at");

    Ok(RestaurantRecord {
        id,
        place_id: row.get("place_id"),
        name: row.get("name"),
        address: row.get("address"),
        latitude: row.get("latitude"),
        longitude: row.get("longitude"),
        cuisine_type: row.get("cuisine_type"),
        menu_last_analyzed,
        contribution_count: row.get("contribution_count"),
        created_at: parse_timestamp(&created_at, "created_at")?,
        updated_at: parse_timestamp(&updated_at, "updated_at")?,
    })
}
