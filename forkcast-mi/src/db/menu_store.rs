//! Freshness-aware menu store
//!
//! Owns the restaurant menu record lifecycle. Each committed contribution
//! runs as one transaction: upsert the restaurant identity row, deactivate
//! the previous active item set (soft delete, rows are never erased),
//! insert the new active set tagged with the next generation number, stamp
//! `menu_last_analyzed`, and increment `contribution_count`. Concurrent
//! writers serialize on the transaction; the last committed writer wins and
//! no reader ever sees a mix of two passes.
//!
//! Replacement rows inherit the earliest `first_seen` recorded for their
//! dedup key, so "how long has this item been on the menu" survives
//! re-analysis.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use forkcast_common::{Error, Result};

use super::parse_timestamp;
use super::restaurants::find_by_place_id;
use crate::models::{RestaurantIdentity, RestaurantRecord, StoredMenuItem};
use crate::types::{MenuItem, Safety};

/// Load a restaurant's active item set, in the order the committing pass
/// produced it. None when the restaurant has never been committed.
pub async fn load_active_menu(
    pool: &SqlitePool,
    place_id: &str,
) -> Result<Option<(RestaurantRecord, Vec<StoredMenuItem>)>> {
    let Some(restaurant) = find_by_place_id(pool, place_id).await? else {
        return Ok(None);
    };

    let rows = sqlx::query(
        r#"
        SELECT id, restaurant_id, name, safety, triggers, notes, protocols,
               active, generation, first_seen, last_seen
        FROM menu_items
        WHERE restaurant_id = ? AND active = 1
        ORDER BY rowid
        "#,
    )
    .bind(restaurant.id.to_string())
    .fetch_all(pool)
    .await?;

    let items = rows
        .into_iter()
        .map(parse_item_row)
        .collect::<Result<Vec<_>>>()?;

    Ok(Some((restaurant, items)))
}

/// Commit one analysis pass atomically and return the post-commit record
/// and active set.
pub async fn commit_contribution(
    pool: &SqlitePool,
    identity: &RestaurantIdentity,
    protocol_ids: &[String],
    items: &[MenuItem],
    now: DateTime<Utc>,
) -> Result<(RestaurantRecord, Vec<StoredMenuItem>)> {
    let protocols_json = serde_json::to_string(protocol_ids)
        .map_err(|e| Error::Internal(format!("Failed to serialize protocols: {}", e)))?;
    let now_str = now.to_rfc3339();

    let mut tx = pool.begin().await?;

    // Restaurant identity row: insert on first contribution, refresh
    // provider fields afterwards.
    let row = sqlx::query("SELECT id, contribution_count FROM restaurants WHERE place_id = ?")
        .bind(&identity.place_id)
        .fetch_optional(&mut *tx)
        .await?;

    let (restaurant_id, prior_contributions) = match row {
        Some(row) => {
            let id: String = row.get("id");
            let count: i64 = row.get("contribution_count");
            sqlx::query(
                r#"
                UPDATE restaurants
                SET name = ?, address = ?, latitude = ?, longitude = ?,
                    cuisine_type = ?, updated_at = ?
                WHERE id = ?
                "#,
            )
            .bind(&identity.name)
            .bind(&identity.address)
            .bind(identity.latitude)
            .bind(identity.longitude)
            .bind(&identity.cuisine_type)
            .bind(&now_str)
            .bind(&id)
            .execute(&mut *tx)
            .await?;
            (id, count)
        }
        None => {
            let id = Uuid::new_v4().to_string();
            sqlx::query(
                r#"
                INSERT INTO restaurants (
                    id, place_id, name, address, latitude, longitude,
                    cuisine_type, contribution_count, created_at, updated_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, 0, ?, ?)
                "#,
            )
            .bind(&id)
            .bind(&identity.place_id)
            .bind(&identity.name)
            .bind(&identity.address)
            .bind(identity.latitude)
            .bind(identity.longitude)
            .bind(&identity.cuisine_type)
            .bind(&now_str)
            .bind(&now_str)
            .execute(&mut *tx)
            .await?;
            (id, 0)
        }
    };

    let generation = prior_contributions + 1;

    // Earliest first_seen per dedup key across all history for this
    // restaurant, inherited by the replacement rows.
    let mut first_seen_by_key: HashMap<String, String> = HashMap::new();
    let rows = sqlx::query(
        r#"
        SELECT LOWER(TRIM(name)) AS dedup_key, MIN(first_seen) AS first_seen
        FROM menu_items
        WHERE restaurant_id = ?
        GROUP BY LOWER(TRIM(name))
        "#,
    )
    .bind(&restaurant_id)
    .fetch_all(&mut *tx)
    .await?;
    for row in rows {
        first_seen_by_key.insert(row.get("dedup_key"), row.get("first_seen"));
    }

    sqlx::query("UPDATE menu_items SET active = 0 WHERE restaurant_id = ? AND active = 1")
        .bind(&restaurant_id)
        .execute(&mut *tx)
        .await?;

    for item in items {
        let triggers_json = serde_json::to_string(&item.triggers)
            .map_err(|e| Error::Internal(format!("Failed to serialize triggers: {}", e)))?;
        let first_seen = first_seen_by_key
            .get(&item.dedup_key())
            .cloned()
            .unwrap_or_else(|| now_str.clone());

        sqlx::query(
            r#"
            INSERT INTO menu_items (
                id, restaurant_id, name, safety, triggers, notes, protocols,
                active, generation, first_seen, last_seen
            ) VALUES (?, ?, ?, ?, ?, ?, ?, 1, ?, ?, ?)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&restaurant_id)
        .bind(&item.name)
        .bind(item.safety.as_str())
        .bind(&triggers_json)
        .bind(&item.notes)
        .bind(&protocols_json)
        .bind(generation)
        .bind(&first_seen)
        .bind(&now_str)
        .execute(&mut *tx)
        .await?;
    }

    sqlx::query(
        r#"
        UPDATE restaurants
        SET menu_last_analyzed = ?, contribution_count = contribution_count + 1, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&now_str)
    .bind(&now_str)
    .bind(&restaurant_id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::info!(
        place_id = %identity.place_id,
        items = items.len(),
        generation,
        "Menu contribution committed"
    );

    load_active_menu(pool, &identity.place_id)
        .await?
        .ok_or_else(|| Error::Internal("restaurant row missing after commit".to_string()))
}

fn parse_item_row(row: sqlx::sqlite::SqliteRow) -> Result<StoredMenuItem> {
    let id: String = row.get("id");
    let id =
        Uuid::parse_str(&id).map_err(|e| Error::Internal(format!("Invalid item id: {}", e)))?;
    let restaurant_id: String = row.get("restaurant_id");
    let restaurant_id = Uuid::parse_str(&restaurant_id)
        .map_err(|e| Error::Internal(format!("Invalid restaurant id: {}", e)))?;

    let safety: String = row.get("safety");
    let safety = safety.parse::<Safety>().map_err(Error::Internal)?;

    let triggers: String = row.get("triggers");
    let triggers: Vec<String> = serde_json::from_str(&triggers)
        .map_err(|e| Error::Internal(format!("Failed to deserialize triggers: {}", e)))?;

    let protocols: String = row.get("protocols");
    let protocols: Vec<String> = serde_json::from_str(&protocols)
        .map_err(|e| Error::Internal(format!("Failed to deserialize protocols: {}", e)))?;

    let first_seen: String = row.get("first_seen");
    let last_seen: String = row.get("last_seen");

    Ok(StoredMenuItem {
        id,
        restaurant_id,
        item: MenuItem {
            name: row.get("name"),
            safety,
            triggers,
            notes: row.get("notes"),
        },
        protocols,
        active: row.get::<i64, _>("active") != 0,
        generation: row.get("generation"),
        first_seen: parse_timestamp(&first_seen, "first_seen")?,
        last_seen: parse_timestamp(&last_seen, "last_seen")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use chrono::TimeZone;

    fn identity(place_id: &str, name: &str) -> RestaurantIdentity {
        RestaurantIdentity {
            place_id: place_id.to_string(),
            name: name.to_string(),
            address: Some("1 Main St".to_string()),
            latitude: Some(37.77),
            longitude: Some(-122.42),
            cuisine_type: Some("Thai".to_string()),
        }
    }

    fn item(name: &str, safety: Safety, notes: &str) -> MenuItem {
        MenuItem {
            name: name.to_string(),
            safety,
            triggers: Vec::new(),
            notes: notes.to_string(),
        }
    }

    fn protocols(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    fn at(year: i32, month: u32, day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(year, month, day, 12, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn first_commit_creates_record_and_active_set() {
        let db = test_pool().await;
        let now = at(2025, 3, 1);

        let (record, items) = commit_contribution(
            &db,
            &identity("place-1", "Thai Garden"),
            &protocols(&["vegan"]),
            &[
                item("Garden Salad", Safety::Safe, "no triggers"),
                item("Chicken Caesar", Safety::Avoid, "contains meat"),
            ],
            now,
        )
        .await
        .unwrap();

        assert_eq!(record.place_id, "place-1");
        assert_eq!(record.contribution_count, 1);
        assert_eq!(record.menu_last_analyzed, Some(now));
        assert_eq!(record.cuisine_type.as_deref(), Some("Thai"));

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].item.name, "Garden Salad");
        assert_eq!(items[0].generation, 1);
        assert!(items[0].active);
        assert_eq!(items[0].protocols, protocols(&["vegan"]));
        assert_eq!(items[0].first_seen, now);
        assert_eq!(items[1].item.safety, Safety::Avoid);
    }

    #[tokio::test]
    async fn load_returns_none_before_any_commit() {
        let db = test_pool().await;
        let loaded = load_active_menu(&db, "never-seen").await.unwrap();
        assert!(loaded.is_none());
    }

    #[tokio::test]
    async fn second_commit_supersedes_active_set() {
        let db = test_pool().await;
        let t1 = at(2025, 3, 1);
        let t2 = at(2025, 3, 15);

        commit_contribution(
            &db,
            &identity("place-1", "Thai Garden"),
            &protocols(&["vegan"]),
            &[
                item("Garden Salad", Safety::Safe, "ok"),
                item("Spring Rolls", Safety::Caution, "ask about the wrapper"),
            ],
            t1,
        )
        .await
        .unwrap();

        let (record, items) = commit_contribution(
            &db,
            &identity("place-1", "Thai Garden"),
            &protocols(&["vegan"]),
            &[item("garden salad ", Safety::Safe, "confirmed no triggers")],
            t2,
        )
        .await
        .unwrap();

        assert_eq!(record.contribution_count, 2);
        assert_eq!(record.menu_last_analyzed, Some(t2));

        // Only the new pass is active.
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].generation, 2);
        assert_eq!(items[0].last_seen, t2);
        // Same dedup key as the first pass, so first_seen is inherited.
        assert_eq!(items[0].first_seen, t1);

        // Superseded rows are kept, not erased.
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM menu_items")
            .fetch_one(&db)
            .await
            .unwrap();
        assert_eq!(total, 3);
        let active: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM menu_items WHERE active = 1")
                .fetch_one(&db)
                .await
                .unwrap();
        assert_eq!(active, 1);
    }

    #[tokio::test]
    async fn new_item_name_gets_fresh_first_seen() {
        let db = test_pool().await;
        let t1 = at(2025, 3, 1);
        let t2 = at(2025, 4, 20);

        commit_contribution(
            &db,
            &identity("place-1", "Thai Garden"),
            &protocols(&["vegan"]),
            &[item("Garden Salad", Safety::Safe, "")],
            t1,
        )
        .await
        .unwrap();

        let (_, items) = commit_contribution(
            &db,
            &identity("place-1", "Thai Garden"),
            &protocols(&["vegan"]),
            &[
                item("Garden Salad", Safety::Safe, ""),
                item("Pad See Ew", Safety::Avoid, "soy sauce contains wheat"),
            ],
            t2,
        )
        .await
        .unwrap();

        assert_eq!(items[0].first_seen, t1);
        assert_eq!(items[1].first_seen, t2);
    }

    #[tokio::test]
    async fn recommit_refreshes_identity_without_duplicating_rows() {
        let db = test_pool().await;

        commit_contribution(
            &db,
            &identity("place-1", "Old Name"),
            &protocols(&["vegan"]),
            &[item("Salad", Safety::Safe, "")],
            at(2025, 3, 1),
        )
        .await
        .unwrap();

        let (record, _) = commit_contribution(
            &db,
            &identity("place-1", "New Name"),
            &protocols(&["vegan"]),
            &[item("Salad", Safety::Safe, "")],
            at(2025, 3, 2),
        )
        .await
        .unwrap();

        assert_eq!(record.name, "New Name");
        let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM restaurants")
            .fetch_one(&db)
            .await
            .unwrap();
        assert_eq!(rows, 1);
    }

    #[tokio::test]
    async fn empty_item_set_still_counts_as_a_contribution() {
        let db = test_pool().await;
        let now = at(2025, 3, 1);

        let (record, items) = commit_contribution(
            &db,
            &identity("place-1", "Thai Garden"),
            &protocols(&["vegan"]),
            &[],
            now,
        )
        .await
        .unwrap();

        assert_eq!(record.contribution_count, 1);
        assert_eq!(record.menu_last_analyzed, Some(now));
        assert!(items.is_empty());
    }

    #[tokio::test]
    async fn active_set_preserves_commit_order() {
        let db = test_pool().await;

        let (_, items) = commit_contribution(
            &db,
            &identity("place-1", "Thai Garden"),
            &protocols(&["vegan"]),
            &[
                item("Zucchini Fritters", Safety::Caution, ""),
                item("Apple Crumble", Safety::Avoid, ""),
                item("Miso Soup", Safety::Safe, ""),
            ],
            at(2025, 3, 1),
        )
        .await
        .unwrap();

        let names: Vec<&str> = items.iter().map(|i| i.item.name.as_str()).collect();
        assert_eq!(names, vec!["Zucchini Fritters", "Apple Crumble", "Miso Soup"]);
    }

    #[tokio::test]
    async fn stats_reflect_active_set_only() {
        let db = test_pool().await;

        commit_contribution(
            &db,
            &identity("place-1", "Thai Garden"),
            &protocols(&["vegan"]),
            &[
                item("Salad", Safety::Safe, ""),
                item("Curry", Safety::Avoid, ""),
            ],
            at(2025, 3, 1),
        )
        .await
        .unwrap();

        commit_contribution(
            &db,
            &identity("place-1", "Thai Garden"),
            &protocols(&["vegan"]),
            &[
                item("Salad", Safety::Safe, ""),
                item("Tofu Skewers", Safety::Safe, ""),
            ],
            at(2025, 3, 10),
        )
        .await
        .unwrap();

        let stats = crate::db::restaurants::menu_stats(&db).await.unwrap();
        let entry = stats.get("place-1").unwrap();
        assert_eq!(entry.item_count, 2);
        assert_eq!(entry.safe_item_count, 2);
        assert_eq!(entry.contribution_count, 2);
        assert_eq!(entry.last_analyzed, Some(at(2025, 3, 10)));
    }
}
