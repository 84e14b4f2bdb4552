//! Committed menu read endpoint
//!
//! Serves the active item set straight from the store. No provider or
//! vision call happens on this path.

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::protocols::validate_protocols;
use crate::error::ApiResult;
use crate::models::{Freshness, StoredMenuItem};
use crate::types::Safety;
use crate::AppState;

/// GET /restaurants/{place_id}/menu query parameters
#[derive(Debug, Deserialize)]
pub struct MenuParams {
    /// Comma-separated protocol ids, e.g. `low_fodmap,gluten_free`.
    pub protocols: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MenuResponse {
    pub place_id: String,
    pub restaurant_name: String,
    pub menu_items: Vec<StoredMenuItem>,
    pub item_count: usize,
    pub safe_items_count: usize,
    pub freshness: Freshness,
    pub freshness_nudge: &'static str,
    pub last_analyzed: DateTime<Utc>,
    pub days_since_analysis: i64,
    pub contribution_count: i64,
    pub analyzed_protocols: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matches_requested_protocols: Option<bool>,
}

/// GET /restaurants/{place_id}/menu?protocols=a,b
///
/// 404 when no analysis has been committed for this restaurant yet.
pub async fn read_menu(
    State(state): State<AppState>,
    Path(place_id): Path<String>,
    Query(params): Query<MenuParams>,
) -> ApiResult<Json<MenuResponse>> {
    let requested = params.protocols.as_deref().map(parse_protocol_list);
    if let Some(ids) = &requested {
        validate_protocols(&state.protocols, ids)?;
    }

    let view = state
        .pipeline
        .read_menu(&place_id, requested.as_deref())
        .await?;

    let safe_items_count = view
        .items
        .iter()
        .filter(|i| i.item.safety == Safety::Safe)
        .count();

    Ok(Json(MenuResponse {
        place_id: view.record.place_id,
        restaurant_name: view.record.name,
        item_count: view.items.len(),
        safe_items_count,
        menu_items: view.items,
        freshness: view.freshness,
        freshness_nudge: view.freshness.nudge(),
        last_analyzed: view.last_analyzed,
        days_since_analysis: view.days_since_analysis,
        contribution_count: view.record.contribution_count,
        analyzed_protocols: view.analyzed_protocols,
        matches_requested_protocols: view.matches_requested,
    }))
}

fn parse_protocol_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Build menu read routes
pub fn menu_routes() -> Router<AppState> {
    Router::new().route("/restaurants/:place_id/menu", get(read_menu))
}
