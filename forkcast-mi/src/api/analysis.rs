//! Menu analysis endpoints
//!
//! The catalog path screens provider photos before classification; the
//! submitted path trusts the caller's photo and classifies it directly.

use axum::{
    extract::{Path, State},
    routing::post,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::protocols::validate_protocols;
use crate::error::{ApiError, ApiResult};
use crate::models::{Freshness, StoredMenuItem};
use crate::pipeline::{AnalysisOutcome, ScreeningReport, SubmittedAnalysis};
use crate::types::MenuItem;
use crate::AppState;

/// POST /restaurants/{place_id}/analyze request body
#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    pub protocols: Vec<String>,
    #[serde(default)]
    pub force_refresh: bool,
    #[serde(default)]
    pub debug: bool,
}

/// POST /restaurants/{place_id}/analyze response
#[derive(Debug, Serialize)]
pub struct AnalyzeResponse {
    pub outcome: AnalysisOutcome,
    pub place_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restaurant_name: Option<String>,
    pub menu_items: Vec<StoredMenuItem>,
    pub item_count: usize,
    pub menu_photos_found: usize,
    pub photos_checked: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub freshness: Option<Freshness>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub freshness_nudge: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_analyzed: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contribution_count: Option<i64>,
    /// Per-photo screening trail, present when the request set `debug`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug: Option<ScreeningReport>,
}

/// POST /restaurants/{place_id}/analyze
///
/// Run the full catalog pipeline for a restaurant, or serve the cached
/// active set when the record is fresh.
pub async fn analyze_restaurant(
    State(state): State<AppState>,
    Path(place_id): Path<String>,
    Json(request): Json<AnalyzeRequest>,
) -> ApiResult<Json<AnalyzeResponse>> {
    require_protocols(&state, &request.protocols)?;

    tracing::info!(
        %place_id,
        protocols = ?request.protocols,
        force_refresh = request.force_refresh,
        "Catalog analysis requested"
    );

    let analysis = state
        .pipeline
        .analyze_catalog(
            &place_id,
            &request.protocols,
            request.force_refresh,
            request.debug,
        )
        .await?;

    let restaurant_name = analysis
        .record
        .as_ref()
        .map(|r| r.name.clone())
        .or_else(|| analysis.place.as_ref().map(|p| p.name.clone()));
    let last_analyzed = analysis.record.as_ref().and_then(|r| r.menu_last_analyzed);
    let contribution_count = analysis.record.as_ref().map(|r| r.contribution_count);

    Ok(Json(AnalyzeResponse {
        outcome: analysis.outcome,
        place_id,
        restaurant_name,
        item_count: analysis.items.len(),
        menu_items: analysis.items,
        menu_photos_found: analysis.menu_photos_found,
        photos_checked: analysis.photos_checked,
        freshness: analysis.freshness,
        freshness_nudge: analysis.freshness.map(|f| f.nudge()),
        last_analyzed,
        contribution_count,
        debug: analysis.report,
    }))
}

/// POST /analyze-menu request body
#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    /// Base64-encoded photo, with or without a data-url prefix.
    pub image: String,
    pub protocols: Vec<String>,
    /// When present, the result is committed as a contribution.
    pub place_id: Option<String>,
}

/// Items from a submitted-photo analysis. Committed passes carry store
/// metadata per item; transient passes carry the bare classification.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum SubmittedItems {
    Committed(Vec<StoredMenuItem>),
    Transient(Vec<MenuItem>),
}

impl SubmittedItems {
    fn len(&self) -> usize {
        match self {
            SubmittedItems::Committed(items) => items.len(),
            SubmittedItems::Transient(items) => items.len(),
        }
    }
}

/// POST /analyze-menu response
#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub menu_items: SubmittedItems,
    pub item_count: usize,
    pub committed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub place_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contribution_count: Option<i64>,
}

/// POST /analyze-menu
///
/// Classify a user-submitted menu photo. The gate is skipped: the user
/// pointed their camera at the menu on purpose.
pub async fn analyze_submitted_menu(
    State(state): State<AppState>,
    Json(request): Json<SubmitRequest>,
) -> ApiResult<Json<SubmitResponse>> {
    require_protocols(&state, &request.protocols)?;
    if request.image.trim().is_empty() {
        return Err(ApiError::BadRequest("image must not be empty".to_string()));
    }

    tracing::info!(
        protocols = ?request.protocols,
        place_id = ?request.place_id,
        "Submitted photo analysis requested"
    );

    let result = state
        .pipeline
        .analyze_submitted(request.image, &request.protocols, request.place_id.as_deref())
        .await?;

    let response = match result {
        SubmittedAnalysis::Transient { items } => {
            let menu_items = SubmittedItems::Transient(items);
            SubmitResponse {
                item_count: menu_items.len(),
                menu_items,
                committed: false,
                place_id: None,
                contribution_count: None,
            }
        }
        SubmittedAnalysis::Committed { record, items } => {
            let menu_items = SubmittedItems::Committed(items);
            SubmitResponse {
                item_count: menu_items.len(),
                menu_items,
                committed: true,
                place_id: Some(record.place_id),
                contribution_count: Some(record.contribution_count),
            }
        }
    };
    Ok(Json(response))
}

fn require_protocols(state: &AppState, protocols: &[String]) -> Result<(), ApiError> {
    if protocols.is_empty() {
        return Err(ApiError::BadRequest(
            "At least one protocol must be specified".to_string(),
        ));
    }
    validate_protocols(&state.protocols, protocols)
}

/// Build analysis routes
pub fn analysis_routes() -> Router<AppState> {
    Router::new()
        .route("/restaurants/:place_id/analyze", post(analyze_restaurant))
        .route("/analyze-menu", post(analyze_submitted_menu))
}
