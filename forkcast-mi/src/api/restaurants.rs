//! Restaurant discovery endpoints
//!
//! Thin wrappers over the places provider, annotated with what this
//! service already knows: whether a committed menu record exists, how many
//! items it holds, and when it was last analyzed.

use std::collections::HashMap;

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::db::restaurants::menu_stats;
use crate::error::{ApiError, ApiResult};
use crate::geo;
use crate::models::MenuStats;
use crate::pipeline::map_places_error;
use crate::services::places_client::{cuisine_type, PlaceDetails, PlaceSummary};
use crate::AppState;

const DEFAULT_RADIUS_M: f64 = 5000.0;
const MAX_RADIUS_M: f64 = 50000.0;

const DEFAULT_PHOTO_WIDTH: u32 = 800;
const MAX_PHOTO_WIDTH: u32 = 1600;

/// What this service knows about a restaurant beyond the provider record.
#[derive(Debug, Default, Serialize)]
pub struct MenuAnnotation {
    pub has_menu_data: bool,
    pub menu_item_count: i64,
    pub safe_items_count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_analyzed: Option<chrono::DateTime<chrono::Utc>>,
}

impl From<&MenuStats> for MenuAnnotation {
    fn from(stats: &MenuStats) -> Self {
        Self {
            has_menu_data: stats.item_count > 0,
            menu_item_count: stats.item_count,
            safe_items_count: stats.safe_item_count,
            last_analyzed: stats.last_analyzed,
        }
    }
}

fn annotation_for(stats: &HashMap<String, MenuStats>, place_id: &str) -> MenuAnnotation {
    stats.get(place_id).map(MenuAnnotation::from).unwrap_or_default()
}

/// GET /restaurants/search query parameters
#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub query: String,
    pub location: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RestaurantSummary {
    #[serde(flatten)]
    pub place: PlaceSummary,
    pub cuisine_type: String,
    #[serde(flatten)]
    pub menu: MenuAnnotation,
}

#[derive(Debug, Serialize)]
pub struct RestaurantListResponse {
    pub restaurants: Vec<RestaurantSummary>,
    pub count: usize,
}

/// GET /restaurants/search?query=&location=
///
/// Best provider match for a free-text query (zero or one result).
pub async fn search_restaurants(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> ApiResult<Json<RestaurantListResponse>> {
    let query = params.query.trim();
    if query.is_empty() {
        return Err(ApiError::BadRequest("query must not be empty".to_string()));
    }

    let found = state
        .places
        .text_search(query, params.location.as_deref())
        .await
        .map_err(map_places_error)
        .map_err(ApiError::from)?;

    let stats = menu_stats(&state.db).await?;
    let restaurants: Vec<RestaurantSummary> = found
        .into_iter()
        .map(|place| RestaurantSummary {
            cuisine_type: cuisine_type(&place.types),
            menu: annotation_for(&stats, &place.place_id),
            place,
        })
        .collect();

    tracing::debug!(query, count = restaurants.len(), "Restaurant search");
    Ok(Json(RestaurantListResponse {
        count: restaurants.len(),
        restaurants,
    }))
}

/// GET /restaurants/nearby query parameters
#[derive(Debug, Deserialize)]
pub struct NearbyParams {
    pub latitude: f64,
    pub longitude: f64,
    pub radius_meters: Option<f64>,
    pub cuisine_type: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct NearbyRestaurant {
    #[serde(flatten)]
    pub place: PlaceSummary,
    pub cuisine_type: String,
    /// Haversine distance from the query point, whole meters.
    pub distance_meters: i64,
    #[serde(flatten)]
    pub menu: MenuAnnotation,
}

#[derive(Debug, Serialize)]
pub struct NearbyResponse {
    pub restaurants: Vec<NearbyRestaurant>,
    pub count: usize,
    pub radius_meters: f64,
}

/// GET /restaurants/nearby?latitude=&longitude=&radius_meters=&cuisine_type=
///
/// Provider results within the radius, closest first.
pub async fn nearby_restaurants(
    State(state): State<AppState>,
    Query(params): Query<NearbyParams>,
) -> ApiResult<Json<NearbyResponse>> {
    let radius = params.radius_meters.unwrap_or(DEFAULT_RADIUS_M);
    if !(0.0..=MAX_RADIUS_M).contains(&radius) {
        return Err(ApiError::BadRequest(format!(
            "radius_meters must be between 0 and {}",
            MAX_RADIUS_M
        )));
    }

    let candidates = state
        .places
        .nearby_search(
            params.latitude,
            params.longitude,
            params.cuisine_type.as_deref(),
        )
        .await
        .map_err(map_places_error)
        .map_err(ApiError::from)?;

    let ranked = geo::rank_nearby(
        params.latitude,
        params.longitude,
        candidates,
        radius,
        |place: &PlaceSummary| (place.latitude, place.longitude),
    );

    let stats = menu_stats(&state.db).await?;
    let restaurants: Vec<NearbyRestaurant> = ranked
        .into_iter()
        .map(|ranked| NearbyRestaurant {
            cuisine_type: cuisine_type(&ranked.candidate.types),
            distance_meters: ranked.distance_meters.round() as i64,
            menu: annotation_for(&stats, &ranked.candidate.place_id),
            place: ranked.candidate,
        })
        .collect();

    tracing::debug!(
        latitude = params.latitude,
        longitude = params.longitude,
        radius,
        count = restaurants.len(),
        "Nearby restaurant search"
    );
    Ok(Json(NearbyResponse {
        count: restaurants.len(),
        restaurants,
        radius_meters: radius,
    }))
}

#[derive(Debug, Serialize)]
pub struct RestaurantDetailsResponse {
    #[serde(flatten)]
    pub place: PlaceDetails,
    pub cuisine_type: String,
    #[serde(flatten)]
    pub menu: MenuAnnotation,
}

/// GET /restaurants/{place_id}/details
///
/// Full provider record merged with local menu state.
pub async fn restaurant_details(
    State(state): State<AppState>,
    Path(place_id): Path<String>,
) -> ApiResult<Json<RestaurantDetailsResponse>> {
    let details = state
        .places
        .place_details(&place_id)
        .await
        .map_err(map_places_error)
        .map_err(ApiError::from)?;

    let stats = menu_stats(&state.db).await?;
    Ok(Json(RestaurantDetailsResponse {
        cuisine_type: cuisine_type(&details.types),
        menu: annotation_for(&stats, &place_id),
        place: details,
    }))
}

/// GET /restaurants/{place_id}/photos/{photo_reference} query parameters
#[derive(Debug, Deserialize)]
pub struct PhotoParams {
    pub max_width: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct PhotoUrlResponse {
    pub photo_url: String,
    pub max_width: u32,
}

/// GET /restaurants/{place_id}/photos/{photo_reference}?max_width=
///
/// Resolve a photo reference into a provider URL the client can fetch
/// directly. Width defaults to 800 and caps at 1600.
pub async fn restaurant_photo(
    State(state): State<AppState>,
    Path((place_id, photo_reference)): Path<(String, String)>,
    Query(params): Query<PhotoParams>,
) -> ApiResult<Json<PhotoUrlResponse>> {
    let max_width = params
        .max_width
        .unwrap_or(DEFAULT_PHOTO_WIDTH)
        .min(MAX_PHOTO_WIDTH);
    tracing::debug!(%place_id, max_width, "Photo URL request");
    Ok(Json(PhotoUrlResponse {
        photo_url: state.places.photo_url(&photo_reference, max_width),
        max_width,
    }))
}

/// Build restaurant discovery routes
pub fn restaurant_routes() -> Router<AppState> {
    Router::new()
        .route("/restaurants/search", get(search_restaurants))
        .route("/restaurants/nearby", get(nearby_restaurants))
        .route("/restaurants/:place_id/details", get(restaurant_details))
        .route(
            "/restaurants/:place_id/photos/:photo_reference",
            get(restaurant_photo),
        )
}
