//! Places provider client
//!
//! Read-only client for the Google Places Web Service API: restaurant text
//! search, paginated nearby search, place details (with photo references),
//! and photo download. The pipeline never writes to this provider.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

const DEFAULT_BASE_URL: &str = "https://maps.googleapis.com/maps/api/place";
const USER_AGENT: &str = "forkcast-mi/0.1.0";

/// Provider-imposed delay before a next_page_token becomes usable.
const PAGE_TOKEN_DELAY: Duration = Duration::from_secs(2);
/// Nearby search pages fetched at most (provider caps results at 3 x 20).
const MAX_NEARBY_PAGES: usize = 3;
/// Photo references surfaced from place details.
const MAX_PHOTO_REFS: usize = 10;

const METADATA_TIMEOUT: Duration = Duration::from_secs(10);
const PHOTO_TIMEOUT: Duration = Duration::from_secs(30);

/// Places client errors
#[derive(Debug, Error)]
pub enum PlacesError {
    #[error("Places API key not configured")]
    MissingApiKey,

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Places API returned status {status}")]
    Api {
        status: String,
        message: Option<String>,
    },

    #[error("Place not found")]
    NotFound,
}

// ============================================================================
// Wire format
// ============================================================================

#[derive(Debug, Deserialize)]
struct SearchResponse {
    status: String,
    #[serde(default)]
    results: Vec<RawPlace>,
    next_page_token: Option<String>,
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DetailsResponse {
    status: String,
    result: Option<RawPlace>,
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawPlace {
    place_id: String,
    name: String,
    formatted_address: Option<String>,
    vicinity: Option<String>,
    geometry: Option<RawGeometry>,
    rating: Option<f64>,
    user_ratings_total: Option<u32>,
    price_level: Option<u8>,
    #[serde(default)]
    types: Vec<String>,
    business_status: Option<String>,
    website: Option<String>,
    formatted_phone_number: Option<String>,
    opening_hours: Option<RawOpeningHours>,
    #[serde(default)]
    photos: Vec<RawPhoto>,
}

#[derive(Debug, Deserialize)]
struct RawGeometry {
    location: RawLatLng,
}

#[derive(Debug, Deserialize)]
struct RawLatLng {
    lat: f64,
    lng: f64,
}

#[derive(Debug, Deserialize)]
struct RawOpeningHours {
    open_now: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct RawPhoto {
    photo_reference: String,
    width: Option<u32>,
    height: Option<u32>,
    #[serde(default)]
    html_attributions: Vec<String>,
}

// ============================================================================
// Domain shapes
// ============================================================================

/// One place as returned by text or nearby search.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaceSummary {
    pub place_id: String,
    pub name: String,
    pub address: Option<String>,
    pub vicinity: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub rating: Option<f64>,
    pub user_ratings_total: Option<u32>,
    pub price_level: Option<u8>,
    pub types: Vec<String>,
    pub business_status: Option<String>,
    pub photos_available: bool,
    pub is_open: Option<bool>,
}

/// One photo reference from place details.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhotoRef {
    pub photo_reference: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub html_attributions: Vec<String>,
}

/// Full place record from the details endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaceDetails {
    pub place_id: String,
    pub name: String,
    pub address: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub rating: Option<f64>,
    pub user_ratings_total: Option<u32>,
    pub price_level: Option<u8>,
    pub types: Vec<String>,
    pub website: Option<String>,
    pub phone: Option<String>,
    pub business_status: Option<String>,
    pub photos: Vec<PhotoRef>,
}

/// Rows without coordinates cannot be ranked or stored; drop them.
fn summarize(raw: RawPlace) -> Option<PlaceSummary> {
    let location = raw.geometry.as_ref()?;
    Some(PlaceSummary {
        place_id: raw.place_id,
        name: raw.name,
        address: raw.formatted_address,
        vicinity: raw.vicinity,
        latitude: location.location.lat,
        longitude: location.location.lng,
        rating: raw.rating,
        user_ratings_total: raw.user_ratings_total,
        price_level: raw.price_level,
        types: raw.types,
        business_status: raw.business_status,
        photos_available: !raw.photos.is_empty(),
        is_open: raw.opening_hours.and_then(|h| h.open_now),
    })
}

fn detail(raw: RawPlace) -> Option<PlaceDetails> {
    let location = raw.geometry.as_ref()?;
    let photos = raw
        .photos
        .iter()
        .take(MAX_PHOTO_REFS)
        .map(|p| PhotoRef {
            photo_reference: p.photo_reference.clone(),
            width: p.width,
            height: p.height,
            html_attributions: p.html_attributions.clone(),
        })
        .collect();
    Some(PlaceDetails {
        place_id: raw.place_id,
        name: raw.name,
        address: raw.formatted_address,
        latitude: location.location.lat,
        longitude: location.location.lng,
        rating: raw.rating,
        user_ratings_total: raw.user_ratings_total,
        price_level: raw.price_level,
        types: raw.types,
        website: raw.website,
        phone: raw.formatted_phone_number,
        business_status: raw.business_status,
        photos,
    })
}

/// Human-readable cuisine label derived from place types.
pub fn cuisine_type(types: &[String]) -> String {
    const CUISINE_MAPPING: &[(&str, &str)] = &[
        ("italian_restaurant", "Italian"),
        ("mexican_restaurant", "Mexican"),
        ("chinese_restaurant", "Chinese"),
        ("japanese_restaurant", "Japanese"),
        ("thai_restaurant", "Thai"),
        ("indian_restaurant", "Indian"),
        ("french_restaurant", "French"),
        ("american_restaurant", "American"),
        ("mediterranean_restaurant", "Mediterranean"),
        ("greek_restaurant", "Greek"),
        ("korean_restaurant", "Korean"),
        ("vietnamese_restaurant", "Vietnamese"),
        ("spanish_restaurant", "Spanish"),
        ("middle_eastern_restaurant", "Middle Eastern"),
        ("seafood_restaurant", "Seafood"),
        ("steak_house", "Steakhouse"),
        ("sushi_restaurant", "Sushi"),
        ("pizza_restaurant", "Pizza"),
        ("fast_food_restaurant", "Fast Food"),
        ("cafe", "Cafe"),
        ("bakery", "Bakery"),
        ("bar", "Bar & Grill"),
    ];

    for place_type in types {
        if let Some((_, cuisine)) = CUISINE_MAPPING
            .iter()
            .find(|(key, _)| key == &place_type.as_str())
        {
            return (*cuisine).to_string();
        }
    }
    "Restaurant".to_string()
}

// ============================================================================
// Client
// ============================================================================

/// Places provider API client
pub struct PlacesClient {
    http_client: reqwest::Client,
    photo_client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl PlacesClient {
    pub fn new(api_key: String) -> Result<Self, PlacesError> {
        Self::with_base_url(api_key, DEFAULT_BASE_URL.to_string())
    }

    /// Construct against an alternate base URL (test servers).
    pub fn with_base_url(api_key: String, base_url: String) -> Result<Self, PlacesError> {
        if api_key.trim().is_empty() {
            return Err(PlacesError::MissingApiKey);
        }
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(METADATA_TIMEOUT)
            .build()?;
        let photo_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(PHOTO_TIMEOUT)
            .build()?;

        Ok(Self {
            http_client,
            photo_client,
            api_key,
            base_url,
        })
    }

    /// Search for a restaurant by name and optional location.
    ///
    /// Returns the first (best) match, or None when the provider has no
    /// results for the query.
    pub async fn text_search(
        &self,
        query: &str,
        location: Option<&str>,
    ) -> Result<Option<PlaceSummary>, PlacesError> {
        let search_query = match location {
            Some(location) => format!("{} {}", query, location),
            None => query.to_string(),
        };

        debug!(query = %search_query, "Places text search");

        let response: SearchResponse = self
            .http_client
            .get(format!("{}/textsearch/json", self.base_url))
            .query(&[
                ("query", search_query.as_str()),
                ("type", "restaurant"),
                ("key", self.api_key.as_str()),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        match response.status.as_str() {
            "OK" => Ok(response.results.into_iter().find_map(summarize)),
            "ZERO_RESULTS" => Ok(None),
            status => Err(PlacesError::Api {
                status: status.to_string(),
                message: response.error_message,
            }),
        }
    }

    /// Find restaurants near a location, closest first.
    ///
    /// Fetches up to three pages of provider results, honoring the required
    /// delay before each next_page_token becomes valid. Radius filtering is
    /// the caller's concern (`geo::rank_nearby`); the provider is queried
    /// with rankby=distance, which excludes an explicit radius parameter.
    pub async fn nearby_search(
        &self,
        latitude: f64,
        longitude: f64,
        keyword: Option<&str>,
    ) -> Result<Vec<PlaceSummary>, PlacesError> {
        let location = format!("{},{}", latitude, longitude);
        let mut places: Vec<PlaceSummary> = Vec::new();
        let mut next_page_token: Option<String> = None;

        for page in 0..MAX_NEARBY_PAGES {
            let mut params: Vec<(&str, &str)> = vec![
                ("location", location.as_str()),
                ("type", "restaurant"),
                ("rankby", "distance"),
                ("key", self.api_key.as_str()),
            ];
            if let Some(keyword) = keyword {
                params.push(("keyword", keyword));
            }
            let token = next_page_token.take();
            if let Some(token) = token.as_deref() {
                // Tokens are not valid immediately after issue
                tokio::time::sleep(PAGE_TOKEN_DELAY).await;
                params.push(("pagetoken", token));
            }

            let page_result = self
                .http_client
                .get(format!("{}/nearbysearch/json", self.base_url))
                .query(&params)
                .send()
                .await
                .and_then(|r| r.error_for_status());

            let response: SearchResponse = match page_result {
                Ok(response) => response.json().await?,
                Err(e) if page == 0 => return Err(e.into()),
                Err(e) => {
                    // Later pages degrade to a partial result set
                    warn!(page, error = %e, "Nearby search page failed; returning partial results");
                    break;
                }
            };

            match response.status.as_str() {
                "OK" | "ZERO_RESULTS" => {}
                status => {
                    if page == 0 {
                        return Err(PlacesError::Api {
                            status: status.to_string(),
                            message: response.error_message,
                        });
                    }
                    warn!(page, status, "Nearby search page returned error status");
                    break;
                }
            }

            places.extend(response.results.into_iter().filter_map(summarize));

            next_page_token = response.next_page_token;
            if next_page_token.is_none() {
                break;
            }
        }

        debug!(count = places.len(), "Nearby search complete");
        Ok(places)
    }

    /// Fetch the full place record, including up to 10 photo references.
    ///
    /// `Err(NotFound)` means the provider does not know this place id, which
    /// is the one genuine not-found in the analysis path.
    pub async fn place_details(&self, place_id: &str) -> Result<PlaceDetails, PlacesError> {
        const FIELDS: &str = "place_id,name,formatted_address,geometry,rating,\
                              user_ratings_total,price_level,types,website,\
                              formatted_phone_number,opening_hours,photos,business_status";

        debug!(place_id = %place_id, "Places details lookup");

        let response: DetailsResponse = self
            .http_client
            .get(format!("{}/details/json", self.base_url))
            .query(&[
                ("place_id", place_id),
                ("fields", FIELDS),
                ("key", self.api_key.as_str()),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        match response.status.as_str() {
            "OK" => response
                .result
                .and_then(detail)
                .ok_or(PlacesError::NotFound),
            "NOT_FOUND" | "ZERO_RESULTS" | "INVALID_REQUEST" => Err(PlacesError::NotFound),
            status => Err(PlacesError::Api {
                status: status.to_string(),
                message: response.error_message,
            }),
        }
    }

    /// URL to fetch one place photo at the given maximum width.
    pub fn photo_url(&self, photo_reference: &str, max_width: u32) -> String {
        format!(
            "{}/photo?maxwidth={}&photo_reference={}&key={}",
            self.base_url,
            max_width.min(1600),
            photo_reference,
            self.api_key
        )
    }

    /// Download one place photo. Redirects are followed; the photo endpoint
    /// serves bytes from a redirect target.
    pub async fn download_photo(
        &self,
        photo_reference: &str,
        max_width: u32,
    ) -> Result<Vec<u8>, PlacesError> {
        let url = self.photo_url(photo_reference, max_width);
        let response = self.photo_client.get(url).send().await?.error_for_status()?;
        Ok(response.bytes().await?.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_requires_api_key() {
        assert!(matches!(
            PlacesClient::new("  ".to_string()),
            Err(PlacesError::MissingApiKey)
        ));
        assert!(PlacesClient::new("key".to_string()).is_ok());
    }

    #[test]
    fn photo_url_caps_width() {
        let client = PlacesClient::new("secret".to_string()).unwrap();
        let url = client.photo_url("ref123", 4000);
        assert!(url.contains("maxwidth=1600"));
        assert!(url.contains("photo_reference=ref123"));
        assert!(url.contains("key=secret"));
    }

    #[test]
    fn summarize_requires_coordinates() {
        let with_geometry: RawPlace = serde_json::from_str(
            r#"{
                "place_id": "p1",
                "name": "Trattoria",
                "geometry": {"location": {"lat": 37.77, "lng": -122.41}},
                "types": ["italian_restaurant"],
                "photos": [{"photo_reference": "a"}]
            }"#,
        )
        .unwrap();
        let summary = summarize(with_geometry).unwrap();
        assert_eq!(summary.place_id, "p1");
        assert_eq!(summary.latitude, 37.77);
        assert!(summary.photos_available);

        let without_geometry: RawPlace =
            serde_json::from_str(r#"{"place_id": "p2", "name": "Ghost"}"#).unwrap();
        assert!(summarize(without_geometry).is_none());
    }

    #[test]
    fn detail_caps_photo_references() {
        let photos: Vec<String> = (0..14)
            .map(|i| format!(r#"{{"photo_reference": "ref{}"}}"#, i))
            .collect();
        let json = format!(
            r#"{{
                "place_id": "p1",
                "name": "Bistro",
                "geometry": {{"location": {{"lat": 1.0, "lng": 2.0}}}},
                "photos": [{}]
            }}"#,
            photos.join(",")
        );
        let raw: RawPlace = serde_json::from_str(&json).unwrap();
        let details = detail(raw).unwrap();
        assert_eq!(details.photos.len(), 10);
        assert_eq!(details.photos[0].photo_reference, "ref0");
        assert_eq!(details.photos[9].photo_reference, "ref9");
    }

    #[test]
    fn search_response_parses_next_page_token() {
        let response: SearchResponse = serde_json::from_str(
            r#"{
                "status": "OK",
                "results": [],
                "next_page_token": "tok"
            }"#,
        )
        .unwrap();
        assert_eq!(response.status, "OK");
        assert_eq!(response.next_page_token.as_deref(), Some("tok"));
    }

    #[test]
    fn cuisine_mapping_table() {
        let types = |t: &str| vec![t.to_string(), "restaurant".to_string()];
        assert_eq!(cuisine_type(&types("italian_restaurant")), "Italian");
        assert_eq!(cuisine_type(&types("sushi_restaurant")), "Sushi");
        assert_eq!(cuisine_type(&types("bar")), "Bar & Grill");
        assert_eq!(cuisine_type(&["restaurant".to_string()]), "Restaurant");
        assert_eq!(cuisine_type(&[]), "Restaurant");
    }

    #[test]
    fn opening_hours_flow_through_summary() {
        let raw: RawPlace = serde_json::from_str(
            r#"{
                "place_id": "p3",
                "name": "Diner",
                "geometry": {"location": {"lat": 0.5, "lng": 0.5}},
                "opening_hours": {"open_now": true}
            }"#,
        )
        .unwrap();
        assert_eq!(summarize(raw).unwrap().is_open, Some(true));
    }
}
