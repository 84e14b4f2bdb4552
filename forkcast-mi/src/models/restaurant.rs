//! Restaurant and stored menu item records

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::services::places_client::{cuisine_type, PlaceDetails};
use crate::types::MenuItem;

/// A restaurant row as persisted. `menu_last_analyzed` stays NULL until the
/// first committed contribution.
#[derive(Debug, Clone, Serialize)]
pub struct RestaurantRecord {
    pub id: Uuid,
    pub place_id: String,
    pub name: String,
    pub address: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub cuisine_type: Option<String>,
    pub menu_last_analyzed: Option<DateTime<Utc>>,
    pub contribution_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One menu item row. Active rows form the current menu; inactive rows are
/// superseded history kept for audit.
#[derive(Debug, Clone, Serialize)]
pub struct StoredMenuItem {
    pub id: Uuid,
    #[serde(skip_serializing)]
    pub restaurant_id: Uuid,
    #[serde(flatten)]
    pub item: MenuItem,
    /// Protocol ids the classification was made against.
    pub protocols: Vec<String>,
    #[serde(skip_serializing)]
    pub active: bool,
    pub generation: i64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

/// The identity fields the pipeline knows about a restaurant before the
/// store has a row for it.
#[derive(Debug, Clone)]
pub struct RestaurantIdentity {
    pub place_id: String,
    pub name: String,
    pub address: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub cuisine_type: Option<String>,
}

impl From<&PlaceDetails> for RestaurantIdentity {
    fn from(details: &PlaceDetails) -> Self {
        Self {
            place_id: details.place_id.clone(),
            name: details.name.clone(),
            address: details.address.clone(),
            latitude: Some(details.latitude),
            longitude: Some(details.longitude),
            cuisine_type: Some(cuisine_type(&details.types)),
        }
    }
}

/// Aggregate counts used to annotate search and nearby results.
#[derive(Debug, Clone, Serialize)]
pub struct MenuStats {
    pub item_count: i64,
    pub safe_item_count: i64,
    pub last_analyzed: Option<DateTime<Utc>>,
    pub contribution_count: i64,
}
