//! Protocol listing endpoint

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::protocols::ProtocolSummary;
use crate::AppState;

/// GET /protocols response
#[derive(Debug, Serialize)]
pub struct ProtocolListResponse {
    pub protocols: Vec<ProtocolSummary>,
}

/// GET /protocols
///
/// All dietary protocols this service can screen against, sorted by id.
pub async fn list_protocols(State(state): State<AppState>) -> Json<ProtocolListResponse> {
    Json(ProtocolListResponse {
        protocols: state.protocols.list(),
    })
}

/// Build protocol routes
pub fn protocol_routes() -> Router<AppState> {
    Router::new().route("/protocols", get(list_protocols))
}

/// Boundary validation shared by the menu and analysis endpoints: every
/// requested id must be known, and the list must not be empty when the
/// request requires one.
pub(crate) fn validate_protocols(
    registry: &crate::protocols::ProtocolRegistry,
    ids: &[String],
) -> Result<(), crate::error::ApiError> {
    use crate::error::ApiError;
    use crate::protocols::ProtocolError;

    match registry.validate(ids) {
        Ok(()) => Ok(()),
        Err(ProtocolError::Unknown(id)) => Err(ApiError::BadRequest(format!(
            "Invalid protocol: {}. Valid options: {}",
            id,
            registry.known_ids().join(", ")
        ))),
        Err(other) => Err(other.into()),
    }
}
