//! Shared fixtures for integration tests: a router wired to scripted
//! provider and vision stubs over a temp-file database.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use sqlx::SqlitePool;
use tempfile::TempDir;
use tower::util::ServiceExt;

use forkcast_mi::pipeline::{MenuPipeline, PhotoSource, PlaceDirectory, ScreeningConfig};
use forkcast_mi::protocols::ProtocolRegistry;
use forkcast_mi::services::places_client::{PhotoRef, PlaceDetails, PlacesError};
use forkcast_mi::services::PlacesClient;
use forkcast_mi::types::{EncodedImage, VisionCapability, VisionError};
use forkcast_mi::AppState;

/// Scripted places provider: place details and photo bytes from maps.
#[derive(Default)]
pub struct StubNet {
    pub details: HashMap<String, PlaceDetails>,
    pub photos: HashMap<String, Vec<u8>>,
}

#[async_trait]
impl PlaceDirectory for StubNet {
    async fn place_details(&self, place_id: &str) -> Result<PlaceDetails, PlacesError> {
        self.details
            .get(place_id)
            .cloned()
            .ok_or(PlacesError::NotFound)
    }
}

#[async_trait]
impl PhotoSource for StubNet {
    async fn fetch_photo(&self, photo_reference: &str) -> anyhow::Result<Vec<u8>> {
        self.photos
            .get(photo_reference)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no bytes for {photo_reference}"))
    }
}

/// Scripted vision capability keyed by image base64. Gate calls carry no
/// system instruction; extraction calls do.
#[derive(Default)]
pub struct ScriptedVision {
    pub gate_replies: HashMap<String, String>,
    pub extraction_replies: HashMap<String, String>,
    pub calls: AtomicUsize,
}

impl ScriptedVision {
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VisionCapability for ScriptedVision {
    async fn describe_image(
        &self,
        image: &EncodedImage,
        system_instruction: Option<&str>,
        _prompt: &str,
        _max_tokens: u32,
    ) -> Result<String, VisionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let table = if system_instruction.is_some() {
            &self.extraction_replies
        } else {
            &self.gate_replies
        };
        table
            .get(&image.base64)
            .cloned()
            .ok_or(VisionError::EmptyResponse)
    }
}

pub fn b64(bytes: &[u8]) -> String {
    EncodedImage::from_bytes(bytes).base64
}

pub const GATE_ACCEPT: &str =
    r#"{"is_menu": true, "confidence": 0.95, "reason": "Printed menu page"}"#;
pub const GATE_REJECT: &str =
    r#"{"is_menu": false, "confidence": 0.9, "reason": "Storefront exterior"}"#;

pub fn details_fixture(place_id: &str, name: &str, photo_refs: &[&str]) -> PlaceDetails {
    PlaceDetails {
        place_id: place_id.to_string(),
        name: name.to_string(),
        address: Some("1 Orbit Way, San Francisco".to_string()),
        latitude: 37.7749,
        longitude: -122.4194,
        rating: Some(4.4),
        user_ratings_total: Some(210),
        price_level: Some(2),
        types: vec!["cafe".to_string(), "restaurant".to_string()],
        website: None,
        phone: None,
        business_status: Some("OPERATIONAL".to_string()),
        photos: photo_refs
            .iter()
            .map(|r| PhotoRef {
                photo_reference: r.to_string(),
                width: Some(1600),
                height: Some(1200),
                html_attributions: Vec::new(),
            })
            .collect(),
    }
}

/// Build a router over stubs and a temp-file database.
///
/// The returned `TempDir` owns the database file; keep it alive for the
/// duration of the test.
pub async fn test_app(
    stub: StubNet,
    vision: ScriptedVision,
) -> (Router, SqlitePool, Arc<ScriptedVision>, TempDir) {
    let dir = tempfile::tempdir().expect("temp dir");
    let db = forkcast_mi::db::init_database_pool(&dir.path().join("forkcast.db"))
        .await
        .expect("test database");

    let stub = Arc::new(stub);
    let vision = Arc::new(vision);
    let protocols = Arc::new(ProtocolRegistry::new());
    let pipeline = Arc::new(MenuPipeline::new(
        db.clone(),
        stub.clone() as Arc<dyn PlaceDirectory>,
        stub as Arc<dyn PhotoSource>,
        vision.clone() as Arc<dyn VisionCapability>,
        protocols.clone(),
        ScreeningConfig {
            concurrency: 1,
            ..ScreeningConfig::default()
        },
    ));

    // Discovery endpoints hold a real client; these tests never call it.
    let places = Arc::new(PlacesClient::new("test-key".to_string()).expect("places client"));
    let state = AppState::new(db.clone(), places, pipeline, protocols);
    (forkcast_mi::build_router(state), db, vision, dir)
}

pub async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, json)
}

pub async fn post_json(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_string(&body).unwrap()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}
