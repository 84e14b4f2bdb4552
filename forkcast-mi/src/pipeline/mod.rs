//! Menu intelligence pipeline
//!
//! Orchestrates the full analysis flow: resolve the restaurant with the
//! places provider, screen its catalog photos through the gate, classify
//! accepted photos against the composed trigger set, merge the results,
//! and commit them to the store. Read requests bypass the gate and
//! classifier entirely and consult freshness on the way out.
//!
//! The provider and the vision capability sit behind traits so the whole
//! flow runs against scripted stubs in tests.

pub mod classifier;
pub mod gate;
pub mod merger;
pub mod screener;

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqlitePool;

use forkcast_common::{elapsed::whole_days_between, Error, Result};

pub use classifier::SafetyClassifier;
pub use gate::{acceptance, MenuImageGate};
pub use merger::merge;
pub use screener::{
    AcceptedPhoto, PhotoCheckRecord, PhotoScreener, PhotoSource, ScreeningConfig,
    ScreeningOutcome, ScreeningReport,
};

use crate::db::menu_store;
use crate::models::{Freshness, RestaurantIdentity, RestaurantRecord, StoredMenuItem};
use crate::protocols::ProtocolRegistry;
use crate::services::places_client::{PlaceDetails, PlacesError};
use crate::services::PlacesClient;
use crate::types::{CandidatePhoto, MenuItem, VisionCapability};

/// Place metadata lookups, separated from photo downloads so tests can
/// stub each independently.
#[async_trait]
pub trait PlaceDirectory: Send + Sync {
    async fn place_details(&self, place_id: &str) -> std::result::Result<PlaceDetails, PlacesError>;
}

#[async_trait]
impl PlaceDirectory for PlacesClient {
    async fn place_details(
        &self,
        place_id: &str,
    ) -> std::result::Result<PlaceDetails, PlacesError> {
        PlacesClient::place_details(self, place_id).await
    }
}

/// How a catalog analysis request concluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisOutcome {
    /// Pipeline ran and its result was committed
    Analyzed,
    /// Fresh record served without invoking the pipeline
    CacheHit,
    /// Catalog photos exist but none passed the gate
    NoMenuPhotosFound,
    /// The provider has no photos for this place
    NoCatalogPhotos,
}

/// Result of one catalog analysis request.
#[derive(Debug)]
pub struct CatalogAnalysis {
    pub outcome: AnalysisOutcome,
    /// Provider record; absent on the cache-hit path, which never calls out.
    pub place: Option<PlaceDetails>,
    /// Committed record, or the prior record when nothing new was committed.
    pub record: Option<RestaurantRecord>,
    pub items: Vec<StoredMenuItem>,
    pub menu_photos_found: usize,
    pub photos_checked: usize,
    pub freshness: Option<Freshness>,
    /// Per-photo trail, populated when the request asked for debug detail.
    pub report: Option<ScreeningReport>,
}

/// Result of a user-submitted photo analysis.
#[derive(Debug)]
pub enum SubmittedAnalysis {
    /// No restaurant named: classified items are returned, not persisted.
    Transient { items: Vec<MenuItem> },
    /// Restaurant named: the pass was committed as a contribution.
    Committed {
        record: RestaurantRecord,
        items: Vec<StoredMenuItem>,
    },
}

/// Read-path view of a committed menu.
#[derive(Debug)]
pub struct MenuView {
    pub record: RestaurantRecord,
    pub items: Vec<StoredMenuItem>,
    pub freshness: Freshness,
    pub last_analyzed: DateTime<Utc>,
    pub days_since_analysis: i64,
    /// Protocol ids the active set was classified under.
    pub analyzed_protocols: Vec<String>,
    /// Whether those match the protocols the caller asked about.
    pub matches_requested: Option<bool>,
}

const BE_FIRST_MESSAGE: &str =
    "No menu analysis exists for this restaurant yet. Be the first to scan!";

pub struct MenuPipeline {
    db: SqlitePool,
    directory: Arc<dyn PlaceDirectory>,
    photos: Arc<dyn PhotoSource>,
    protocols: Arc<ProtocolRegistry>,
    screener: PhotoScreener,
    classifier: SafetyClassifier,
}

impl MenuPipeline {
    pub fn new(
        db: SqlitePool,
        directory: Arc<dyn PlaceDirectory>,
        photos: Arc<dyn PhotoSource>,
        vision: Arc<dyn VisionCapability>,
        protocols: Arc<ProtocolRegistry>,
        screening: ScreeningConfig,
    ) -> Self {
        Self {
            db,
            directory,
            photos,
            protocols,
            screener: PhotoScreener::new(vision.clone(), screening),
            classifier: SafetyClassifier::new(vision),
        }
    }

    /// Catalog path: screen the place's photos, classify accepted ones,
    /// merge, commit. Serves the cached active set instead when the record
    /// is fresh, was built for the same protocols, and `force_refresh` is
    /// not set.
    pub async fn analyze_catalog(
        &self,
        place_id: &str,
        protocol_ids: &[String],
        force_refresh: bool,
        debug: bool,
    ) -> Result<CatalogAnalysis> {
        let now = Utc::now();
        let triggers = self.protocols.compose(protocol_ids);
        let canonical_ids = triggers.protocol_ids();

        if !force_refresh {
            if let Some(hit) = self.cache_hit(place_id, &canonical_ids, now).await? {
                return Ok(hit);
            }
        }

        let details = self
            .directory
            .place_details(place_id)
            .await
            .map_err(map_places_error)?;

        if details.photos.is_empty() {
            tracing::warn!(place_id, "No catalog photos for place");
            let existing = menu_store::load_active_menu(&self.db, place_id).await?;
            return Ok(self.unanalyzed_result(
                AnalysisOutcome::NoCatalogPhotos,
                details,
                existing,
                empty_report(self.screener.min_confidence()),
                now,
                debug,
            ));
        }

        let refs: Vec<String> = details
            .photos
            .iter()
            .map(|p| p.photo_reference.clone())
            .collect();
        let screening = self.screener.screen_catalog(self.photos.as_ref(), &refs).await;

        if screening.accepted.is_empty() {
            tracing::info!(
                place_id,
                photos_checked = screening.report.photos_checked,
                "No menu photos found in catalog"
            );
            let existing = menu_store::load_active_menu(&self.db, place_id).await?;
            return Ok(self.unanalyzed_result(
                AnalysisOutcome::NoMenuPhotosFound,
                details,
                existing,
                screening.report,
                now,
                debug,
            ));
        }

        // Accepted photos are classified one at a time; vision extraction is
        // the cost driver and three calls in flight would triple burst load.
        let mut lists = Vec::with_capacity(screening.accepted.len());
        for accepted in &screening.accepted {
            lists.push(
                self.classifier
                    .analyze(&accepted.photo.image, &triggers)
                    .await,
            );
        }
        let merged = merge(lists);

        let identity = RestaurantIdentity::from(&details);
        let (record, items) =
            menu_store::commit_contribution(&self.db, &identity, &canonical_ids, &merged, now)
                .await?;

        Ok(CatalogAnalysis {
            outcome: AnalysisOutcome::Analyzed,
            place: Some(details),
            freshness: Some(Freshness::Fresh),
            record: Some(record),
            items,
            menu_photos_found: screening.report.menu_photos_found,
            photos_checked: screening.report.photos_checked,
            report: debug.then_some(screening.report),
        })
    }

    /// User-submitted path: no gate, straight to classification. Committed
    /// as a contribution when a place id is given.
    pub async fn analyze_submitted(
        &self,
        image_base64: String,
        protocol_ids: &[String],
        place_id: Option<&str>,
    ) -> Result<SubmittedAnalysis> {
        let triggers = self.protocols.compose(protocol_ids);
        let canonical_ids = triggers.protocol_ids();

        let photo = CandidatePhoto::user_submitted(image_base64);
        let classified = self.classifier.analyze(&photo.image, &triggers).await;
        let merged = merge([classified]);

        match place_id {
            None => Ok(SubmittedAnalysis::Transient { items: merged }),
            Some(place_id) => {
                let details = self
                    .directory
                    .place_details(place_id)
                    .await
                    .map_err(map_places_error)?;
                let identity = RestaurantIdentity::from(&details);
                let (record, items) = menu_store::commit_contribution(
                    &self.db,
                    &identity,
                    &canonical_ids,
                    &merged,
                    Utc::now(),
                )
                .await?;
                Ok(SubmittedAnalysis::Committed { record, items })
            }
        }
    }

    /// Read path: active set plus freshness. Absent records are a
    /// not-found outcome, never an empty success.
    pub async fn read_menu(
        &self,
        place_id: &str,
        requested_protocols: Option<&[String]>,
    ) -> Result<MenuView> {
        let Some((record, items)) = menu_store::load_active_menu(&self.db, place_id).await? else {
            return Err(Error::NotFound(BE_FIRST_MESSAGE.to_string()));
        };
        let Some(last_analyzed) = record.menu_last_analyzed else {
            return Err(Error::NotFound(BE_FIRST_MESSAGE.to_string()));
        };

        let now = Utc::now();
        let freshness = Freshness::classify(last_analyzed, now);
        let analyzed_protocols = items
            .first()
            .map(|item| item.protocols.clone())
            .unwrap_or_default();
        let matches_requested = requested_protocols.map(|requested| {
            let requested = self.protocols.compose(requested).protocol_ids();
            as_set(&requested) == as_set(&analyzed_protocols)
        });

        Ok(MenuView {
            days_since_analysis: whole_days_between(last_analyzed, now),
            record,
            items,
            freshness,
            last_analyzed,
            analyzed_protocols,
            matches_requested,
        })
    }

    /// Fresh record built for the same protocol set, served without any
    /// provider or vision call.
    async fn cache_hit(
        &self,
        place_id: &str,
        canonical_ids: &[String],
        now: DateTime<Utc>,
    ) -> Result<Option<CatalogAnalysis>> {
        let Some((record, items)) = menu_store::load_active_menu(&self.db, place_id).await? else {
            return Ok(None);
        };
        let Some(last_analyzed) = record.menu_last_analyzed else {
            return Ok(None);
        };

        let freshness = Freshness::classify(last_analyzed, now);
        if !freshness.allows_cache_hit() {
            return Ok(None);
        }

        // A fresh set classified under different protocols answers a
        // different question; run the pipeline again for this one.
        let analyzed = items.first().map(|item| item.protocols.clone());
        match analyzed {
            Some(protocols) if as_set(&protocols) == as_set(canonical_ids) => {
                tracing::info!(place_id, "Fresh menu record, serving cached active set");
                Ok(Some(CatalogAnalysis {
                    outcome: AnalysisOutcome::CacheHit,
                    place: None,
                    record: Some(record),
                    items,
                    menu_photos_found: 0,
                    photos_checked: 0,
                    freshness: Some(freshness),
                    report: None,
                }))
            }
            _ => Ok(None),
        }
    }

    fn unanalyzed_result(
        &self,
        outcome: AnalysisOutcome,
        details: PlaceDetails,
        existing: Option<(RestaurantRecord, Vec<StoredMenuItem>)>,
        report: ScreeningReport,
        now: DateTime<Utc>,
        debug: bool,
    ) -> CatalogAnalysis {
        let (record, items) = match existing {
            Some((record, items)) => (Some(record), items),
            None => (None, Vec::new()),
        };
        let freshness = record
            .as_ref()
            .and_then(|r| r.menu_last_analyzed)
            .map(|last| Freshness::classify(last, now));
        CatalogAnalysis {
            outcome,
            place: Some(details),
            record,
            items,
            menu_photos_found: report.menu_photos_found,
            photos_checked: report.photos_checked,
            freshness,
            report: debug.then_some(report),
        }
    }
}

fn empty_report(min_confidence: f64) -> ScreeningReport {
    ScreeningReport {
        total_photos_in_catalog: 0,
        photos_checked: 0,
        menu_photos_found: 0,
        min_confidence_threshold: min_confidence,
        photo_check_results: Vec::new(),
    }
}

fn as_set(ids: &[String]) -> BTreeSet<&str> {
    ids.iter().map(String::as_str).collect()
}

pub(crate) fn map_places_error(e: PlacesError) -> Error {
    match e {
        PlacesError::NotFound => Error::NotFound("Restaurant not found".to_string()),
        PlacesError::MissingApiKey => {
            Error::Config("Places API key not configured".to_string())
        }
        other => Error::Upstream(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use chrono::Duration;

    use super::*;
    use crate::db::restaurants::find_by_place_id;
    use crate::services::places_client::PhotoRef;
    use crate::types::{EncodedImage, Safety, VisionError};

    struct StubProvider {
        details: HashMap<String, PlaceDetails>,
        photos: HashMap<String, Vec<u8>>,
        detail_calls: AtomicUsize,
    }

    impl StubProvider {
        fn new() -> Self {
            Self {
                details: HashMap::new(),
                photos: HashMap::new(),
                detail_calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl PlaceDirectory for StubProvider {
        async fn place_details(
            &self,
            place_id: &str,
        ) -> std::result::Result<PlaceDetails, PlacesError> {
            self.detail_calls.fetch_add(1, Ordering::SeqCst);
            self.details
                .get(place_id)
                .cloned()
                .ok_or(PlacesError::NotFound)
        }
    }

    #[async_trait]
    impl PhotoSource for StubProvider {
        async fn fetch_photo(&self, photo_reference: &str) -> anyhow::Result<Vec<u8>> {
            self.photos
                .get(photo_reference)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("no bytes for {photo_reference}"))
        }
    }

    /// Replies keyed by image base64. Gate calls carry no system
    /// instruction; extraction calls do.
    struct ScriptedVision {
        gate_replies: HashMap<String, String>,
        extraction_replies: HashMap<String, String>,
        calls: AtomicUsize,
    }

    impl ScriptedVision {
        fn new() -> Self {
            Self {
                gate_replies: HashMap::new(),
                extraction_replies: HashMap::new(),
                calls: AtomicUsize::new(0),
            }
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
        ) -> std::result::Result<String, VisionError> {
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

    fn b64(bytes: &[u8]) -> String {
        EncodedImage::from_bytes(bytes).base64
    }

    fn details_for(place_id: &str, photo_refs: &[&str]) -> PlaceDetails {
        PlaceDetails {
            place_id: place_id.to_string(),
            name: "Luna Cafe".to_string(),
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

    fn identity_for(place_id: &str) -> RestaurantIdentity {
        RestaurantIdentity {
            place_id: place_id.to_string(),
            name: "Luna Cafe".to_string(),
            address: Some("1 Orbit Way, San Francisco".to_string()),
            latitude: Some(37.7749),
            longitude: Some(-122.4194),
            cuisine_type: Some("Cafe".to_string()),
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

    fn proto(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    const ACCEPT: &str = r#"{"is_menu": true, "confidence": 0.92, "reason": "Printed menu page"}"#;
    const REJECT: &str = r#"{"is_menu": false, "confidence": 0.88, "reason": "Dining room interior"}"#;

    async fn build(
        stub: StubProvider,
        vision: ScriptedVision,
    ) -> (MenuPipeline, SqlitePool, Arc<StubProvider>, Arc<ScriptedVision>) {
        let db = crate::db::test_pool().await;
        let stub = Arc::new(stub);
        let vision = Arc::new(vision);
        let pipeline = MenuPipeline::new(
            db.clone(),
            stub.clone(),
            stub.clone(),
            vision.clone(),
            Arc::new(ProtocolRegistry::new()),
            ScreeningConfig {
                concurrency: 1,
                ..ScreeningConfig::default()
            },
        );
        (pipeline, db, stub, vision)
    }

    #[tokio::test]
    async fn fresh_record_with_same_protocols_serves_cache_hit() {
        let (pipeline, db, stub, vision) = build(StubProvider::new(), ScriptedVision::new()).await;
        menu_store::commit_contribution(
            &db,
            &identity_for("luna"),
            &proto(&["low_fodmap"]),
            &[item("Garden Salad", Safety::Safe, "")],
            Utc::now(),
        )
        .await
        .unwrap();

        let analysis = pipeline
            .analyze_catalog("luna", &proto(&["low_fodmap"]), false, false)
            .await
            .unwrap();

        assert_eq!(analysis.outcome, AnalysisOutcome::CacheHit);
        assert_eq!(analysis.freshness, Some(Freshness::Fresh));
        assert_eq!(analysis.items.len(), 1);
        assert!(analysis.place.is_none());
        assert_eq!(stub.detail_calls.load(Ordering::SeqCst), 0);
        assert_eq!(vision.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn force_refresh_runs_the_pipeline_again() {
        let mut stub = StubProvider::new();
        stub.details
            .insert("luna".to_string(), details_for("luna", &["p1"]));
        stub.photos.insert("p1".to_string(), b"photo-1".to_vec());

        let mut vision = ScriptedVision::new();
        vision.gate_replies.insert(b64(b"photo-1"), ACCEPT.to_string());
        vision.extraction_replies.insert(
            b64(b"photo-1"),
            r#"{"menu_items": [{"name": "Lentil Soup", "safety": "caution", "triggers": ["onion"], "notes": ""}]}"#
                .to_string(),
        );

        let (pipeline, db, _stub, _vision) = build(stub, vision).await;
        menu_store::commit_contribution(
            &db,
            &identity_for("luna"),
            &proto(&["low_fodmap"]),
            &[item("Garden Salad", Safety::Safe, "")],
            Utc::now(),
        )
        .await
        .unwrap();

        let analysis = pipeline
            .analyze_catalog("luna", &proto(&["low_fodmap"]), true, false)
            .await
            .unwrap();

        assert_eq!(analysis.outcome, AnalysisOutcome::Analyzed);
        let record = analysis.record.unwrap();
        assert_eq!(record.contribution_count, 2);
        assert_eq!(analysis.items.len(), 1);
        assert_eq!(analysis.items[0].item.name, "Lentil Soup");
    }

    #[tokio::test]
    async fn fresh_record_for_other_protocols_is_reanalyzed() {
        let mut stub = StubProvider::new();
        stub.details
            .insert("luna".to_string(), details_for("luna", &["p1"]));
        stub.photos.insert("p1".to_string(), b"photo-1".to_vec());

        let mut vision = ScriptedVision::new();
        vision.gate_replies.insert(b64(b"photo-1"), ACCEPT.to_string());
        vision.extraction_replies.insert(
            b64(b"photo-1"),
            r#"{"menu_items": [{"name": "Rice Bowl", "safety": "safe", "triggers": [], "notes": ""}]}"#
                .to_string(),
        );

        let (pipeline, db, _stub, vision) = build(stub, vision).await;
        menu_store::commit_contribution(
            &db,
            &identity_for("luna"),
            &proto(&["low_fodmap"]),
            &[item("Garden Salad", Safety::Safe, "")],
            Utc::now(),
        )
        .await
        .unwrap();

        let analysis = pipeline
            .analyze_catalog("luna", &proto(&["gluten_free"]), false, false)
            .await
            .unwrap();

        assert_eq!(analysis.outcome, AnalysisOutcome::Analyzed);
        assert!(vision.calls.load(Ordering::SeqCst) > 0);
        assert_eq!(analysis.items[0].protocols, proto(&["gluten_free"]));
    }

    #[tokio::test]
    async fn stale_record_is_reanalyzed() {
        let mut stub = StubProvider::new();
        stub.details
            .insert("luna".to_string(), details_for("luna", &["p1"]));
        stub.photos.insert("p1".to_string(), b"photo-1".to_vec());

        let mut vision = ScriptedVision::new();
        vision.gate_replies.insert(b64(b"photo-1"), ACCEPT.to_string());
        vision.extraction_replies.insert(
            b64(b"photo-1"),
            r#"{"menu_items": [{"name": "Rice Bowl", "safety": "safe", "triggers": [], "notes": ""}]}"#
                .to_string(),
        );

        let (pipeline, db, _stub, _vision) = build(stub, vision).await;
        menu_store::commit_contribution(
            &db,
            &identity_for("luna"),
            &proto(&["low_fodmap"]),
            &[item("Garden Salad", Safety::Safe, "")],
            Utc::now() - Duration::days(31),
        )
        .await
        .unwrap();

        let analysis = pipeline
            .analyze_catalog("luna", &proto(&["low_fodmap"]), false, false)
            .await
            .unwrap();

        assert_eq!(analysis.outcome, AnalysisOutcome::Analyzed);
        assert_eq!(analysis.record.unwrap().contribution_count, 2);
    }

    #[tokio::test]
    async fn place_without_photos_reports_no_catalog_photos() {
        let mut stub = StubProvider::new();
        stub.details
            .insert("luna".to_string(), details_for("luna", &[]));

        let (pipeline, _db, _stub, vision) = build(stub, ScriptedVision::new()).await;
        let analysis = pipeline
            .analyze_catalog("luna", &proto(&["low_fodmap"]), false, false)
            .await
            .unwrap();

        assert_eq!(analysis.outcome, AnalysisOutcome::NoCatalogPhotos);
        assert!(analysis.record.is_none());
        assert!(analysis.items.is_empty());
        assert!(analysis.freshness.is_none());
        assert_eq!(analysis.photos_checked, 0);
        assert_eq!(vision.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn all_rejections_report_no_menu_photos_and_commit_nothing() {
        let mut stub = StubProvider::new();
        stub.details
            .insert("luna".to_string(), details_for("luna", &["p1", "p2"]));
        stub.photos.insert("p1".to_string(), b"photo-1".to_vec());
        stub.photos.insert("p2".to_string(), b"photo-2".to_vec());

        let mut vision = ScriptedVision::new();
        vision.gate_replies.insert(b64(b"photo-1"), REJECT.to_string());
        vision.gate_replies.insert(b64(b"photo-2"), REJECT.to_string());

        let (pipeline, db, _stub, _vision) = build(stub, vision).await;
        let analysis = pipeline
            .analyze_catalog("luna", &proto(&["low_fodmap"]), false, true)
            .await
            .unwrap();

        assert_eq!(analysis.outcome, AnalysisOutcome::NoMenuPhotosFound);
        assert_eq!(analysis.photos_checked, 2);
        assert_eq!(analysis.menu_photos_found, 0);
        let report = analysis.report.expect("debug trail requested");
        assert_eq!(report.photo_check_results.len(), 2);
        assert!(find_by_place_id(&db, "luna").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn accepted_photos_are_classified_merged_and_committed() {
        let mut stub = StubProvider::new();
        stub.details
            .insert("luna".to_string(), details_for("luna", &["p1", "p2"]));
        stub.photos.insert("p1".to_string(), b"photo-1".to_vec());
        stub.photos.insert("p2".to_string(), b"photo-2".to_vec());

        let mut vision = ScriptedVision::new();
        vision.gate_replies.insert(b64(b"photo-1"), ACCEPT.to_string());
        vision.gate_replies.insert(b64(b"photo-2"), ACCEPT.to_string());
        vision.extraction_replies.insert(
            b64(b"photo-1"),
            r#"{"menu_items": [
                {"name": "Garden Salad", "safety": "safe", "triggers": [], "notes": "Ask for no croutons"},
                {"name": "Lentil Soup", "safety": "caution", "triggers": ["onion"], "notes": ""}
            ]}"#
            .to_string(),
        );
        vision.extraction_replies.insert(
            b64(b"photo-2"),
            r#"{"menu_items": [
                {"name": "  garden salad ", "safety": "safe", "triggers": [], "notes": "House vinaigrette contains garlic, ask for oil instead"},
                {"name": "Grilled Chicken", "safety": "safe", "triggers": [], "notes": ""}
            ]}"#
            .to_string(),
        );

        let (pipeline, _db, _stub, _vision) = build(stub, vision).await;
        let analysis = pipeline
            .analyze_catalog("luna", &proto(&["low_fodmap"]), false, false)
            .await
            .unwrap();

        assert_eq!(analysis.outcome, AnalysisOutcome::Analyzed);
        assert_eq!(analysis.freshness, Some(Freshness::Fresh));
        assert_eq!(analysis.menu_photos_found, 2);

        let names: Vec<&str> = analysis
            .items
            .iter()
            .map(|i| i.item.name.as_str())
            .collect();
        assert_eq!(names, ["Garden Salad", "Lentil Soup", "Grilled Chicken"]);
        assert!(analysis.items[0].item.notes.contains("vinaigrette"));

        let record = analysis.record.unwrap();
        assert_eq!(record.contribution_count, 1);
        assert_eq!(record.name, "Luna Cafe");
        assert!(record.menu_last_analyzed.is_some());
    }

    #[tokio::test]
    async fn unknown_place_maps_to_not_found() {
        let (pipeline, _db, _stub, _vision) =
            build(StubProvider::new(), ScriptedVision::new()).await;
        let err = pipeline
            .analyze_catalog("ghost", &proto(&["low_fodmap"]), false, false)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn submitted_photo_without_place_is_transient() {
        let photo = b64(b"user-shot");
        let mut vision = ScriptedVision::new();
        vision.extraction_replies.insert(
            photo.clone(),
            r#"{"menu_items": [{"name": "Miso Soup", "safety": "avoid", "triggers": ["soy"], "notes": ""}]}"#
                .to_string(),
        );

        let (pipeline, db, stub, _vision) = build(StubProvider::new(), vision).await;
        let result = pipeline
            .analyze_submitted(photo, &proto(&["soy_free"]), None)
            .await
            .unwrap();

        match result {
            SubmittedAnalysis::Transient { items } => {
                assert_eq!(items.len(), 1);
                assert_eq!(items[0].name, "Miso Soup");
                assert_eq!(items[0].safety, Safety::Avoid);
            }
            SubmittedAnalysis::Committed { .. } => panic!("expected transient result"),
        }
        assert_eq!(stub.detail_calls.load(Ordering::SeqCst), 0);
        assert!(find_by_place_id(&db, "luna").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn submitted_photo_with_place_commits_a_contribution() {
        let photo = b64(b"user-shot");
        let mut stub = StubProvider::new();
        stub.details
            .insert("luna".to_string(), details_for("luna", &[]));

        let mut vision = ScriptedVision::new();
        vision.extraction_replies.insert(
            photo.clone(),
            r#"{"menu_items": [{"name": "Miso Soup", "safety": "avoid", "triggers": ["soy"], "notes": ""}]}"#
                .to_string(),
        );

        let (pipeline, db, _stub, _vision) = build(stub, vision).await;
        let result = pipeline
            .analyze_submitted(photo, &proto(&["soy_free"]), Some("luna"))
            .await
            .unwrap();

        match result {
            SubmittedAnalysis::Committed { record, items } => {
                assert_eq!(record.place_id, "luna");
                assert_eq!(record.contribution_count, 1);
                assert_eq!(items.len(), 1);
            }
            SubmittedAnalysis::Transient { .. } => panic!("expected committed result"),
        }
        let (_, stored) = menu_store::load_active_menu(&db, "luna").await.unwrap().unwrap();
        assert_eq!(stored.len(), 1);
    }

    #[tokio::test]
    async fn reading_an_unanalyzed_restaurant_is_not_found() {
        let (pipeline, _db, _stub, _vision) =
            build(StubProvider::new(), ScriptedVision::new()).await;
        let err = pipeline.read_menu("luna", None).await.unwrap_err();
        match err {
            Error::NotFound(message) => assert!(message.contains("Be the first")),
            other => panic!("expected not found, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn read_menu_reports_freshness_and_protocol_match() {
        let (pipeline, db, _stub, _vision) =
            build(StubProvider::new(), ScriptedVision::new()).await;
        menu_store::commit_contribution(
            &db,
            &identity_for("luna"),
            &proto(&["low_fodmap"]),
            &[item("Garden Salad", Safety::Safe, "")],
            Utc::now() - Duration::days(10),
        )
        .await
        .unwrap();

        let view = pipeline
            .read_menu("luna", Some(&proto(&["low_fodmap"])))
            .await
            .unwrap();
        assert_eq!(view.freshness, Freshness::Recent);
        assert_eq!(view.days_since_analysis, 10);
        assert_eq!(view.analyzed_protocols, proto(&["low_fodmap"]));
        assert_eq!(view.matches_requested, Some(true));

        let other = pipeline
            .read_menu("luna", Some(&proto(&["gluten_free"])))
            .await
            .unwrap();
        assert_eq!(other.matches_requested, Some(false));

        let unasked = pipeline.read_menu("luna", None).await.unwrap();
        assert_eq!(unasked.matches_requested, None);
    }
}
