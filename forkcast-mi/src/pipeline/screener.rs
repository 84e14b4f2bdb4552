//! Catalog photo screening
//!
//! Walks a restaurant's catalog photos through download and the menu gate,
//! stopping once enough menu photos are accepted. Checks run on a bounded
//! pool (N photos in flight simultaneously), but verdicts are committed in
//! catalog order through an in-order cursor, so the accepted set and the
//! per-photo trail are identical to a sequential scan. When the acceptance
//! target is reached, in-flight checks for later photos are cancelled rather
//! than awaited; their results never reach the trail.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{FuturesUnordered, StreamExt};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use super::gate::{acceptance, MenuImageGate};
use crate::services::PlacesClient;
use crate::types::{CandidatePhoto, EncodedImage, MenuPhotoVerdict, VisionCapability};

/// Width requested for catalog photo downloads. Menu text needs resolution;
/// the photo endpoint caps width at 1600 anyway.
const SCREENING_PHOTO_WIDTH: u32 = 1600;

/// Where screening gets photo bytes from. Abstracted so tests can feed
/// scripted images without a network.
#[async_trait]
pub trait PhotoSource: Send + Sync {
    async fn fetch_photo(&self, photo_reference: &str) -> anyhow::Result<Vec<u8>>;
}

#[async_trait]
impl PhotoSource for PlacesClient {
    async fn fetch_photo(&self, photo_reference: &str) -> anyhow::Result<Vec<u8>> {
        Ok(self.download_photo(photo_reference, SCREENING_PHOTO_WIDTH).await?)
    }
}

/// Tuning for one screening pass.
#[derive(Debug, Clone)]
pub struct ScreeningConfig {
    /// Scan at most this many catalog photos.
    pub max_photos: usize,
    /// Stop scanning once this many photos are accepted.
    pub required_acceptances: usize,
    /// Acceptance threshold; a verdict at exactly this confidence accepts.
    pub min_confidence: f64,
    /// Photos checked in flight simultaneously, clamped to 1..=6.
    pub concurrency: usize,
}

impl Default for ScreeningConfig {
    fn default() -> Self {
        Self {
            max_photos: 10,
            required_acceptances: 3,
            min_confidence: 0.7,
            concurrency: 4,
        }
    }
}

/// One row of the per-photo trail. Optional fields are populated only when
/// the download succeeded and a verdict exists.
#[derive(Debug, Clone, Serialize)]
pub struct PhotoCheckRecord {
    pub photo_number: usize,
    pub photo_reference: String,
    pub download_success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_menu: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub accepted: bool,
}

/// Observability summary of one screening pass.
#[derive(Debug, Clone, Serialize)]
pub struct ScreeningReport {
    pub total_photos_in_catalog: usize,
    pub photos_checked: usize,
    pub menu_photos_found: usize,
    pub min_confidence_threshold: f64,
    pub photo_check_results: Vec<PhotoCheckRecord>,
}

/// A photo that cleared the gate, still holding its encoded bytes for the
/// classifier.
#[derive(Debug, Clone)]
pub struct AcceptedPhoto {
    pub photo: CandidatePhoto,
    pub verdict: MenuPhotoVerdict,
}

/// Accepted photos plus the full trail.
#[derive(Debug)]
pub struct ScreeningOutcome {
    pub accepted: Vec<AcceptedPhoto>,
    pub report: ScreeningReport,
}

enum Checked {
    Failed { error: String },
    Screened { image: EncodedImage, verdict: MenuPhotoVerdict },
    Cancelled,
}

/// Screens catalog photos through the menu gate.
pub struct PhotoScreener {
    gate: MenuImageGate,
    config: ScreeningConfig,
}

impl PhotoScreener {
    pub fn new(vision: Arc<dyn VisionCapability>, config: ScreeningConfig) -> Self {
        Self {
            gate: MenuImageGate::new(vision),
            config,
        }
    }

    pub fn min_confidence(&self) -> f64 {
        self.config.min_confidence
    }

    /// Screen a catalog in order. Never errors; a failed download becomes a
    /// trail row and scanning moves on.
    pub async fn screen_catalog(
        &self,
        source: &dyn PhotoSource,
        photo_references: &[String],
    ) -> ScreeningOutcome {
        let concurrency = self.config.concurrency.clamp(1, 6);
        let scan_cap = self.config.max_photos;

        tracing::info!(
            total = photo_references.len(),
            scan_cap,
            concurrency,
            "Screening catalog photos"
        );

        let cancel = CancellationToken::new();
        let mut candidates = photo_references
            .iter()
            .take(scan_cap)
            .cloned()
            .enumerate();

        let spawn_check =
            |index: usize, reference: String| self.check_photo(index, reference, source, cancel.clone());

        let mut tasks = FuturesUnordered::new();
        for _ in 0..concurrency {
            if let Some((index, reference)) = candidates.next() {
                tasks.push(spawn_check(index, reference));
            }
        }

        // Out-of-order completions wait here until the cursor reaches them.
        let mut buffered: BTreeMap<usize, (String, Checked)> = BTreeMap::new();
        let mut cursor = 0usize;
        let mut done = false;

        let mut accepted: Vec<AcceptedPhoto> = Vec::new();
        let mut trail: Vec<PhotoCheckRecord> = Vec::new();
        let mut photos_checked = 0usize;

        while let Some((index, reference, checked)) = tasks.next().await {
            if done {
                // Draining cancelled stragglers.
                continue;
            }
            buffered.insert(index, (reference, checked));

            while let Some((reference, checked)) = buffered.remove(&cursor) {
                let photo_number = cursor + 1;
                cursor += 1;

                match checked {
                    // Only produced after the stop signal, and commits halt
                    // at the stop signal, so nothing to record.
                    Checked::Cancelled => {}
                    Checked::Failed { error } => {
                        photos_checked += 1;
                        tracing::warn!(photo_reference = %reference, error = %error, "Failed to download photo");
                        trail.push(PhotoCheckRecord {
                            photo_number,
                            photo_reference: reference,
                            download_success: false,
                            is_menu: None,
                            confidence: None,
                            reason: None,
                            error: Some(error),
                            accepted: false,
                        });
                    }
                    Checked::Screened { image, verdict } => {
                        photos_checked += 1;
                        let is_accepted = acceptance(&verdict, self.config.min_confidence);
                        trail.push(PhotoCheckRecord {
                            photo_number,
                            photo_reference: reference.clone(),
                            download_success: true,
                            is_menu: Some(verdict.is_menu),
                            confidence: Some(verdict.confidence),
                            reason: Some(verdict.reason.clone()),
                            error: None,
                            accepted: is_accepted,
                        });

                        if is_accepted {
                            tracing::info!(
                                photo_number,
                                confidence = verdict.confidence,
                                "Menu photo accepted"
                            );
                            accepted.push(AcceptedPhoto {
                                photo: CandidatePhoto {
                                    image,
                                    provenance: crate::types::PhotoProvenance::Catalog {
                                        photo_reference: reference,
                                    },
                                },
                                verdict,
                            });
                            if accepted.len() >= self.config.required_acceptances {
                                tracing::info!(
                                    found = accepted.len(),
                                    "Acceptance target reached, stopping scan"
                                );
                                done = true;
                                cancel.cancel();
                                break;
                            }
                        } else {
                            tracing::info!(photo_number, reason = %verdict.reason, "Photo rejected");
                        }
                    }
                }
            }

            if !done {
                if let Some((index, reference)) = candidates.next() {
                    tasks.push(spawn_check(index, reference));
                }
            }
        }

        tracing::info!(
            menu_photos_found = accepted.len(),
            photos_checked,
            "Screening finished"
        );

        ScreeningOutcome {
            report: ScreeningReport {
                total_photos_in_catalog: photo_references.len(),
                photos_checked,
                menu_photos_found: accepted.len(),
                min_confidence_threshold: self.config.min_confidence,
                photo_check_results: trail,
            },
            accepted,
        }
    }

    async fn check_photo(
        &self,
        index: usize,
        reference: String,
        source: &dyn PhotoSource,
        cancel: CancellationToken,
    ) -> (usize, String, Checked) {
        let checked = tokio::select! {
            _ = cancel.cancelled() => Checked::Cancelled,
            checked = async {
                let bytes = match source.fetch_photo(&reference).await {
                    Ok(bytes) => bytes,
                    Err(e) => return Checked::Failed { error: e.to_string() },
                };
                let image = EncodedImage::from_bytes(&bytes);
                let verdict = self.gate.classify_photo(&image).await;
                Checked::Screened { image, verdict }
            } => checked,
        };
        (index, reference, checked)
    }
}
