//! Shared types for the menu intelligence pipeline
//!
//! Defines the data that flows between pipeline stages (photo verdicts,
//! classified menu items) and the capability trait the pipeline uses to talk
//! to the external vision model. The trait keeps gating, classification, and
//! merging testable with a scripted stub in place of the real capability.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Safety verdicts and menu items
// ============================================================================

/// Per-item safety verdict against the requested trigger protocols.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Safety {
    /// No trigger is plausible under typical preparation
    Safe,
    /// Uncertain or partially implicated
    Caution,
    /// A trigger is clearly present
    Avoid,
}

impl Safety {
    pub fn as_str(&self) -> &'static str {
        match self {
            Safety::Safe => "safe",
            Safety::Caution => "caution",
            Safety::Avoid => "avoid",
        }
    }
}

impl std::str::FromStr for Safety {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "safe" => Ok(Safety::Safe),
            "caution" => Ok(Safety::Caution),
            "avoid" => Ok(Safety::Avoid),
            other => Err(format!("unknown safety verdict: {}", other)),
        }
    }
}

/// One classified menu item.
///
/// `triggers` and `notes` default to empty because the vision capability
/// omits them for items with nothing to report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MenuItem {
    pub name: String,
    pub safety: Safety,
    #[serde(default)]
    pub triggers: Vec<String>,
    #[serde(default)]
    pub notes: String,
}

impl MenuItem {
    /// Deduplication key: name lowercased and trimmed.
    pub fn dedup_key(&self) -> String {
        self.name.trim().to_lowercase()
    }
}

// ============================================================================
// Photo verdicts
// ============================================================================

/// The Gate's accept/reject decision for one candidate photo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MenuPhotoVerdict {
    pub is_menu: bool,
    pub confidence: f64,
    pub reason: String,
}

impl MenuPhotoVerdict {
    /// Construct a verdict with confidence clamped to [0.0, 1.0].
    pub fn new(is_menu: bool, confidence: f64, reason: impl Into<String>) -> Self {
        Self {
            is_menu,
            confidence: confidence.clamp(0.0, 1.0),
            reason: reason.into(),
        }
    }

    /// Conservative fallback verdict used when the capability fails.
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::new(false, 0.0, reason)
    }
}

// ============================================================================
// Candidate photos
// ============================================================================

/// Where a candidate photo came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum PhotoProvenance {
    /// Fetched from the places catalog
    Catalog { photo_reference: String },
    /// Uploaded directly by a user
    UserSubmitted,
}

/// A base64 image payload plus the media type the vision API needs.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedImage {
    pub base64: String,
    pub media_type: &'static str,
}

impl EncodedImage {
    /// Wrap an already-encoded payload, sniffing the media type.
    pub fn from_base64(base64: String) -> Self {
        let media_type = sniff_media_type(&base64);
        Self { base64, media_type }
    }

    /// Encode raw bytes, sniffing the media type from the encoded prefix.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        use base64::Engine as _;
        Self::from_base64(base64::engine::general_purpose::STANDARD.encode(bytes))
    }
}

/// Sniff the image media type from the base64 prefix. Defaults to JPEG,
/// which is what the places catalog serves.
fn sniff_media_type(base64: &str) -> &'static str {
    if base64.starts_with("iVBOR") {
        "image/png"
    } else if base64.starts_with("R0lGOD") {
        "image/gif"
    } else if base64.starts_with("UklGR") {
        "image/webp"
    } else {
        "image/jpeg"
    }
}

/// A raw image plus provenance, alive only for one analysis pass.
#[derive(Debug, Clone)]
pub struct CandidatePhoto {
    pub image: EncodedImage,
    pub provenance: PhotoProvenance,
}

impl CandidatePhoto {
    pub fn user_submitted(base64: String) -> Self {
        Self {
            image: EncodedImage::from_base64(base64),
            provenance: PhotoProvenance::UserSubmitted,
        }
    }
}

// ============================================================================
// Vision capability
// ============================================================================

/// Errors from the external vision capability.
///
/// The Gate and Classifier absorb all of these into conservative defaults;
/// they never propagate past those stages.
#[derive(Debug, Error)]
pub enum VisionError {
    #[error("Vision API key not configured")]
    MissingApiKey,

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Vision API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Vision API returned no text content")]
    EmptyResponse,
}

/// The external vision model, reduced to the one operation the pipeline
/// needs: look at an image, follow a textual instruction, return free text
/// (expected to be strict JSON, possibly fenced).
///
/// Output is not guaranteed deterministic between calls with identical
/// input. Implementations must not retry internally.
#[async_trait]
pub trait VisionCapability: Send + Sync {
    async fn describe_image(
        &self,
        image: &EncodedImage,
        system_instruction: Option<&str>,
        prompt: &str,
        max_tokens: u32,
    ) -> Result<String, VisionError>;
}
