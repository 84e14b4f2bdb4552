//! Menu image gate
//!
//! Decides whether a candidate photo is a restaurant menu. The vision
//! capability is asked for a strict JSON verdict; any failure on the way
//! (transport, capability error, unparseable reply) is absorbed into a
//! rejection with zero confidence. The gate never errors to its caller.

use std::sync::Arc;

use crate::types::{EncodedImage, MenuPhotoVerdict, VisionCapability};

const GATE_MAX_TOKENS: u32 = 300;

const GATE_PROMPT: &str = r#"Is this a restaurant menu? Respond with JSON only:

{
  "is_menu": true/false,
  "confidence": 0.0-1.0,
  "reason": "brief explanation"
}

A menu shows food/drink items with names and usually prices.
Photos of prepared dishes, restaurant interiors, exteriors, or people are NOT menus.
Menu boards, printed menus, digital menus, and chalkboard menus ARE menus."#;

/// Accept/reject screen for candidate menu photos.
pub struct MenuImageGate {
    vision: Arc<dyn VisionCapability>,
}

impl MenuImageGate {
    pub fn new(vision: Arc<dyn VisionCapability>) -> Self {
        Self { vision }
    }

    /// Classify one photo. Failures become conservative rejections carrying
    /// the failure cause in `reason`.
    pub async fn classify_photo(&self, image: &EncodedImage) -> MenuPhotoVerdict {
        let reply = match self
            .vision
            .describe_image(image, None, GATE_PROMPT, GATE_MAX_TOKENS)
            .await
        {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(error = %e, "Menu detection call failed");
                return MenuPhotoVerdict::rejected(format!("Error: {}", e));
            }
        };

        let cleaned = strip_code_fences(&reply);
        match serde_json::from_str::<MenuPhotoVerdict>(&cleaned) {
            Ok(parsed) => {
                let verdict =
                    MenuPhotoVerdict::new(parsed.is_menu, parsed.confidence, parsed.reason);
                tracing::info!(
                    is_menu = verdict.is_menu,
                    confidence = verdict.confidence,
                    "Menu detection"
                );
                verdict
            }
            Err(e) => {
                tracing::error!(error = %e, "Menu detection reply did not parse");
                MenuPhotoVerdict::rejected(format!("Error: {}", e))
            }
        }
    }
}

/// `true` when the verdict clears the acceptance rule. Confidence exactly
/// equal to the threshold accepts.
pub fn acceptance(verdict: &MenuPhotoVerdict, min_confidence: f64) -> bool {
    verdict.is_menu && verdict.confidence >= min_confidence
}

/// Drop markdown code fence lines wrapping a JSON reply. The capability
/// sometimes fences its output despite being told not to; fence lines are
/// removed wherever they appear and the rest is kept in order.
pub(crate) fn strip_code_fences(text: &str) -> String {
    let trimmed = text.trim();
    if !trimmed.starts_with("```") {
        return trimmed.to_string();
    }
    trimmed
        .lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}
