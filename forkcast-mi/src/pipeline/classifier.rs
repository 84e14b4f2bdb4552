//! Menu extraction and safety classification
//!
//! Sends an accepted menu photo to the vision capability together with the
//! composed trigger context and parses the structured item list out of the
//! reply. The instruction contract biases the model toward `caution` over
//! `safe` under ambiguity and asks it to infer unprinted ingredients from
//! typical restaurant preparation.
//!
//! Failure handling mirrors the gate's conservatism but with a visible
//! artifact: any capability or parse failure yields a single `caution` item
//! named "Error parsing menu", so an empty list always means an empty or
//! unreadable menu rather than a swallowed infrastructure failure.

use std::sync::Arc;

use serde::Deserialize;

use super::gate::strip_code_fences;
use crate::protocols::{format_for_prompt, CombinedTriggerSet};
use crate::types::{EncodedImage, MenuItem, Safety, VisionCapability};

const EXTRACTION_MAX_TOKENS: u32 = 4096;

const SYSTEM_PROMPT: &str = r#"You are a dietary analysis assistant helping diners with dietary restrictions identify safe menu items at restaurants.

Your task is to:
1. Extract all menu items from the provided image
2. For each item, infer the likely ingredients based on common restaurant preparation methods
3. Check each item against the user's dietary restrictions
4. Provide a safety rating and explanation

IMPORTANT GUIDELINES:
- Be CONSERVATIVE in your assessments. When uncertain, flag as "caution" rather than "safe"
- Consider hidden ingredients (e.g., garlic and onion are common in most restaurant sauces)
- Note that breaded items contain wheat/flour
- Cream-based sauces contain dairy
- Many dressings contain garlic, onion, or honey
- Always recommend asking the server about preparation methods for uncertain items

SAFETY RATINGS:
- "safe": Item appears to contain no trigger ingredients based on typical preparation
- "caution": Item may contain trigger ingredients or preparation is uncertain
- "avoid": Item clearly contains one or more trigger ingredients

You must respond with valid JSON only, no additional text."#;

/// Reply envelope: `{"menu_items": [...]}`, optionally with an `error`
/// field when the image was unreadable.
#[derive(Debug, Deserialize)]
struct ExtractionPayload {
    #[serde(default)]
    menu_items: Vec<MenuItem>,
    #[serde(default)]
    error: Option<String>,
}

/// Extracts menu items from an accepted photo and classifies each against
/// the composed trigger set.
pub struct SafetyClassifier {
    vision: Arc<dyn VisionCapability>,
}

impl SafetyClassifier {
    pub fn new(vision: Arc<dyn VisionCapability>) -> Self {
        Self { vision }
    }

    /// Analyze one accepted photo. Never errors: failures surface as a
    /// single sentinel item so the outcome stays observable.
    pub async fn analyze(
        &self,
        image: &EncodedImage,
        triggers: &CombinedTriggerSet,
    ) -> Vec<MenuItem> {
        let prompt = build_user_prompt(triggers);

        let reply = match self
            .vision
            .describe_image(image, Some(SYSTEM_PROMPT), &prompt, EXTRACTION_MAX_TOKENS)
            .await
        {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(error = %e, "Menu analysis call failed");
                return vec![failure_item(format!(
                    "Menu analysis did not complete. Please try again. Error: {}",
                    e
                ))];
            }
        };

        let cleaned = strip_code_fences(&reply);
        match serde_json::from_str::<ExtractionPayload>(&cleaned) {
            Ok(payload) => {
                if let Some(error) = payload.error {
                    tracing::warn!(error = %error, "Vision capability could not read the menu");
                }
                tracing::info!(items = payload.menu_items.len(), "Menu analysis completed");
                payload.menu_items
            }
            Err(e) => {
                tracing::error!(error = %e, "Menu analysis reply did not parse");
                vec![failure_item(format!(
                    "Could not parse menu analysis. Please try again with a clearer image. Error: {}",
                    e
                ))]
            }
        }
    }
}

fn build_user_prompt(triggers: &CombinedTriggerSet) -> String {
    format!(
        r#"Analyze this restaurant menu image for a diner following these dietary protocols: {}

{}

Extract each menu item and provide analysis in this exact JSON format:
{{
  "menu_items": [
    {{
      "name": "Item Name",
      "safety": "safe|caution|avoid",
      "triggers": ["list", "of", "trigger", "ingredients", "found"],
      "notes": "Explanation of the assessment and any recommendations"
    }}
  ]
}}

If you cannot read the menu or extract items, return:
{{
  "menu_items": [],
  "error": "Description of the issue"
}}

Analyze the menu now:"#,
        triggers.protocol_ids().join(", "),
        format_for_prompt(triggers)
    )
}

/// Sentinel item for capability/parse failures. Flagged `caution` so it is
/// never mistaken for a safe dish.
fn failure_item(notes: String) -> MenuItem {
    MenuItem {
        name: "Error parsing menu".to_string(),
        safety: Safety::Caution,
        triggers: Vec::new(),
        notes,
    }
}
