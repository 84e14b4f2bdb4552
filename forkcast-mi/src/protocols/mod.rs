//! Trigger Knowledge Base
//!
//! Loads per-protocol ingredient-trigger definitions and merges them into one
//! unified trigger set for a requested protocol combination. Definitions are
//! immutable reference data embedded at compile time; the registry parses
//! them lazily and caches the parsed form. The registry is constructed
//! explicitly and handed to the pipeline, so cache invalidation points are
//! process start and an explicit `reload()`.
//!
//! Composition is deterministic: identical protocol-id sets produce
//! set-equal trigger data regardless of input order, and the union sets are
//! normalized (lowercase, trimmed) so they carry no duplicates.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

/// Embedded protocol definition files, keyed by protocol id.
///
/// The first three ship with the legacy category key names
/// (`high_fodmap_categories`, `illegal_categories`,
/// `high_residue_categories`); the deserializer accepts those as aliases.
const PROTOCOL_FILES: &[(&str, &str)] = &[
    ("low_fodmap", include_str!("data/low_fodmap.json")),
    ("scd", include_str!("data/scd.json")),
    ("low_residue", include_str!("data/low_residue.json")),
    ("gluten_free", include_str!("data/gluten_free.json")),
    ("dairy_free", include_str!("data/dairy_free.json")),
    ("nut_free", include_str!("data/nut_free.json")),
    ("peanut_free", include_str!("data/peanut_free.json")),
    ("soy_free", include_str!("data/soy_free.json")),
    ("egg_free", include_str!("data/egg_free.json")),
    ("shellfish_free", include_str!("data/shellfish_free.json")),
    ("fish_free", include_str!("data/fish_free.json")),
    ("pork_free", include_str!("data/pork_free.json")),
    ("red_meat_free", include_str!("data/red_meat_free.json")),
    ("vegan", include_str!("data/vegan.json")),
    ("vegetarian", include_str!("data/vegetarian.json")),
    ("paleo", include_str!("data/paleo.json")),
    ("keto", include_str!("data/keto.json")),
    ("low_histamine", include_str!("data/low_histamine.json")),
];

/// Errors from protocol definition lookup and parsing.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Unknown protocol: {0}")]
    Unknown(String),

    #[error("Malformed protocol definition {id}: {source}")]
    Malformed {
        id: String,
        #[source]
        source: serde_json::Error,
    },
}

/// One category of trigger ingredients within a protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerCategory {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub triggers: Vec<String>,
}

/// A complete protocol definition as stored in the definition files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolDefinition {
    pub protocol_id: String,
    pub protocol_name: String,
    #[serde(default)]
    pub description: String,
    /// Category map. Older definition files named this key after the diet
    /// family; all legacy spellings land here.
    #[serde(
        default,
        alias = "high_fodmap_categories",
        alias = "illegal_categories",
        alias = "high_residue_categories"
    )]
    pub trigger_categories: BTreeMap<String, TriggerCategory>,
    #[serde(default)]
    pub common_restaurant_triggers: Vec<String>,
    #[serde(default)]
    pub safe_alternatives: Vec<String>,
}

/// Protocol identity surfaced to clients and prompts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolSummary {
    pub id: String,
    pub name: String,
    pub description: String,
}

/// The merged trigger data for one requested protocol combination.
///
/// Union sets are normalized and held in ordered sets, so two compositions
/// of the same protocols compare equal regardless of request order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CombinedTriggerSet {
    pub protocols: Vec<ProtocolSummary>,
    pub all_triggers: BTreeSet<String>,
    pub common_restaurant_triggers: BTreeSet<String>,
    pub safe_alternatives: BTreeSet<String>,
    /// Per-protocol category detail, retained for explanation text.
    pub detailed_triggers: BTreeMap<String, BTreeMap<String, TriggerCategory>>,
}

impl CombinedTriggerSet {
    fn empty() -> Self {
        Self {
            protocols: Vec::new(),
            all_triggers: BTreeSet::new(),
            common_restaurant_triggers: BTreeSet::new(),
            safe_alternatives: BTreeSet::new(),
            detailed_triggers: BTreeMap::new(),
        }
    }

    pub fn protocol_ids(&self) -> Vec<String> {
        self.protocols.iter().map(|p| p.id.clone()).collect()
    }
}

/// Lowercase-and-trim normalization applied to every union-set entry.
fn normalize(ingredient: &str) -> String {
    ingredient.trim().to_lowercase()
}

/// Read-through cache over the embedded protocol definitions.
pub struct ProtocolRegistry {
    sources: HashMap<&'static str, &'static str>,
    cache: RwLock<HashMap<String, Arc<ProtocolDefinition>>>,
}

impl ProtocolRegistry {
    pub fn new() -> Self {
        Self {
            sources: PROTOCOL_FILES.iter().copied().collect(),
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// All known protocol ids, sorted.
    pub fn known_ids(&self) -> Vec<&'static str> {
        let mut ids: Vec<&'static str> = self.sources.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn contains(&self, id: &str) -> bool {
        self.sources.contains_key(id)
    }

    /// Boundary validation: reject the first unknown id.
    ///
    /// Callers performing request validation use this before `compose`, so
    /// by composition time ids are already known-valid.
    pub fn validate(&self, ids: &[String]) -> Result<(), ProtocolError> {
        for id in ids {
            if !self.contains(id) {
                return Err(ProtocolError::Unknown(id.clone()));
            }
        }
        Ok(())
    }

    /// Fetch one parsed definition through the cache.
    pub fn definition(&self, id: &str) -> Result<Arc<ProtocolDefinition>, ProtocolError> {
        if let Some(parsed) = self.cache.read().expect("protocol cache poisoned").get(id) {
            return Ok(Arc::clone(parsed));
        }

        let source = self
            .sources
            .get(id)
            .ok_or_else(|| ProtocolError::Unknown(id.to_string()))?;
        let parsed: ProtocolDefinition =
            serde_json::from_str(source).map_err(|source| ProtocolError::Malformed {
                id: id.to_string(),
                source,
            })?;
        let parsed = Arc::new(parsed);

        self.cache
            .write()
            .expect("protocol cache poisoned")
            .insert(id.to_string(), Arc::clone(&parsed));
        Ok(parsed)
    }

    /// Drop all cached definitions; they re-parse on next use.
    pub fn reload(&self) {
        self.cache.write().expect("protocol cache poisoned").clear();
    }

    /// Summaries of every known protocol, sorted by id.
    pub fn list(&self) -> Vec<ProtocolSummary> {
        self.known_ids()
            .into_iter()
            .filter_map(|id| self.definition(id).ok())
            .map(|def| ProtocolSummary {
                id: def.protocol_id.clone(),
                name: def.protocol_name.clone(),
                description: def.description.clone(),
            })
            .collect()
    }

    /// Merge the requested protocols into one combined trigger set.
    ///
    /// Unknown or unparseable ids are skipped with a logged gap; known ids
    /// still contribute. Input order and duplicates do not affect the
    /// result: ids are canonicalized to a set before merging.
    pub fn compose(&self, ids: &[String]) -> CombinedTriggerSet {
        let requested: BTreeSet<&str> = ids.iter().map(|s| s.as_str()).collect();
        let mut combined = CombinedTriggerSet::empty();

        for id in requested {
            let definition = match self.definition(id) {
                Ok(def) => def,
                Err(e) => {
                    warn!(protocol = %id, error = %e, "Skipping protocol with no usable definition");
                    continue;
                }
            };

            combined.protocols.push(ProtocolSummary {
                id: definition.protocol_id.clone(),
                name: definition.protocol_name.clone(),
                description: definition.description.clone(),
            });

            for category in definition.trigger_categories.values() {
                combined
                    .all_triggers
                    .extend(category.triggers.iter().map(|t| normalize(t)));
            }
            combined
                .common_restaurant_triggers
                .extend(definition.common_restaurant_triggers.iter().map(|t| normalize(t)));
            combined
                .safe_alternatives
                .extend(definition.safe_alternatives.iter().map(|t| normalize(t)));

            combined.detailed_triggers.insert(
                definition.protocol_id.clone(),
                definition.trigger_categories.clone(),
            );
        }

        combined
    }

    #[cfg(test)]
    fn cached_len(&self) -> usize {
        self.cache.read().expect("protocol cache poisoned").len()
    }
}

impl Default for ProtocolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Render the combined trigger data as the context block for vision prompts.
///
/// Sections are sorted so identical compositions render identical text.
pub fn format_for_prompt(triggers: &CombinedTriggerSet) -> String {
    let mut lines = vec!["DIETARY RESTRICTIONS TO CHECK:".to_string(), String::new()];

    for protocol in &triggers.protocols {
        lines.push(format!("Protocol: {}", protocol.name));
        lines.push(format!("Description: {}", protocol.description));
        lines.push(String::new());
    }

    lines.push("COMMON RESTAURANT TRIGGERS TO FLAG:".to_string());
    for trigger in &triggers.common_restaurant_triggers {
        lines.push(format!("  - {}", trigger));
    }
    lines.push(String::new());

    lines.push("ALL TRIGGER INGREDIENTS:".to_string());
    for trigger in &triggers.all_triggers {
        lines.push(format!("  - {}", trigger));
    }
    lines.push(String::new());

    lines.push("GENERALLY SAFE ALTERNATIVES:".to_string());
    for safe in &triggers.safe_alternatives {
        lines.push(format!("  - {}", safe));
    }

    lines.join("\n")
}
