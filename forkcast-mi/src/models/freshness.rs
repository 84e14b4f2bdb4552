//! Menu record freshness
//!
//! A restaurant's committed menu ages through three states measured in
//! whole days since the last committed analysis: fresh (0-6), recent
//! (7-29), stale (30 and beyond). Fresh records short-circuit new catalog
//! analysis requests; stale records are still served but carry a re-scan
//! nudge. An absent record is not a freshness state at all, it is a
//! distinct not-found outcome.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use forkcast_common::elapsed::whole_days_between;

const FRESH_MAX_DAYS: i64 = 6;
const RECENT_MAX_DAYS: i64 = 29;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Freshness {
    Fresh,
    Recent,
    Stale,
}

impl Freshness {
    /// Classify an elapsed whole-day count. Boundaries are inclusive on
    /// both ends of each band.
    pub fn from_days(days: i64) -> Self {
        if days <= FRESH_MAX_DAYS {
            Freshness::Fresh
        } else if days <= RECENT_MAX_DAYS {
            Freshness::Recent
        } else {
            Freshness::Stale
        }
    }

    pub fn classify(last_analyzed: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        Self::from_days(whole_days_between(last_analyzed, now))
    }

    pub fn label(&self) -> &'static str {
        match self {
            Freshness::Fresh => "fresh",
            Freshness::Recent => "recent",
            Freshness::Stale => "stale",
        }
    }

    /// Human-readable guidance served alongside the label.
    pub fn nudge(&self) -> &'static str {
        match self {
            Freshness::Fresh => "Menu analysis is current.",
            Freshness::Recent => "Menu analyzed recently. Re-scan for the latest.",
            Freshness::Stale => "Re-scan if the menu may have changed.",
        }
    }

    /// Whether a write request may be served from the cached active set.
    pub fn allows_cache_hit(&self) -> bool {
        matches!(self, Freshness::Fresh)
    }
}
