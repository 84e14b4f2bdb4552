//! Elapsed-time phrasing for freshness displays
//!
//! Menu records are labeled by how long ago they were analyzed. This module
//! provides the whole-day arithmetic and the human phrasing shared by every
//! surface that shows a record's age.

use chrono::{DateTime, Utc};

/// Whole days elapsed between two instants, truncated toward zero.
///
/// A `later` earlier than `earlier` (clock skew) clamps to 0 rather than
/// going negative, since a record cannot be analyzed in the future.
///
/// # Examples
///
/// ```
/// use chrono::{Duration, Utc};
/// use forkcast_common::elapsed::whole_days_between;
///
/// let now = Utc::now();
/// assert_eq!(whole_days_between(now - Duration::days(12), now), 12);
/// assert_eq!(whole_days_between(now - Duration::hours(30), now), 1);
/// assert_eq!(whole_days_between(now + Duration::days(1), now), 0);
/// ```
pub fn whole_days_between(earlier: DateTime<Utc>, later: DateTime<Utc>) -> i64 {
    (later - earlier).num_days().max(0)
}

/// Phrase an elapsed day count for display ("analyzed {phrase}").
///
/// # Examples
///
/// ```
/// use forkcast_common::elapsed::describe_days_ago;
///
/// assert_eq!(describe_days_ago(0), "today");
/// assert_eq!(describe_days_ago(1), "yesterday");
/// assert_eq!(describe_days_ago(12), "12 days ago");
/// ```
pub fn describe_days_ago(days: i64) -> String {
    match days {
        d if d <= 0 => "today".to_string(),
        1 => "yesterday".to_string(),
        d => format!("{} days ago", d),
    }
}
