//! Contribution merger
//!
//! Collapses item lists from multiple photos (or multiple contributors) into
//! one deduplicated list. The dedup key is the item name lowercased and
//! trimmed. When two items collide, the one with the longer `notes` text
//! wins as a proxy for "more detailed"; equal lengths keep the first seen.
//! Output preserves first-encounter order, so the surviving key set is the
//! same whatever order the input lists arrive in, and re-merging an already
//! merged list changes nothing.

use std::collections::HashMap;

use crate::types::MenuItem;

/// Merge any number of item lists into one deduplicated list.
pub fn merge<I>(lists: I) -> Vec<MenuItem>
where
    I: IntoIterator<Item = Vec<MenuItem>>,
{
    let mut merged: Vec<MenuItem> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for item in lists.into_iter().flatten() {
        let key = item.dedup_key();
        match index.get(&key) {
            None => {
                index.insert(key, merged.len());
                merged.push(item);
            }
            Some(&slot) => {
                if item.notes.chars().count() > merged[slot].notes.chars().count() {
                    merged[slot] = item;
                }
            }
        }
    }

    merged
}
