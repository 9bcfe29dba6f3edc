//! Merging freshly fetched items into a wallet's cached timeline.

use std::collections::HashSet;

use ledgerlens_shared::filters::{drop_zero_value, ItemIdentity};
use ledgerlens_shared::models::HistoryItem;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOutcome {
    /// Newest first, at most `max_items`.
    pub items: Vec<HistoryItem>,
    pub new_items: u64,
    pub duplicate_items: u64,
    /// Items were dropped to respect `max_items`.
    pub truncated: bool,
}

/// Folds `fetched` into `baseline`.
///
/// Zero-value items are dropped from both sides. A fetched item is new when its identity is
/// neither in the baseline nor earlier in the same fetch; everything else counts as a
/// duplicate. The result is sorted by timestamp descending (stable, so new items win ties)
/// and truncated to `max_items`.
pub fn merge_fetched(
    baseline: Vec<HistoryItem>,
    fetched: Vec<HistoryItem>,
    max_items: usize,
) -> MergeOutcome {
    let baseline = drop_zero_value(baseline);
    let fetched = drop_zero_value(fetched);

    let keep: Vec<bool> = {
        let known: HashSet<ItemIdentity<'_>> =
            baseline.iter().map(HistoryItem::identity).collect();
        let mut seen_in_fetch: HashSet<ItemIdentity<'_>> = HashSet::with_capacity(fetched.len());
        fetched
            .iter()
            .map(|item| {
                let id = item.identity();
                !known.contains(&id) && seen_in_fetch.insert(id)
            })
            .collect()
    };

    let fetched_count = fetched.len() as u64;
    let mut items: Vec<HistoryItem> = fetched
        .into_iter()
        .zip(keep)
        .filter_map(|(item, is_new)| is_new.then_some(item))
        .collect();
    let new_items = items.len() as u64;

    items.extend(baseline);
    items.sort_by(|a, b| b.timestamp_sec.cmp(&a.timestamp_sec));
    let truncated = items.len() > max_items;
    items.truncate(max_items);

    MergeOutcome {
        items,
        new_items,
        duplicate_items: fetched_count - new_items,
        truncated,
    }
}
