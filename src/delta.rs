use chrono::{DateTime, Utc};
use tracing::warn;

use crate::feed_item::{FeedItem, ParsedFeed};

/// Outcome of running the delta engine against a fetched feed (spec.md §4.10).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DeltaResult {
    /// New items to notify, sorted by `pub_date` descending.
    pub items: Vec<FeedItem>,
    /// Set only on first observation: the baseline marker to persist as
    /// `Feed.last_item_id` without changing `last_notified_at` here — the
    /// caller derives the baseline date from the feed's own first item.
    pub last_item_id_to_save: Option<String>,
    /// The feed's current first item id, used by the caller to bump
    /// `last_item_id` even when there are no new items.
    pub first_item_id: Option<String>,
}

/// C10: computes items new since the last observation using strict
/// date comparison, tolerant of popularity-ordered feeds (spec.md §4.10).
pub fn compute_delta(
    feed: &ParsedFeed,
    last_item_id: Option<&str>,
    last_notified_at: Option<DateTime<Utc>>,
) -> DeltaResult {
    if feed.items.is_empty() {
        return DeltaResult::default();
    }

    let first_item = &feed.items[0];

    if last_item_id.is_none() {
        return DeltaResult {
            items: vec![],
            last_item_id_to_save: Some(first_item.id.clone()),
            first_item_id: Some(first_item.id.clone()),
        };
    }

    let Some(last_notified_at) = last_notified_at else {
        warn!("no last_notified_at for a feed with a known last_item_id; treating first item as new");
        return DeltaResult {
            items: vec![first_item.clone()],
            last_item_id_to_save: None,
            first_item_id: Some(first_item.id.clone()),
        };
    };

    let mut new_items: Vec<FeedItem> = feed
        .items
        .iter()
        .filter(|item| match item.pub_date {
            Some(d) => d > last_notified_at,
            None => {
                warn!(item_id = %item.id, "skipping item with no pub_date in delta computation");
                false
            }
        })
        .cloned()
        .collect();

    new_items.sort_by_key(|item| std::cmp::Reverse(item.pub_date));

    DeltaResult {
        items: new_items,
        last_item_id_to_save: None,
        first_item_id: Some(first_item.id.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn item(id: &str, pub_date: Option<DateTime<Utc>>) -> FeedItem {
        FeedItem {
            id: id.into(),
            title: format!("title-{id}"),
            link: format!("http://x.test/{id}"),
            description: None,
            pub_date,
            author: None,
            categories: vec![],
        }
    }

    fn dt(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, hour, 0, 0).unwrap()
    }

    #[test]
    fn empty_feed_yields_empty_delta() {
        let feed = ParsedFeed::default();
        let result = compute_delta(&feed, Some("x"), Some(dt(10)));
        assert_eq!(result, DeltaResult::default());
    }

    #[test]
    fn baseline_scenario_sets_marker_and_notifies_nothing() {
        // End-to-end scenario 1: first observation of a brand-new feed.
        let feed = ParsedFeed {
            items: vec![item("10h", Some(dt(10))), item("9h", Some(dt(9))), item("8h", Some(dt(8)))],
            ..Default::default()
        };
        let result = compute_delta(&feed, None, None);
        assert!(result.items.is_empty());
        assert_eq!(result.last_item_id_to_save.as_deref(), Some("10h"));
        assert_eq!(result.first_item_id.as_deref(), Some("10h"));
    }

    #[test]
    fn strict_newer_detection_finds_item_out_of_position_order() {
        // End-to-end scenario 2: popularity-ordered feed, new item buried.
        let feed = ParsedFeed {
            items: vec![item("10h", Some(dt(10))), item("9h", Some(dt(9))), item("11h", Some(dt(11)))],
            ..Default::default()
        };
        let result = compute_delta(&feed, Some("10h"), Some(dt(10)));
        assert_eq!(result.items.len(), 1);
        assert_eq!(result.items[0].id, "11h");
    }

    #[test]
    fn popularity_ordered_feed_finds_new_item_at_deep_position() {
        // Boundary case: item at position 0 is older, position 7 is newer.
        let mut items: Vec<FeedItem> = (0..8).map(|i| item(&format!("old-{i}"), Some(dt(1)))).collect();
        items[7] = item("new", Some(dt(20)));
        let feed = ParsedFeed { items, ..Default::default() };
        let result = compute_delta(&feed, Some("old-0"), Some(dt(5)));
        assert_eq!(result.items.len(), 1);
        assert_eq!(result.items[0].id, "new");
    }

    #[test]
    fn strict_greater_than_excludes_equal_pub_date() {
        let feed = ParsedFeed {
            items: vec![item("a", Some(dt(10)))],
            ..Default::default()
        };
        let result = compute_delta(&feed, Some("a"), Some(dt(10)));
        assert!(result.items.is_empty());
    }

    #[test]
    fn items_without_pub_date_are_skipped() {
        let feed = ParsedFeed {
            items: vec![item("a", None), item("b", Some(dt(11)))],
            ..Default::default()
        };
        let result = compute_delta(&feed, Some("x"), Some(dt(10)));
        assert_eq!(result.items.len(), 1);
        assert_eq!(result.items[0].id, "b");
    }

    #[test]
    fn missing_last_notified_at_treats_first_item_as_new() {
        let feed = ParsedFeed {
            items: vec![item("a", Some(dt(10))), item("b", Some(dt(9)))],
            ..Default::default()
        };
        let result = compute_delta(&feed, Some("z"), None);
        assert_eq!(result.items.len(), 1);
        assert_eq!(result.items[0].id, "a");
    }

    #[test]
    fn new_items_are_sorted_descending_by_pub_date() {
        let feed = ParsedFeed {
            items: vec![item("a", Some(dt(11))), item("b", Some(dt(13))), item("c", Some(dt(12)))],
            ..Default::default()
        };
        let result = compute_delta(&feed, Some("x"), Some(dt(10)));
        let ids: Vec<&str> = result.items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c", "a"]);
    }
}
