use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A user-curated subscription (spec.md §3). Mutated only by the scheduler
/// pipeline (timestamps, counters); created/destroyed by external CRUD,
/// which this crate treats as an input, not a responsibility.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Feed {
    pub id: String,
    pub chat_id: i64,
    pub name: String,
    pub url: String,
    pub canonical_url: String,
    pub enabled: bool,
    pub failures: u32,
    pub last_check: Option<DateTime<Utc>>,
    pub last_notified_at: Option<DateTime<Utc>>,
    /// Reserved per spec.md §9 open question: read as a fallback source
    /// but never written by the delta engine.
    pub last_seen_at: Option<DateTime<Utc>>,
    pub last_item_id: Option<String>,
    pub check_interval_minutes: i64,
    pub max_item_age_minutes: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Feed {
    pub fn new(id: impl Into<String>, chat_id: i64, name: impl Into<String>, url: impl Into<String>) -> Self {
        let now = Utc::now();
        let url = url.into();
        Self {
            id: id.into(),
            chat_id,
            name: name.into(),
            canonical_url: url.clone(),
            url,
            enabled: true,
            failures: 0,
            last_check: None,
            last_notified_at: None,
            last_seen_at: None,
            last_item_id: None,
            check_interval_minutes: 10,
            max_item_age_minutes: Some(1440),
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether this feed is due for a check at `now` (spec.md §4.13).
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        match self.last_check {
            None => true,
            Some(last) => {
                let elapsed = now.signed_duration_since(last);
                elapsed.num_minutes() >= self.check_interval_minutes
            }
        }
    }
}

/// A single feed entry as normalized from an RSS/Atom/JSON source
/// (spec.md §3). Items without an id must never be constructed — the
/// fetcher enforces that invariant before producing one of these.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeedItem {
    pub id: String,
    pub title: String,
    pub link: String,
    pub description: Option<String>,
    pub pub_date: Option<DateTime<Utc>>,
    pub author: Option<String>,
    pub categories: Vec<String>,
}

/// The result of a single fetch: an ordered sequence of items as produced
/// by the source parser, not assumed chronological (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ParsedFeed {
    pub items: Vec<FeedItem>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub link: Option<String>,
}

impl ParsedFeed {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
