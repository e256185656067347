use std::time::Duration;

use moka::future::Cache as MokaCache;
use serde::{Deserialize, Serialize};

use crate::feed_item::ParsedFeed;

/// HTTP validator metadata for conditional GET (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct FeedMeta {
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}

const FEED_TTL: Duration = Duration::from_secs(5 * 60);
const META_TTL: Duration = Duration::from_secs(60 * 60);

/// C6: key/value cache with TTL for parsed feeds and HTTP validator
/// metadata. Backed by an in-process TTL store standing in for the
/// original's "external store if available, else disabled silently" —
/// a cache miss never affects correctness (spec.md §5), so an in-memory
/// implementation satisfies every invariant the engine depends on.
pub struct Cache {
    feeds: MokaCache<String, ParsedFeed>,
    meta: MokaCache<String, FeedMeta>,
    disabled: bool,
}

impl Cache {
    pub fn new(disabled: bool) -> Self {
        Self {
            feeds: MokaCache::builder().time_to_live(FEED_TTL).build(),
            meta: MokaCache::builder().time_to_live(META_TTL).build(),
            disabled,
        }
    }

    fn feed_key(url: &str) -> String {
        format!("feed:{url}")
    }

    fn meta_key(url: &str) -> String {
        format!("feed_meta:{url}")
    }

    pub async fn get_feed(&self, url: &str) -> Option<ParsedFeed> {
        if self.disabled {
            return None;
        }
        self.feeds.get(&Self::feed_key(url)).await
    }

    /// Never caches an empty parsed feed (spec.md §4.6 invariant).
    pub async fn set_feed(&self, url: &str, feed: ParsedFeed) {
        if self.disabled || feed.is_empty() {
            return;
        }
        self.feeds.insert(Self::feed_key(url), feed).await;
    }

    pub async fn invalidate_feed(&self, url: &str) {
        self.feeds.invalidate(&Self::feed_key(url)).await;
    }

    pub async fn get_meta(&self, url: &str) -> Option<FeedMeta> {
        if self.disabled {
            return None;
        }
        self.meta.get(&Self::meta_key(url)).await
    }

    pub async fn set_meta(&self, url: &str, meta: FeedMeta) {
        if self.disabled {
            return;
        }
        self.meta.insert(Self::meta_key(url), meta).await;
    }

    pub async fn invalidate_meta(&self, url: &str) {
        self.meta.invalidate(&Self::meta_key(url)).await;
    }

    pub async fn invalidate_both(&self, url: &str) {
        self.invalidate_feed(url).await;
        self.invalidate_meta(url).await;
    }

    pub fn ping(&self) -> bool {
        !self.disabled
    }
}
