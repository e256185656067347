use std::collections::HashMap;
use std::time::{Duration, Instant};

const METHOD_CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Endpoint variants tried in order against a blocked subreddit
/// (spec.md §4.8). `Json` is the unauthenticated `.json` listing endpoint,
/// used here as a feed-shaped fallback rather than a full Reddit API client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RedditMethod {
    Rss,
    Json,
    OldRss,
}

impl RedditMethod {
    pub fn url_for(self, subreddit: &str) -> String {
        match self {
            RedditMethod::Rss => format!("https://www.reddit.com/r/{subreddit}/.rss"),
            RedditMethod::Json => format!("https://www.reddit.com/r/{subreddit}.json"),
            RedditMethod::OldRss => format!("https://old.reddit.com/r/{subreddit}/.rss"),
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            RedditMethod::Rss => "rss",
            RedditMethod::Json => "json",
            RedditMethod::OldRss => "old_rss",
        }
    }
}

const METHOD_ORDER: [RedditMethod; 3] = [RedditMethod::Rss, RedditMethod::Json, RedditMethod::OldRss];

/// C8: remembers which endpoint last worked for a subreddit for 24h, and
/// falls through `[rss, json, old_rss]` in order when none is cached or the
/// cached one has since started failing.
#[derive(Debug, Default)]
pub struct RedditFallbackChain {
    successful_methods: HashMap<String, (RedditMethod, Instant)>,
}

impl RedditFallbackChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the ordered list of endpoint URLs to try for `subreddit`:
    /// the cached method first (if still within TTL), then the remaining
    /// methods in canonical order.
    pub fn candidate_urls(&self, subreddit: &str) -> Vec<(RedditMethod, String)> {
        let mut order = Vec::with_capacity(METHOD_ORDER.len());
        if let Some((cached, seen_at)) = self.successful_methods.get(subreddit) {
            if seen_at.elapsed() < METHOD_CACHE_TTL {
                order.push(*cached);
            }
        }
        for method in METHOD_ORDER {
            if !order.contains(&method) {
                order.push(method);
            }
        }
        order.into_iter().map(|m| (m, m.url_for(subreddit))).collect()
    }

    /// Call once a candidate succeeds, to remember it for next time.
    pub fn record_success(&mut self, subreddit: &str, method: RedditMethod) {
        self.successful_methods.insert(subreddit.to_string(), (method, Instant::now()));
    }

    /// Call when the cached method fails, evicting it so the next poll
    /// re-tries the full chain instead of wasting a cycle on a dead method.
    pub fn purge(&mut self, subreddit: &str) {
        self.successful_methods.remove(subreddit);
    }

    pub fn cached_method(&self, subreddit: &str) -> Option<&'static str> {
        self.successful_methods.get(subreddit).map(|(m, _)| m.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tries_methods_in_canonical_order_with_no_cache() {
        let chain = RedditFallbackChain::new();
        let urls = chain.candidate_urls("rust");
        let methods: Vec<RedditMethod> = urls.iter().map(|(m, _)| *m).collect();
        assert_eq!(methods, vec![RedditMethod::Rss, RedditMethod::Json, RedditMethod::OldRss]);
        assert_eq!(urls[0].1, "https://www.reddit.com/r/rust/.rss");
    }

    #[test]
    fn cached_method_is_tried_first() {
        let mut chain = RedditFallbackChain::new();
        chain.record_success("rust", RedditMethod::OldRss);
        let urls = chain.candidate_urls("rust");
        assert_eq!(urls[0].0, RedditMethod::OldRss);
        // still contains the others, no duplicates
        assert_eq!(urls.len(), 3);
    }

    #[test]
    fn purge_drops_the_cached_method() {
        let mut chain = RedditFallbackChain::new();
        chain.record_success("rust", RedditMethod::Json);
        assert_eq!(chain.cached_method("rust"), Some("json"));
        chain.purge("rust");
        assert_eq!(chain.cached_method("rust"), None);
        let urls = chain.candidate_urls("rust");
        assert_eq!(urls[0].0, RedditMethod::Rss);
    }
}
