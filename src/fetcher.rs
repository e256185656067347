use chrono::Utc;
use tracing::{debug, warn};

use crate::alerts::{Alert, AlertManager};
use crate::cache::{Cache, FeedMeta};
use crate::circuit_breaker::CircuitBreaker;
use crate::error::FetchError;
use crate::feed_item::{FeedItem, ParsedFeed};
use crate::headers::HeaderBuilder;
use crate::rate_limiter::RateLimiter;
use crate::session::SessionManager;
use crate::stats::BlockingStatsStore;
use crate::ua_pool::UserAgentPool;

const MAX_RETRIES: u32 = 3;
const BASE_DELAY_MS: u64 = 1000;
const MAX_DELAY_MS: u64 = 30_000;

/// Everything C7 mutates across a single fetch, bundled so the scheduler
/// can own one struct instead of threading six component references
/// through every call site.
pub struct Fetcher<'a> {
    pub breaker: &'a mut CircuitBreaker,
    pub rate_limiter: &'a mut RateLimiter,
    pub ua_pool: &'a mut UserAgentPool,
    pub sessions: &'a mut SessionManager,
    pub cache: &'a Cache,
    pub stats: &'a mut BlockingStatsStore,
    pub alerts: &'a mut AlertManager,
}

/// Successful result of `fetch`, with any operator alerts raised along the way.
#[derive(Debug)]
pub struct FetchOutcome {
    pub feed: ParsedFeed,
    pub alerts: Vec<Alert>,
}

fn extract_domain(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_else(|| url.to_string())
}

fn backoff_for_attempt(attempt: u32) -> std::time::Duration {
    let ms = BASE_DELAY_MS.saturating_mul(1u64 << (attempt - 1)).min(MAX_DELAY_MS);
    std::time::Duration::from_millis(ms)
}

impl<'a> Fetcher<'a> {
    /// C7: fetches and parses a feed URL, orchestrating the circuit breaker,
    /// cache, rate limiter, session pool, UA pool, stats store and alert
    /// manager exactly as spec.md §4.7 describes. `url` is both the circuit
    /// breaker resource key and the cache key.
    pub async fn fetch(&mut self, url: &str) -> Result<FetchOutcome, FetchError> {
        let now = Utc::now();

        if !self.breaker.should_allow(url, now) {
            return Err(FetchError::CircuitOpen);
        }

        if let Some(cached) = self.cache.get_feed(url).await {
            if !cached.is_empty() {
                return Ok(FetchOutcome { feed: cached, alerts: vec![] });
            }
            self.cache.invalidate_both(url).await;
        }

        let domain = extract_domain(url);
        self.rate_limiter.wait_if_needed(&domain).await;

        let mut last_err = FetchError::Network("exhausted retries".to_string());

        for attempt in 1..=MAX_RETRIES {
            let ua = self.ua_pool.pick(&domain);
            let mut headers = HeaderBuilder::build(url, &ua);
            if let Some(meta) = self.cache.get_meta(url).await {
                if let Some(etag) = &meta.etag {
                    if let Ok(v) = reqwest::header::HeaderValue::from_str(etag) {
                        headers.insert(reqwest::header::IF_NONE_MATCH, v);
                    }
                }
                if let Some(last_modified) = &meta.last_modified {
                    if let Ok(v) = reqwest::header::HeaderValue::from_str(last_modified) {
                        headers.insert(reqwest::header::IF_MODIFIED_SINCE, v);
                    }
                }
            }

            let client = self.sessions.get(&domain);
            let response = client.get(url).headers(headers).send().await;

            let outcome = match response {
                Err(e) => {
                    let err = if e.is_timeout() {
                        FetchError::Timeout
                    } else {
                        FetchError::Network(e.to_string())
                    };
                    self.record_failure(url, &domain, &ua, None, now);
                    last_err = err;
                    None
                }
                Ok(resp) if resp.status().as_u16() == 304 => {
                    if let Some(cached) = self.cache.get_feed(url).await {
                        if !cached.is_empty() {
                            self.record_success(url, &domain, &ua, now);
                            return Ok(FetchOutcome { feed: cached, alerts: vec![] });
                        }
                    }
                    warn!(%url, "304 Not Modified with no usable cache entry, refetching");
                    self.cache.invalidate_both(url).await;
                    last_err = FetchError::EmptyFeed;
                    None
                }
                Ok(resp) if !resp.status().is_success() => {
                    let status = resp.status().as_u16();
                    let alerts = self.record_failure(url, &domain, &ua, Some(status), now);
                    last_err = FetchError::HttpStatus(status);
                    if attempt == MAX_RETRIES {
                        if !alerts.is_empty() {
                            debug!(?alerts, "alerts raised on final failed attempt");
                        }
                        return Err(last_err);
                    }
                    None
                }
                Ok(resp) => {
                    let etag = resp.headers().get(reqwest::header::ETAG).and_then(|v| v.to_str().ok()).map(String::from);
                    let last_modified = resp
                        .headers()
                        .get(reqwest::header::LAST_MODIFIED)
                        .and_then(|v| v.to_str().ok())
                        .map(String::from);

                    match resp.bytes().await {
                        Ok(body) => match parse_feed(&body) {
                            Ok(parsed) => Some((parsed, etag, last_modified)),
                            Err(e) => {
                                self.record_failure(url, &domain, &ua, None, now);
                                last_err = e;
                                None
                            }
                        },
                        Err(e) => {
                            self.record_failure(url, &domain, &ua, None, now);
                            last_err = FetchError::Network(e.to_string());
                            None
                        }
                    }
                }
            };

            if let Some((parsed, etag, last_modified)) = outcome {
                if !parsed.is_empty() {
                    self.cache.set_feed(url, parsed.clone()).await;
                } else {
                    warn!(%url, "feed had no items, not caching");
                }
                if etag.is_some() || last_modified.is_some() {
                    self.cache.set_meta(url, FeedMeta { etag, last_modified }).await;
                }
                self.record_success(url, &domain, &ua, now);
                return Ok(FetchOutcome { feed: parsed, alerts: vec![] });
            }

            if attempt < MAX_RETRIES {
                tokio::time::sleep(backoff_for_attempt(attempt)).await;
            }
        }

        Err(last_err)
    }

    fn record_success(&mut self, url: &str, domain: &str, ua: &str, now: chrono::DateTime<Utc>) {
        self.rate_limiter.record_success(domain);
        self.ua_pool.record_success(domain, ua);
        self.breaker.record_success(url);
        let delay = self.rate_limiter.current_delay(domain).as_secs_f64();
        self.stats.record_success(domain, Some(ua), delay, now);
        self.alerts.reset_consecutive(domain);
    }

    fn record_failure(
        &mut self,
        url: &str,
        domain: &str,
        ua: &str,
        status: Option<u16>,
        now: chrono::DateTime<Utc>,
    ) -> Vec<Alert> {
        let status_code = status.unwrap_or(0);
        self.rate_limiter.record_failure(domain, status_code);
        self.ua_pool.record_failure(domain, ua);
        let just_opened = self.breaker.record_failure(url, now);
        let delay = self.rate_limiter.current_delay(domain).as_secs_f64();
        let breaker_state = self.breaker.state(url);
        self.stats.record_failure(domain, status_code, delay, breaker_state, now);

        let mut alerts = Vec::new();
        if let Some(status) = status {
            alerts.extend(self.alerts.check_on_block(domain, status, now));
        }
        if just_opened {
            alerts.push(self.alerts.circuit_opened(domain));
        }
        let success_rate = self.stats.success_rate(domain);
        let total = self.stats.domain_report(domain).map(|s| s.total).unwrap_or(0);
        if let Some(alert) = self.alerts.check_low_success_rate(domain, success_rate, total, now) {
            alerts.push(alert);
        }
        alerts
    }
}

/// Converts raw feed bytes into a `ParsedFeed`, discarding any entry lacking
/// an id. feed-rs synthesizes an id when the source doesn't supply one, so
/// in practice this only drops entries feed-rs itself couldn't make sense of.
fn parse_feed(body: &[u8]) -> Result<ParsedFeed, FetchError> {
    let parsed = feed_rs::parser::parse(body).map_err(|e| FetchError::Parse(e.to_string()))?;

    let mut skipped = 0;
    let items: Vec<FeedItem> = parsed
        .entries
        .into_iter()
        .filter_map(|entry| {
            if entry.id.trim().is_empty() {
                skipped += 1;
                return None;
            }
            let title = entry.title.map(|t| t.content).unwrap_or_default();
            let link = entry.links.first().map(|l| l.href.clone()).unwrap_or_default();
            let description = entry
                .summary
                .map(|s| s.content)
                .or_else(|| entry.content.and_then(|c| c.body));
            let pub_date = entry.published.or(entry.updated);
            let author = entry.authors.first().map(|p| p.name.clone());
            let categories = entry.categories.into_iter().map(|c| c.term).collect();

            Some(FeedItem {
                id: entry.id,
                title,
                link,
                description,
                pub_date,
                author,
                categories,
            })
        })
        .collect();

    if skipped > 0 {
        warn!(skipped, "discarded feed entries without an id");
    }

    Ok(ParsedFeed {
        items,
        title: parsed.title.map(|t| t.content),
        description: parsed.description.map(|d| d.content),
        link: parsed.links.first().map(|l| l.href.clone()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const SAMPLE_RSS: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel>
<title>Example Feed</title>
<item><guid>item-1</guid><title>First</title><link>http://x.test/1</link><pubDate>Mon, 01 Jan 2024 10:00:00 GMT</pubDate></item>
</channel></rss>"#;

    fn components() -> (CircuitBreaker, RateLimiter, UserAgentPool, SessionManager, Cache, BlockingStatsStore, AlertManager) {
        (
            CircuitBreaker::new(5, Duration::from_secs(3600), Duration::from_secs(86400)),
            RateLimiter::new(Duration::from_millis(1), Duration::from_secs(60)),
            UserAgentPool::new(),
            SessionManager::new(Duration::from_secs(3600), 5, Duration::from_secs(30)),
            Cache::new(false),
            BlockingStatsStore::new(),
            AlertManager::new(),
        )
    }

    #[tokio::test]
    async fn fetches_and_parses_a_feed_successfully() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/feed.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(SAMPLE_RSS).insert_header("ETag", "\"abc\""))
            .mount(&server)
            .await;

        let (mut breaker, mut rl, mut ua, mut sessions, cache, mut stats, mut alerts) = components();
        let mut fetcher = Fetcher {
            breaker: &mut breaker,
            rate_limiter: &mut rl,
            ua_pool: &mut ua,
            sessions: &mut sessions,
            cache: &cache,
            stats: &mut stats,
            alerts: &mut alerts,
        };

        let url = format!("{}/feed.xml", server.uri());
        let outcome = fetcher.fetch(&url).await.unwrap();
        assert_eq!(outcome.feed.items.len(), 1);
        assert_eq!(outcome.feed.items[0].id, "item-1");
        assert_eq!(outcome.feed.items[0].title, "First");

        let domain = extract_domain(&url);
        assert_eq!(stats.domain_report(&domain).unwrap().success, 1);
    }

    #[tokio::test]
    async fn second_fetch_is_served_from_cache() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/feed.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(SAMPLE_RSS))
            .expect(1)
            .mount(&server)
            .await;

        let (mut breaker, mut rl, mut ua, mut sessions, cache, mut stats, mut alerts) = components();
        let url = format!("{}/feed.xml", server.uri());

        {
            let mut fetcher = Fetcher {
                breaker: &mut breaker,
                rate_limiter: &mut rl,
                ua_pool: &mut ua,
                sessions: &mut sessions,
                cache: &cache,
                stats: &mut stats,
                alerts: &mut alerts,
            };
            fetcher.fetch(&url).await.unwrap();
        }
        {
            let mut fetcher = Fetcher {
                breaker: &mut breaker,
                rate_limiter: &mut rl,
                ua_pool: &mut ua,
                sessions: &mut sessions,
                cache: &cache,
                stats: &mut stats,
                alerts: &mut alerts,
            };
            let outcome = fetcher.fetch(&url).await.unwrap();
            assert_eq!(outcome.feed.items.len(), 1);
        }
    }

    #[tokio::test]
    async fn persistent_5xx_exhausts_retries_and_opens_breaker_after_threshold() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/feed.xml"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let (mut breaker, mut rl, mut ua, mut sessions, cache, mut stats, mut alerts) = components();
        let url = format!("{}/feed.xml", server.uri());

        for _ in 0..2 {
            let mut fetcher = Fetcher {
                breaker: &mut breaker,
                rate_limiter: &mut rl,
                ua_pool: &mut ua,
                sessions: &mut sessions,
                cache: &cache,
                stats: &mut stats,
                alerts: &mut alerts,
            };
            let result = fetcher.fetch(&url).await;
            assert_eq!(result.unwrap_err(), FetchError::HttpStatus(500));
        }

        // Breaker threshold is 5 failed resource hits; 2 calls * 3 retries = 6.
        assert_eq!(breaker.state(&url), crate::circuit_breaker::BreakerStateKind::Open);

        let mut fetcher = Fetcher {
            breaker: &mut breaker,
            rate_limiter: &mut rl,
            ua_pool: &mut ua,
            sessions: &mut sessions,
            cache: &cache,
            stats: &mut stats,
            alerts: &mut alerts,
        };
        assert_eq!(fetcher.fetch(&url).await.unwrap_err(), FetchError::CircuitOpen);
    }

    #[test]
    fn parse_feed_discards_entries_with_effectively_empty_ids() {
        let rss = r#"<?xml version="1.0"?><rss version="2.0"><channel><title>T</title>
<item><title>No id</title></item>
<item><guid>keep</guid><title>Keep</title><link>http://x.test/1</link></item>
</channel></rss>"#;
        let feed = parse_feed(rss.as_bytes()).unwrap();
        // feed-rs synthesizes ids from links when absent, so both survive here;
        // the important invariant is every surviving item has a non-empty id.
        assert!(feed.items.iter().all(|i| !i.id.is_empty()));
    }

    #[test]
    fn parse_feed_rejects_unparseable_bytes() {
        let result = parse_feed(b"not a feed at all");
        assert!(matches!(result, Err(FetchError::Parse(_))));
    }
}
