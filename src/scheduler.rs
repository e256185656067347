use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::alerts::{Alert, AlertManager};
use crate::cache::Cache;
use crate::circuit_breaker::CircuitBreaker;
use crate::delta::compute_delta;
use crate::error::FetchError;
use crate::feed_item::{Feed, FeedItem, ParsedFeed};
use crate::fetcher::{FetchOutcome, Fetcher};
use crate::notifier::ChatNotifier;
use crate::rate_limiter::RateLimiter;
use crate::reddit::RedditFallbackChain;
use crate::router::{route, RouteKind};
use crate::sanitizer::format_message;
use crate::session::SessionManager;
use crate::stats::BlockingStatsStore;
use crate::store::FeedStore;
use crate::ua_pool::UserAgentPool;

const INTER_FEED_PAUSE: StdDuration = StdDuration::from_secs(1);
const LOW_SUCCESS_THRESHOLD: f64 = 50.0;
const STALE_STATS_DAYS: i64 = 7;

/// Outcome of processing a single feed, kept for tick-level logging and tests.
#[derive(Debug, Default)]
pub struct FeedCheckResult {
    pub new_items: usize,
    pub notifications_sent: usize,
}

/// C13: owns every shared collaborator a fetch needs and drives the
/// periodic tick + two secondary jobs (spec.md §4.13).
pub struct Scheduler {
    pub store: FeedStore,
    pub breaker: CircuitBreaker,
    pub rate_limiter: RateLimiter,
    pub ua_pool: UserAgentPool,
    pub sessions: SessionManager,
    pub cache: Cache,
    pub stats: BlockingStatsStore,
    pub alerts: AlertManager,
    pub reddit: RedditFallbackChain,
    pub notifier: Arc<dyn ChatNotifier>,
    pub operator_chat_id: Option<i64>,
}

impl Scheduler {
    /// Resolves a feed's URL to a fetchable endpoint and fetches it,
    /// working through the Reddit fallback chain (C8) when the URL routes
    /// there, and going straight through C7 otherwise.
    async fn fetch_routed(&mut self, feed: &Feed) -> Result<FetchOutcome, FetchError> {
        let (resolved_url, kind) = route(&feed.canonical_url);

        match kind {
            RouteKind::DirectFeed | RouteKind::YouTube => {
                let mut fetcher = Fetcher {
                    breaker: &mut self.breaker,
                    rate_limiter: &mut self.rate_limiter,
                    ua_pool: &mut self.ua_pool,
                    sessions: &mut self.sessions,
                    cache: &self.cache,
                    stats: &mut self.stats,
                    alerts: &mut self.alerts,
                };
                fetcher.fetch(&resolved_url).await
            }
            RouteKind::Reddit { subreddit } => {
                let candidates = self.reddit.candidate_urls(&subreddit);
                let mut last_err = FetchError::EmptyFeed;
                for (method, url) in candidates {
                    let result = {
                        let mut fetcher = Fetcher {
                            breaker: &mut self.breaker,
                            rate_limiter: &mut self.rate_limiter,
                            ua_pool: &mut self.ua_pool,
                            sessions: &mut self.sessions,
                            cache: &self.cache,
                            stats: &mut self.stats,
                            alerts: &mut self.alerts,
                        };
                        fetcher.fetch(&url).await
                    };
                    match result {
                        Ok(outcome) => {
                            self.reddit.record_success(&subreddit, method);
                            return Ok(outcome);
                        }
                        Err(e) => {
                            self.reddit.purge(&subreddit);
                            last_err = e;
                        }
                    }
                }
                Err(last_err)
            }
        }
    }

    /// Drops items older than `feed.max_item_age_minutes` (spec.md §4.13).
    fn filter_max_age(feed: &Feed, items: Vec<FeedItem>, now: DateTime<Utc>) -> Vec<FeedItem> {
        let Some(max_age) = feed.max_item_age_minutes else {
            return items;
        };
        items
            .into_iter()
            .filter(|item| match item.pub_date {
                Some(d) => now.signed_duration_since(d).num_minutes() <= max_age,
                None => true,
            })
            .collect()
    }

    /// Sends one notification, falling back to plain text if the HTML send
    /// fails (spec.md §4.14).
    async fn notify_item(&self, feed: &Feed, item: &FeedItem) -> bool {
        let html_message = format_message(item, &feed.name, true);
        if self.notifier.send_message(feed.chat_id, &html_message, true).await {
            return true;
        }
        warn!(feed = %feed.name, item = %item.id, "HTML notification failed, retrying as plain text");
        let plain_message = format_message(item, &feed.name, false);
        self.notifier.send_message(feed.chat_id, &plain_message, false).await
    }

    async fn send_alert(&self, alert: &Alert) {
        let Some(chat_id) = self.operator_chat_id else {
            return;
        };
        let text = match alert {
            Alert::FirstBlock { domain } => format!("first block observed for {domain}"),
            Alert::ConsecutiveBlocks { domain, count } => {
                format!("{domain} has been blocked {count} times in a row")
            }
            Alert::LowSuccessRate { domain, success_rate, total_requests } => format!(
                "{domain} success rate dropped to {success_rate:.1}% over {total_requests} requests"
            ),
            Alert::CircuitOpened { domain } => format!("circuit breaker opened for {domain}"),
        };
        self.notifier.send_message(chat_id, &text, false).await;
    }

    /// Processes one feed end to end: fetch → delta → persist → notify.
    /// Never propagates an error; a single feed's failure is logged and
    /// tolerated (spec.md §4.13, §7).
    async fn check_feed(&mut self, feed_id: &str, now: DateTime<Utc>) -> FeedCheckResult {
        let Some(feed) = self.store.get(feed_id).cloned() else {
            return FeedCheckResult::default();
        };

        let outcome = match self.fetch_routed(&feed).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(feed = %feed.name, error = %e, "feed fetch failed");
                let mut updated = feed.clone();
                updated.failures += 1;
                updated.last_check = Some(now);
                updated.updated_at = now;
                if let Err(e) = self.store.upsert(updated) {
                    warn!(feed = %feed.name, error = %e, "failed to persist feed after fetch failure");
                }
                return FeedCheckResult::default();
            }
        };

        for alert in &outcome.alerts {
            self.send_alert(alert).await;
        }

        let parsed_feed: ParsedFeed = outcome.feed;
        let delta = compute_delta(&parsed_feed, feed.last_item_id.as_deref(), feed.last_notified_at);

        let mut updated = feed.clone();
        updated.last_check = Some(now);
        updated.updated_at = now;
        updated.failures = 0;

        let mut result = FeedCheckResult { new_items: delta.items.len(), ..Default::default() };

        if let Some(baseline_id) = delta.last_item_id_to_save {
            // First-time observation: baseline last_notified_at on the most
            // recent item's own pub_date, not on `now`, so posts that existed
            // before the feed was added are never notified but anything
            // published between add-time and this first check still is
            // (spec.md §4.10 rule 2).
            updated.last_item_id = Some(baseline_id);
            updated.last_notified_at = parsed_feed.items.first().and_then(|i| i.pub_date).or(Some(now));
        } else if !delta.items.is_empty() {
            let most_recent = &delta.items[0];
            updated.last_item_id = Some(most_recent.id.clone());
            updated.last_notified_at = most_recent.pub_date.or(updated.last_notified_at).or(Some(now));
        } else if let Some(first_item_id) = delta.first_item_id {
            updated.last_item_id = Some(first_item_id);
        }

        // Notifications are attempted before the feed's state is committed:
        // if the process crashes mid-loop, the un-persisted items are still
        // `last_item_id`-unseen and will be re-delivered on the next tick
        // instead of being silently marked read (spec.md §5).
        let items_to_notify = Self::filter_max_age(&feed, delta.items, now);
        for item in &items_to_notify {
            if self.notify_item(&feed, item).await {
                result.notifications_sent += 1;
            } else {
                warn!(feed = %feed.name, item = %item.id, "notification not sent after HTML and plain-text attempts");
            }
        }

        if let Err(e) = self.store.upsert(updated) {
            warn!(feed = %feed.name, error = %e, "failed to persist feed after check");
        }

        result
    }

    /// Runs one scheduler tick: every enabled feed whose interval has
    /// elapsed is checked sequentially, with a pause between feeds
    /// (spec.md §4.13).
    pub async fn run_tick(&mut self) {
        let now = Utc::now();
        let due_ids: Vec<String> = self
            .store
            .list_enabled()
            .into_iter()
            .filter(|f| f.is_due(now))
            .map(|f| f.id.clone())
            .collect();

        if due_ids.is_empty() {
            return;
        }

        let mut total_new = 0;
        let mut total_sent = 0;
        for (i, feed_id) in due_ids.iter().enumerate() {
            let result = self.check_feed(feed_id, now).await;
            total_new += result.new_items;
            total_sent += result.notifications_sent;
            if i + 1 < due_ids.len() {
                tokio::time::sleep(INTER_FEED_PAUSE).await;
            }
        }

        info!(feeds_checked = due_ids.len(), total_new, total_sent, "tick completed");
    }

    /// Hourly secondary job: surfaces domains whose success rate has
    /// dropped below threshold through the alert manager (spec.md §4.13).
    pub async fn check_blocking_stats_job(&mut self) {
        let now = Utc::now();
        let low_success: Vec<(String, f64, u64)> = self
            .stats
            .low_success_domains(LOW_SUCCESS_THRESHOLD)
            .into_iter()
            .map(|s| (s.domain.clone(), s.success_rate(), s.total))
            .collect();

        for (domain, rate, total) in low_success {
            if let Some(alert) = self.alerts.check_low_success_rate(&domain, rate, total, now) {
                self.send_alert(&alert).await;
            }
        }
    }

    /// Daily secondary job: ages out stale per-domain counters so
    /// long-dormant sites can re-learn (spec.md §4.13, §4.11).
    pub async fn cleanup_blocking_stats_job(&mut self) {
        let reset = self.stats.reset_old(STALE_STATS_DAYS, Utc::now());
        if reset > 0 {
            info!(reset, "cleaned up stale blocking stats");
        }
    }
}
