mod alerts;
mod cache;
mod circuit_breaker;
mod config;
mod delta;
mod error;
mod feed_item;
mod fetcher;
mod headers;
mod notifier;
mod rate_limiter;
mod reddit;
mod router;
mod sanitizer;
mod scheduler;
mod session;
mod stats;
mod store;
mod ua_pool;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::info;

use crate::alerts::AlertManager;
use crate::cache::Cache;
use crate::circuit_breaker::CircuitBreaker;
use crate::config::Config;
use crate::notifier::TelegramNotifier;
use crate::rate_limiter::RateLimiter;
use crate::reddit::RedditFallbackChain;
use crate::scheduler::Scheduler;
use crate::session::SessionManager;
use crate::stats::BlockingStatsStore;
use crate::store::FeedStore;
use crate::ua_pool::UserAgentPool;

const CIRCUIT_INITIAL_TIMEOUT: Duration = Duration::from_secs(60 * 60);
const CIRCUIT_MAX_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);
const SESSION_TTL: Duration = Duration::from_secs(60 * 60);
const SESSION_PER_HOST_CONNECTIONS: usize = 5;
const SESSION_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const BLOCKING_STATS_TICK: Duration = Duration::from_secs(60 * 60);
const BLOCKING_STATS_CLEANUP_TICK: Duration = Duration::from_secs(24 * 60 * 60);

fn build_scheduler(cfg: &Config) -> Result<Scheduler> {
    let store = FeedStore::load(&cfg.state_file).context("load feed store")?;
    Ok(Scheduler {
        store,
        breaker: CircuitBreaker::new(cfg.circuit_breaker_threshold, CIRCUIT_INITIAL_TIMEOUT, CIRCUIT_MAX_TIMEOUT),
        rate_limiter: RateLimiter::new(cfg.min_delay(), cfg.max_delay()),
        ua_pool: UserAgentPool::new(),
        sessions: SessionManager::new(SESSION_TTL, SESSION_PER_HOST_CONNECTIONS, SESSION_REQUEST_TIMEOUT),
        cache: Cache::new(cfg.cache_disabled),
        stats: BlockingStatsStore::new(),
        alerts: AlertManager::new(),
        reddit: RedditFallbackChain::new(),
        notifier: Arc::new(TelegramNotifier::new(&cfg.bot_token)),
        operator_chat_id: cfg.allowed_user_id,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

    let cfg = Config::from_env().context("load configuration")?;
    let mut scheduler = build_scheduler(&cfg)?;

    info!(
        feeds = scheduler.store.len(),
        poll_interval_minutes = cfg.poll_interval_minutes,
        "starting feed poller"
    );

    scheduler.run_tick().await;

    let mut poll_ticker = tokio::time::interval(Duration::from_secs(60 * cfg.poll_interval_minutes));
    let mut stats_ticker = tokio::time::interval(BLOCKING_STATS_TICK);
    let mut cleanup_ticker = tokio::time::interval(BLOCKING_STATS_CLEANUP_TICK);
    // The first tick of every interval fires immediately; we already ran the
    // initial poll above, so skip it for `poll_ticker` to avoid a duplicate.
    poll_ticker.tick().await;
    stats_ticker.tick().await;
    cleanup_ticker.tick().await;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                scheduler.sessions.close_all();
                break;
            }
            _ = poll_ticker.tick() => {
                scheduler.run_tick().await;
            }
            _ = stats_ticker.tick() => {
                scheduler.check_blocking_stats_job().await;
            }
            _ = cleanup_ticker.tick() => {
                scheduler.cleanup_blocking_stats_job().await;
            }
        }
    }

    Ok(())
}
