use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::circuit_breaker::BreakerStateKind;

/// Persistent per-domain counters and learned behavior (spec.md §3/§4.11).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DomainStats {
    pub domain: String,
    pub total: u64,
    pub success: u64,
    pub blocked_403: u64,
    pub rate_limited_429: u64,
    pub last_success: Option<DateTime<Utc>>,
    pub last_failure: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub preferred_user_agent: Option<String>,
    pub current_delay_seconds: f64,
    pub circuit_breaker_state: String,
}

impl DomainStats {
    fn new(domain: &str, now: DateTime<Utc>) -> Self {
        Self {
            domain: domain.to_string(),
            total: 0,
            success: 0,
            blocked_403: 0,
            rate_limited_429: 0,
            last_success: None,
            last_failure: None,
            updated_at: now,
            created_at: now,
            preferred_user_agent: None,
            current_delay_seconds: 5.0,
            circuit_breaker_state: BreakerStateKind::Closed.as_str().to_string(),
        }
    }

    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            (self.success as f64 / self.total as f64) * 100.0
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StatsSummary {
    pub total_domains: usize,
    pub total_requests: u64,
    pub successful_requests: u64,
    pub blocked_requests: u64,
    pub rate_limited_requests: u64,
    pub overall_success_rate: f64,
    pub circuit_breaker_open: usize,
    pub circuit_breaker_half_open: usize,
}

/// C11: persistent, upsert-keyed-by-domain blocking statistics store.
/// Queries here never fail the caller — database errors would be logged
/// and ignored per spec.md §7, which this in-memory implementation
/// trivially satisfies (it has no failure mode of its own).
#[derive(Debug, Default)]
pub struct BlockingStatsStore {
    stats: HashMap<String, DomainStats>,
}

impl BlockingStatsStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&mut self, domain: &str, now: DateTime<Utc>) -> &mut DomainStats {
        self.stats
            .entry(domain.to_string())
            .or_insert_with(|| DomainStats::new(domain, now))
    }

    pub fn record_success(&mut self, domain: &str, ua: Option<&str>, delay_seconds: f64, now: DateTime<Utc>) {
        let stats = self.entry(domain, now);
        stats.total += 1;
        stats.success += 1;
        stats.last_success = Some(now);
        stats.updated_at = now;
        if let Some(ua) = ua {
            stats.preferred_user_agent = Some(ua.to_string());
        }
        stats.current_delay_seconds = delay_seconds;
    }

    pub fn record_failure(
        &mut self,
        domain: &str,
        status_code: u16,
        delay_seconds: f64,
        breaker_state: BreakerStateKind,
        now: DateTime<Utc>,
    ) {
        let stats = self.entry(domain, now);
        stats.total += 1;
        stats.last_failure = Some(now);
        stats.updated_at = now;
        match status_code {
            403 => stats.blocked_403 += 1,
            429 => stats.rate_limited_429 += 1,
            _ => {}
        }
        stats.current_delay_seconds = delay_seconds;
        stats.circuit_breaker_state = breaker_state.as_str().to_string();
    }

    pub fn update_breaker_state(&mut self, domain: &str, state: BreakerStateKind, now: DateTime<Utc>) {
        let stats = self.entry(domain, now);
        stats.circuit_breaker_state = state.as_str().to_string();
        stats.updated_at = now;
    }

    pub fn update_delay(&mut self, domain: &str, delay_seconds: f64, now: DateTime<Utc>) {
        let stats = self.entry(domain, now);
        stats.current_delay_seconds = delay_seconds;
        stats.updated_at = now;
    }

    pub fn update_preferred_ua(&mut self, domain: &str, ua: &str, now: DateTime<Utc>) {
        let stats = self.entry(domain, now);
        stats.preferred_user_agent = Some(ua.to_string());
        stats.updated_at = now;
    }

    pub fn success_rate(&self, domain: &str) -> f64 {
        self.stats.get(domain).map(|s| s.success_rate()).unwrap_or(0.0)
    }

    pub fn all_stats(&self) -> Vec<&DomainStats> {
        self.stats.values().collect()
    }

    pub fn low_success_domains(&self, threshold: f64) -> Vec<&DomainStats> {
        self.stats
            .values()
            .filter(|s| s.total > 0 && s.success_rate() < threshold)
            .collect()
    }

    pub fn by_breaker_state(&self, state: BreakerStateKind) -> Vec<&DomainStats> {
        self.stats
            .values()
            .filter(|s| s.circuit_breaker_state == state.as_str())
            .collect()
    }

    pub fn summary(&self) -> StatsSummary {
        let total_requests: u64 = self.stats.values().map(|s| s.total).sum();
        let successful_requests: u64 = self.stats.values().map(|s| s.success).sum();
        let blocked_requests: u64 = self.stats.values().map(|s| s.blocked_403).sum();
        let rate_limited_requests: u64 = self.stats.values().map(|s| s.rate_limited_429).sum();
        let overall_success_rate = if total_requests > 0 {
            (successful_requests as f64 / total_requests as f64) * 100.0
        } else {
            0.0
        };
        StatsSummary {
            total_domains: self.stats.len(),
            total_requests,
            successful_requests,
            blocked_requests,
            rate_limited_requests,
            overall_success_rate: (overall_success_rate * 100.0).round() / 100.0,
            circuit_breaker_open: self.by_breaker_state(BreakerStateKind::Open).len(),
            circuit_breaker_half_open: self.by_breaker_state(BreakerStateKind::HalfOpen).len(),
        }
    }

    pub fn domain_report(&self, domain: &str) -> Option<&DomainStats> {
        self.stats.get(domain)
    }

    /// For rows whose `updated_at` is older than `now - days`, zero the
    /// counters and delay but retain domain and learned UA, so long-dormant
    /// sites can re-learn (spec.md §4.11).
    pub fn reset_old(&mut self, days: i64, now: DateTime<Utc>) -> usize {
        let cutoff = now - chrono::Duration::days(days);
        let mut reset_count = 0;
        for stats in self.stats.values_mut() {
            if stats.updated_at < cutoff {
                stats.total = 0;
                stats.success = 0;
                stats.blocked_403 = 0;
                stats.rate_limited_429 = 0;
                stats.current_delay_seconds = 5.0;
                stats.circuit_breaker_state = BreakerStateKind::Closed.as_str().to_string();
                stats.updated_at = now;
                reset_count += 1;
            }
        }
        reset_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_and_failure_counters_stay_consistent() {
        let mut store = BlockingStatsStore::new();
        let now = Utc::now();
        store.record_success("x.test", Some("UA"), 5.0, now);
        store.record_failure("x.test", 403, 15.0, BreakerStateKind::Closed, now);
        store.record_failure("x.test", 429, 30.0, BreakerStateKind::Closed, now);

        let stats = store.domain_report("x.test").unwrap();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.success, 1);
        assert_eq!(stats.blocked_403, 1);
        assert_eq!(stats.rate_limited_429, 1);
        assert!(stats.success <= stats.total);
        assert!(stats.blocked_403 + stats.rate_limited_429 <= stats.total - stats.success);
        let rate = store.success_rate("x.test");
        assert!((0.0..=100.0).contains(&rate));
    }

    #[test]
    fn low_success_domains_filters_by_threshold() {
        let mut store = BlockingStatsStore::new();
        let now = Utc::now();
        for _ in 0..2 {
            store.record_success("good.test", None, 5.0, now);
        }
        for _ in 0..8 {
            store.record_failure("bad.test", 403, 5.0, BreakerStateKind::Closed, now);
        }
        store.record_success("bad.test", None, 5.0, now);

        let low = store.low_success_domains(50.0);
        let domains: Vec<&str> = low.iter().map(|s| s.domain.as_str()).collect();
        assert!(domains.contains(&"bad.test"));
        assert!(!domains.contains(&"good.test"));
    }

    #[test]
    fn reset_old_zeroes_counters_but_keeps_learned_ua() {
        let mut store = BlockingStatsStore::new();
        let now = Utc::now();
        store.record_success("x.test", Some("UA/1.0"), 9.0, now - chrono::Duration::days(10));
        let reset = store.reset_old(7, now);
        assert_eq!(reset, 1);
        let stats = store.domain_report("x.test").unwrap();
        assert_eq!(stats.total, 0);
        assert_eq!(stats.preferred_user_agent.as_deref(), Some("UA/1.0"));
        assert_eq!(stats.domain, "x.test");
    }

    #[test]
    fn reset_old_skips_recently_updated_rows() {
        let mut store = BlockingStatsStore::new();
        let now = Utc::now();
        store.record_success("x.test", None, 5.0, now);
        let reset = store.reset_old(7, now);
        assert_eq!(reset, 0);
    }
}
