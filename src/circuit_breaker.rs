use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BreakerStateKind {
    Closed,
    Open,
    HalfOpen,
}

impl BreakerStateKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BreakerStateKind::Closed => "closed",
            BreakerStateKind::Open => "open",
            BreakerStateKind::HalfOpen => "half_open",
        }
    }
}

#[derive(Debug, Clone)]
struct BreakerEntry {
    state: BreakerStateKind,
    failure_count: u32,
    open_until: Option<DateTime<Utc>>,
    last_timeout: Duration,
}

/// C4: per-resource three-state controller (closed/open/half-open) with
/// exponential reopen timeout. A transition to `open` is surfaced via
/// `should_allow`'s caller consulting `just_opened` on the returned decision;
/// see `Scheduler`/`AlertManager` wiring.
#[derive(Debug)]
pub struct CircuitBreaker {
    failure_threshold: u32,
    initial_timeout: Duration,
    max_timeout: Duration,
    entries: HashMap<String, BreakerEntry>,
}

pub struct AllowDecision {
    pub allowed: bool,
    pub just_opened: bool,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, initial_timeout: Duration, max_timeout: Duration) -> Self {
        Self {
            failure_threshold,
            initial_timeout,
            max_timeout,
            entries: HashMap::new(),
        }
    }

    fn entry_for(&mut self, resource: &str) -> &mut BreakerEntry {
        let initial_timeout = self.initial_timeout;
        self.entries.entry(resource.to_string()).or_insert(BreakerEntry {
            state: BreakerStateKind::Closed,
            failure_count: 0,
            open_until: None,
            last_timeout: initial_timeout,
        })
    }

    pub fn state(&self, resource: &str) -> BreakerStateKind {
        self.entries
            .get(resource)
            .map(|e| e.state)
            .unwrap_or(BreakerStateKind::Closed)
    }

    pub fn time_until_retry(&self, resource: &str, now: DateTime<Utc>) -> Duration {
        match self.entries.get(resource).and_then(|e| e.open_until) {
            Some(until) if until > now => (until - now).to_std().unwrap_or_default(),
            _ => Duration::ZERO,
        }
    }

    /// Returns true in closed/half-open, and in open only once `open_until`
    /// has passed — atomically flipping the state to half-open in that case.
    pub fn should_allow(&mut self, resource: &str, now: DateTime<Utc>) -> bool {
        let entry = self.entry_for(resource);
        match entry.state {
            BreakerStateKind::Closed | BreakerStateKind::HalfOpen => true,
            BreakerStateKind::Open => {
                if now >= entry.open_until.unwrap_or(now) {
                    entry.state = BreakerStateKind::HalfOpen;
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&mut self, resource: &str) {
        let entry = self.entry_for(resource);
        entry.state = BreakerStateKind::Closed;
        entry.failure_count = 0;
        entry.open_until = None;
    }

    /// Returns true iff this failure just transitioned the breaker to `open`
    /// (callers raise a one-shot alert on that edge, per spec.md §4.4/§4.12).
    pub fn record_failure(&mut self, resource: &str, now: DateTime<Utc>) -> bool {
        let failure_threshold = self.failure_threshold;
        let initial_timeout = self.initial_timeout;
        let max_timeout = self.max_timeout;
        let entry = self.entry_for(resource);
        entry.failure_count += 1;

        match entry.state {
            BreakerStateKind::HalfOpen => {
                let new_timeout = std::cmp::min(entry.last_timeout * 2, max_timeout);
                entry.last_timeout = new_timeout;
                entry.open_until = Some(now + chrono::Duration::from_std(new_timeout).unwrap());
                entry.state = BreakerStateKind::Open;
                false
            }
            BreakerStateKind::Closed if entry.failure_count >= failure_threshold => {
                let timeout = std::cmp::min(initial_timeout, max_timeout);
                entry.last_timeout = timeout;
                entry.open_until = Some(now + chrono::Duration::from_std(timeout).unwrap());
                entry.state = BreakerStateKind::Open;
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker() -> CircuitBreaker {
        CircuitBreaker::new(5, Duration::from_secs(3600), Duration::from_secs(86400))
    }

    #[test]
    fn opens_after_failure_threshold_and_denies_until_timeout() {
        let mut cb = breaker();
        let now = Utc::now();
        let mut just_opened = false;
        for _ in 0..5 {
            just_opened = cb.record_failure("http://x.test/feed", now);
        }
        assert!(just_opened);
        assert_eq!(cb.state("http://x.test/feed"), BreakerStateKind::Open);
        assert!(!cb.should_allow("http://x.test/feed", now));
        assert!(!cb.should_allow("http://x.test/feed", now + chrono::Duration::minutes(30)));
    }

    #[test]
    fn half_open_after_timeout_then_closes_on_success() {
        let mut cb = breaker();
        let now = Utc::now();
        for _ in 0..5 {
            cb.record_failure("u", now);
        }
        let later = now + chrono::Duration::hours(2);
        assert!(cb.should_allow("u", later));
        assert_eq!(cb.state("u"), BreakerStateKind::HalfOpen);

        cb.record_success("u");
        assert_eq!(cb.state("u"), BreakerStateKind::Closed);
    }

    #[test]
    fn half_open_failure_doubles_timeout_and_reopens() {
        let mut cb = breaker();
        let now = Utc::now();
        for _ in 0..5 {
            cb.record_failure("u", now);
        }
        let later = now + chrono::Duration::hours(2);
        assert!(cb.should_allow("u", later));

        let just_opened = cb.record_failure("u", later);
        assert!(!just_opened, "half-open->open is not a fresh first-open alert");
        assert_eq!(cb.state("u"), BreakerStateKind::Open);
        // initial_timeout (1h) doubled = 2h.
        let retry_in = cb.time_until_retry("u", later);
        assert_eq!(retry_in, Duration::from_secs(3600 * 2));
    }

    #[test]
    fn reopen_timeout_caps_at_max_timeout() {
        let mut cb = CircuitBreaker::new(1, Duration::from_secs(86400 * 2), Duration::from_secs(86400));
        let now = Utc::now();
        cb.record_failure("u", now);
        assert_eq!(cb.time_until_retry("u", now), Duration::from_secs(86400));
    }
}
