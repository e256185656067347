use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};

const ALERT_COOLDOWN: Duration = Duration::hours(1);
const CONSECUTIVE_BLOCK_THRESHOLD: u32 = 3;
const LOW_SUCCESS_RATE_THRESHOLD: f64 = 50.0;
const LOW_SUCCESS_RATE_MIN_REQUESTS: u64 = 10;

#[derive(Debug, Clone, PartialEq)]
pub enum Alert {
    FirstBlock { domain: String },
    ConsecutiveBlocks { domain: String, count: u32 },
    LowSuccessRate { domain: String, success_rate: f64, total_requests: u64 },
    CircuitOpened { domain: String },
}

/// C12: cooldown-gated operator alerts on degraded per-domain states.
#[derive(Debug, Default)]
pub struct AlertManager {
    first_block_alerted: HashMap<String, DateTime<Utc>>,
    consecutive_blocks: HashMap<String, u32>,
    consecutive_block_alerted: HashMap<String, DateTime<Utc>>,
    low_success_rate_alerted: HashMap<String, DateTime<Utc>>,
}

impl AlertManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn cooldown_ok(last: Option<&DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        match last {
            None => true,
            Some(t) => now - *t > ALERT_COOLDOWN,
        }
    }

    /// Call on every 403/429. Returns any alerts that should fire.
    pub fn check_on_block(&mut self, domain: &str, status_code: u16, now: DateTime<Utc>) -> Vec<Alert> {
        let mut alerts = Vec::new();
        if status_code != 403 {
            return alerts;
        }

        let count = self.consecutive_blocks.entry(domain.to_string()).or_insert(0);
        *count += 1;
        let consecutive_count = *count;

        if !self.first_block_alerted.contains_key(domain) {
            self.first_block_alerted.insert(domain.to_string(), now);
            alerts.push(Alert::FirstBlock { domain: domain.to_string() });
        }

        if consecutive_count >= CONSECUTIVE_BLOCK_THRESHOLD {
            let last = self.consecutive_block_alerted.get(domain);
            if Self::cooldown_ok(last, now) {
                self.consecutive_block_alerted.insert(domain.to_string(), now);
                alerts.push(Alert::ConsecutiveBlocks {
                    domain: domain.to_string(),
                    count: consecutive_count,
                });
            }
        }

        alerts
    }

    /// Called by the fetcher on every success (spec.md §4.12).
    pub fn reset_consecutive(&mut self, domain: &str) {
        if let Some(count) = self.consecutive_blocks.get_mut(domain) {
            *count = 0;
        }
    }

    pub fn check_low_success_rate(
        &mut self,
        domain: &str,
        success_rate: f64,
        total_requests: u64,
        now: DateTime<Utc>,
    ) -> Option<Alert> {
        if total_requests < LOW_SUCCESS_RATE_MIN_REQUESTS || success_rate >= LOW_SUCCESS_RATE_THRESHOLD {
            return None;
        }
        let last = self.low_success_rate_alerted.get(domain);
        if !Self::cooldown_ok(last, now) {
            return None;
        }
        self.low_success_rate_alerted.insert(domain.to_string(), now);
        Some(Alert::LowSuccessRate {
            domain: domain.to_string(),
            success_rate,
            total_requests,
        })
    }

    /// Called when C4 transitions a domain's resource to `open`.
    pub fn circuit_opened(&mut self, domain: &str) -> Alert {
        Alert::CircuitOpened { domain: domain.to_string() }
    }
}
