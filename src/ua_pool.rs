use std::collections::HashMap;

use rand::seq::SliceRandom;
use rand::Rng;

/// Exploit/explore split for `pick`: with this probability we choose among
/// the top-3 scored User-Agents for the domain, otherwise uniformly random.
/// Unmotivated in the source (spec.md §9 open question) — left as a
/// parameterizable constant.
pub const UA_EXPLOIT_PROBABILITY: f64 = 0.7;

const USER_AGENTS: &[&str] = &[
    // Chrome (Desktop)
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    // Firefox (Desktop)
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:121.0) Gecko/20100101 Firefox/121.0",
    // Safari (Desktop)
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Safari/605.1.15",
    // Edge (Desktop)
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36 Edg/120.0.0.0",
    // Chrome (Mobile)
    "Mozilla/5.0 (Linux; Android 13) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.6099.144 Mobile Safari/537.36",
    "Mozilla/5.0 (iPhone; CPU iPhone OS 17_1 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) CriOS/120.0.6099.119 Mobile/15E148 Safari/604.1",
    // Firefox (Mobile)
    "Mozilla/5.0 (Android 13; Mobile; rv:121.0) Gecko/121.0 Firefox/121.0",
    // Safari (Mobile)
    "Mozilla/5.0 (iPhone; CPU iPhone OS 17_1 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Mobile/15E148 Safari/604.1",
];

#[derive(Debug, Default, Clone, Copy)]
struct UaCounters {
    success: u64,
    failure: u64,
}

impl UaCounters {
    fn score(&self) -> f64 {
        let total = self.success + self.failure;
        if total == 0 {
            0.5
        } else {
            self.success as f64 / total as f64
        }
    }
}

/// C1: holds a fixed set of realistic UA strings and learns per-domain
/// success rates to prefer the UAs that work against a given site.
#[derive(Debug, Default)]
pub struct UserAgentPool {
    domain_preferences: HashMap<String, HashMap<String, UaCounters>>,
}

impl UserAgentPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn random(&self) -> String {
        let mut rng = rand::thread_rng();
        USER_AGENTS.choose(&mut rng).unwrap().to_string()
    }

    /// Pick a UA for `domain`: uniform random with no history, otherwise an
    /// exploit/explore split over UAs scored by observed success rate.
    pub fn pick(&self, domain: &str) -> String {
        let Some(prefs) = self.domain_preferences.get(domain) else {
            return self.random();
        };
        if prefs.is_empty() {
            return self.random();
        }

        let mut scored: Vec<(&str, f64)> = USER_AGENTS
            .iter()
            .map(|ua| {
                let score = prefs.get(*ua).map(|c| c.score()).unwrap_or(0.5);
                (*ua, score)
            })
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap());

        let mut rng = rand::thread_rng();
        if rng.gen_bool(UA_EXPLOIT_PROBABILITY) && scored.len() >= 3 {
            let top3 = &scored[..3];
            top3.choose(&mut rng).unwrap().0.to_string()
        } else {
            self.random()
        }
    }

    pub fn record_success(&mut self, domain: &str, ua: &str) {
        self.domain_preferences
            .entry(domain.to_string())
            .or_default()
            .entry(ua.to_string())
            .or_default()
            .success += 1;
    }

    pub fn record_failure(&mut self, domain: &str, ua: &str) {
        self.domain_preferences
            .entry(domain.to_string())
            .or_default()
            .entry(ua.to_string())
            .or_default()
            .failure += 1;
    }
}
