use std::collections::HashMap;
use std::time::{Duration, Instant};

use rand::Rng;

#[derive(Debug, Clone)]
struct RateState {
    current_delay: Duration,
    last_request_time: Option<Instant>,
    consecutive_failures: u32,
}

/// C3: per-domain adaptive minimum spacing between outbound requests.
/// Multiplicative increase on failure, gentle decrease on success.
#[derive(Debug)]
pub struct RateLimiter {
    min_delay: Duration,
    max_delay: Duration,
    states: HashMap<String, RateState>,
}

impl RateLimiter {
    pub fn new(min_delay: Duration, max_delay: Duration) -> Self {
        Self {
            min_delay,
            max_delay,
            states: HashMap::new(),
        }
    }

    fn state_for(&mut self, domain: &str) -> &mut RateState {
        self.states.entry(domain.to_string()).or_insert(RateState {
            current_delay: self.min_delay,
            last_request_time: None,
            consecutive_failures: 0,
        })
    }

    pub fn current_delay(&self, domain: &str) -> Duration {
        self.states
            .get(domain)
            .map(|s| s.current_delay)
            .unwrap_or(self.min_delay)
    }

    /// Suspends the caller until `now - last_request_time >= current_delay`,
    /// with ±20% jitter, then stamps `last_request_time`.
    pub async fn wait_if_needed(&mut self, domain: &str) {
        let wait = {
            let state = self.state_for(domain);
            let elapsed = state
                .last_request_time
                .map(|t| t.elapsed())
                .unwrap_or(state.current_delay);
            if elapsed < state.current_delay {
                let remaining = state.current_delay - elapsed;
                let jitter_frac = rand::thread_rng().gen_range(-0.2..0.2);
                let jittered =
                    remaining.as_secs_f64() + remaining.as_secs_f64() * jitter_frac;
                Some(Duration::from_secs_f64(jittered.max(0.0)))
            } else {
                None
            }
        };

        if let Some(wait) = wait {
            tokio::time::sleep(wait).await;
        }

        self.state_for(domain).last_request_time = Some(Instant::now());
    }

    pub fn record_success(&mut self, domain: &str) {
        let min_delay = self.min_delay;
        let state = self.state_for(domain);
        state.current_delay =
            Duration::from_secs_f64((state.current_delay.as_secs_f64() * 0.9).max(min_delay.as_secs_f64()));
        state.consecutive_failures = 0;
    }

    pub fn record_failure(&mut self, domain: &str, status: u16) {
        let max_delay = self.max_delay;
        let state = self.state_for(domain);
        state.consecutive_failures += 1;
        let multiplier = if status == 429 {
            2.0
        } else if status == 403 && state.consecutive_failures >= 3 {
            3.0
        } else {
            1.5
        };
        let new_delay = state.current_delay.as_secs_f64() * multiplier;
        state.current_delay = Duration::from_secs_f64(new_delay.min(max_delay.as_secs_f64()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter() -> RateLimiter {
        RateLimiter::new(Duration::from_millis(50), Duration::from_secs(5))
    }

    #[tokio::test]
    async fn first_call_does_not_wait() {
        let mut rl = limiter();
        let start = Instant::now();
        rl.wait_if_needed("x.test").await;
        assert!(start.elapsed() < Duration::from_millis(40));
    }

    #[test]
    fn record_success_decays_delay_toward_minimum() {
        let mut rl = limiter();
        rl.state_for("x.test").current_delay = Duration::from_secs(1);
        rl.record_success("x.test");
        let d = rl.current_delay("x.test");
        assert!((d.as_secs_f64() - 0.9).abs() < 1e-9);
    }

    #[test]
    fn record_success_never_drops_below_minimum() {
        let mut rl = limiter();
        rl.record_success("x.test");
        assert_eq!(rl.current_delay("x.test"), Duration::from_millis(50));
    }

    #[test]
    fn five_consecutive_429s_escalate_and_clamp() {
        let mut rl = RateLimiter::new(Duration::from_secs(1), Duration::from_secs(10));
        for _ in 0..5 {
            rl.record_failure("x.test", 429);
        }
        // min_delay * 2^5 = 32s, clamped to max_delay = 10s.
        assert_eq!(rl.current_delay("x.test"), Duration::from_secs(10));
    }

    #[test]
    fn forbidden_escalates_harder_after_three_failures() {
        let mut rl = RateLimiter::new(Duration::from_secs(1), Duration::from_secs(300));
        rl.record_failure("x.test", 403);
        rl.record_failure("x.test", 403);
        assert_eq!(rl.current_delay("x.test"), Duration::from_secs_f64(2.25)); // 1.5^2
        rl.record_failure("x.test", 403);
        assert_eq!(rl.current_delay("x.test"), Duration::from_secs_f64(6.75)); // *3 on 3rd
    }

    #[test]
    fn generic_failure_uses_gentle_multiplier() {
        let mut rl = RateLimiter::new(Duration::from_secs(2), Duration::from_secs(300));
        rl.record_failure("x.test", 500);
        assert_eq!(rl.current_delay("x.test"), Duration::from_secs(3));
    }
}
