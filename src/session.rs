use std::collections::HashMap;
use std::time::{Duration, Instant};

use reqwest::Client;

/// C5: per-domain HTTP client with its own cookie jar (via reqwest's
/// `cookies` feature) and a bounded lifetime; rotates on expiry.
pub struct SessionManager {
    ttl: Duration,
    sessions: HashMap<String, (Client, Instant)>,
    per_host_connections: usize,
    request_timeout: Duration,
}

impl SessionManager {
    pub fn new(ttl: Duration, per_host_connections: usize, request_timeout: Duration) -> Self {
        Self {
            ttl,
            sessions: HashMap::new(),
            per_host_connections,
            request_timeout,
        }
    }

    fn build_client(&self) -> Client {
        Client::builder()
            .cookie_store(true)
            .pool_max_idle_per_host(self.per_host_connections)
            .timeout(self.request_timeout)
            .build()
            .expect("reqwest client configuration is always valid")
    }

    /// Returns the session for `domain`, creating or rotating it as needed.
    pub fn get(&mut self, domain: &str) -> Client {
        if let Some((client, created_at)) = self.sessions.get(domain) {
            if created_at.elapsed() < self.ttl {
                return client.clone();
            }
        }
        let client = self.build_client();
        self.sessions
            .insert(domain.to_string(), (client.clone(), Instant::now()));
        client
    }

    pub fn close_all(&mut self) {
        self.sessions.clear();
    }

    pub fn close(&mut self, domain: &str) {
        self.sessions.remove(domain);
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_and_reuses_session_for_domain() {
        let mut mgr = SessionManager::new(Duration::from_secs(3600), 5, Duration::from_secs(30));
        let _a = mgr.get("x.test");
        assert_eq!(mgr.session_count(), 1);
        let _b = mgr.get("x.test");
        assert_eq!(mgr.session_count(), 1, "should not create a second session");
    }

    #[test]
    fn rotates_session_after_ttl_expires() {
        let mut mgr = SessionManager::new(Duration::from_millis(1), 5, Duration::from_secs(30));
        let _a = mgr.get("x.test");
        std::thread::sleep(Duration::from_millis(10));
        let _b = mgr.get("x.test");
        assert_eq!(mgr.session_count(), 1);
    }

    #[test]
    fn close_all_releases_every_session() {
        let mut mgr = SessionManager::new(Duration::from_secs(3600), 5, Duration::from_secs(30));
        mgr.get("a.test");
        mgr.get("b.test");
        assert_eq!(mgr.session_count(), 2);
        mgr.close_all();
        assert_eq!(mgr.session_count(), 0);
    }
}
