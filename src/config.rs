use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;

/// Environment-driven configuration (spec.md §6). Everything is optional
/// except the bot token; all defaults below match the specification's table.
#[derive(Debug, Clone)]
pub struct Config {
    pub bot_token: String,
    pub allowed_user_id: Option<i64>,
    pub database_url: Option<String>,
    pub cache_disabled: bool,
    pub max_feeds_per_chat: u32,
    pub cache_ttl_minutes: u64,
    pub min_delay_ms: u64,
    pub max_delay_secs: u64,
    pub circuit_breaker_threshold: u32,
    pub state_file: PathBuf,
    pub poll_interval_minutes: u64,
}

fn parse_env<T: std::str::FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(v) => v
            .parse()
            .map_err(|_| ConfigError::Invalid(key, v.clone())),
        Err(_) => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let bot_token =
            env::var("BOT_TOKEN").map_err(|_| ConfigError::Missing("BOT_TOKEN"))?;

        let allowed_user_id = match env::var("ALLOWED_USER_ID") {
            Ok(v) => Some(
                v.parse::<i64>()
                    .map_err(|_| ConfigError::Invalid("ALLOWED_USER_ID", v))?,
            ),
            Err(_) => None,
        };

        let database_url = env::var("DATABASE_URL").ok();
        let cache_disabled = env::var("CACHE_DISABLED")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        let max_feeds_per_chat = parse_env("MAX_FEEDS_PER_CHAT", 50u32)?;
        let cache_ttl_minutes = parse_env("CACHE_TTL_MINUTES", 20u64)?;
        let min_delay_ms = parse_env("MIN_DELAY_MS", 200_000u64)?;
        let max_delay_secs = parse_env("MAX_DELAY_SECS", 300u64)?;
        let circuit_breaker_threshold = parse_env("CIRCUIT_BREAKER_THRESHOLD", 5u32)?;
        let poll_interval_minutes = parse_env("POLL_INTERVAL_MINUTES", 5u64)?;

        let state_file = env::var("STATE_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("state.json"));

        Ok(Self {
            bot_token,
            allowed_user_id,
            database_url,
            cache_disabled,
            max_feeds_per_chat,
            cache_ttl_minutes,
            min_delay_ms,
            max_delay_secs,
            circuit_breaker_threshold,
            state_file,
            poll_interval_minutes,
        })
    }

    pub fn min_delay(&self) -> Duration {
        Duration::from_millis(self.min_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_secs(self.max_delay_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // env::var is process-global; serialize the tests in this module so they
    // don't race each other's BOT_TOKEN/MAX_FEEDS_PER_CHAT mutations.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn loads_required_and_defaults() {
        let _g = ENV_LOCK.lock().unwrap();
        env::set_var("BOT_TOKEN", "tok");
        env::remove_var("ALLOWED_USER_ID");
        env::remove_var("MAX_FEEDS_PER_CHAT");

        let cfg = Config::from_env().expect("config should parse");
        assert_eq!(cfg.bot_token, "tok");
        assert_eq!(cfg.allowed_user_id, None);
        assert_eq!(cfg.max_feeds_per_chat, 50);
        assert_eq!(cfg.circuit_breaker_threshold, 5);

        env::remove_var("BOT_TOKEN");
    }

    #[test]
    fn missing_token_is_an_error() {
        let _g = ENV_LOCK.lock().unwrap();
        env::remove_var("BOT_TOKEN");
        assert!(Config::from_env().is_err());
    }

    #[test]
    fn invalid_numeric_override_is_an_error() {
        let _g = ENV_LOCK.lock().unwrap();
        env::set_var("BOT_TOKEN", "tok");
        env::set_var("MAX_FEEDS_PER_CHAT", "not-a-number");
        assert!(Config::from_env().is_err());
        env::remove_var("BOT_TOKEN");
        env::remove_var("MAX_FEEDS_PER_CHAT");
    }
}
