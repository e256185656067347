use thiserror::Error;

/// Error taxonomy surfaced by the feed fetcher (C7) and its collaborators.
///
/// Transport-level failures are absorbed by the fetcher's own retry loop;
/// this type is what finally escapes to the scheduler when every retry is
/// exhausted, or what callers match on to decide rate-limiter/breaker/stats
/// bookkeeping.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FetchError {
    #[error("circuit breaker open for resource")]
    CircuitOpen,
    #[error("request timed out")]
    Timeout,
    #[error("http status {0}")]
    HttpStatus(u16),
    #[error("feed parse error: {0}")]
    Parse(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("feed had no items")]
    EmptyFeed,
}

impl FetchError {
    /// The HTTP status this error represents, if any — used to route
    /// rate-limiter/UA-pool/alert bookkeeping that keys off status code.
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::HttpStatus(s) => Some(*s),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value for environment variable {0}: {1}")]
    Invalid(&'static str, String),
}
