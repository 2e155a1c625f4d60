//! Queue configuration.

use chrono::Duration;

/// Queue configuration, supplied by the host at startup.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Maximum number of queued (not yet claimed) jobs
    pub capacity: usize,
    /// Job record time-to-live
    pub ttl: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: 8,
            ttl: Duration::minutes(30),
        }
    }
}

impl QueueConfig {
    /// Create config from environment variables with a given prefix
    /// (e.g. `EDIT_QUEUE` or `UPLOAD_QUEUE`).
    pub fn from_env(prefix: &str) -> Self {
        Self::from_env_with(prefix, Self::default())
    }

    /// Like [`QueueConfig::from_env`], with caller-supplied fallbacks.
    pub fn from_env_with(prefix: &str, defaults: Self) -> Self {
        Self {
            capacity: std::env::var(format!("{prefix}_CAPACITY"))
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.capacity),
            ttl: std::env::var(format!("{prefix}_TTL_SECS"))
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::seconds)
                .unwrap_or(defaults.ttl),
        }
    }

    /// Override the TTL (the upload queue uses a longer budget).
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = QueueConfig::default();
        assert_eq!(config.capacity, 8);
        assert_eq!(config.ttl, Duration::minutes(30));
    }
}
