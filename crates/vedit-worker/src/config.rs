//! Worker configuration.

use std::time::Duration;

/// Worker configuration for one executor instance.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum concurrent jobs
    pub concurrency: usize,
    /// Per-job processing timeout
    pub job_timeout: Duration,
    /// How often the registry is swept for expired records
    pub sweep_interval: Duration,
    /// Graceful shutdown timeout
    pub shutdown_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 1,
            job_timeout: Duration::from_secs(15 * 60),
            shutdown_timeout: Duration::from_secs(30),
            sweep_interval: Duration::from_secs(60),
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables with a given prefix
    /// (e.g. `EDIT_WORKER` or `UPLOAD_WORKER`).
    pub fn from_env(prefix: &str) -> Self {
        Self::from_env_with(prefix, Self::default())
    }

    /// Like [`WorkerConfig::from_env`], with caller-supplied fallbacks.
    pub fn from_env_with(prefix: &str, defaults: Self) -> Self {
        Self {
            concurrency: std::env::var(format!("{prefix}_CONCURRENCY"))
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.concurrency),
            job_timeout: Duration::from_secs(
                std::env::var(format!("{prefix}_JOB_TIMEOUT_SECS"))
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.job_timeout.as_secs()),
            ),
            sweep_interval: Duration::from_secs(
                std::env::var(format!("{prefix}_SWEEP_INTERVAL_SECS"))
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.sweep_interval.as_secs()),
            ),
            shutdown_timeout: Duration::from_secs(
                std::env::var(format!("{prefix}_SHUTDOWN_TIMEOUT_SECS"))
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.shutdown_timeout.as_secs()),
            ),
        }
    }

    /// Upload-normalization defaults: same loop, longer job budget.
    pub fn upload_defaults() -> Self {
        Self {
            job_timeout: Duration::from_secs(60 * 60),
            ..Self::default()
        }
    }

    pub fn with_job_timeout(mut self, timeout: Duration) -> Self {
        self.job_timeout = timeout;
        self
    }
}
