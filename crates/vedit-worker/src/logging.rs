//! Structured job logging utilities.

use tracing::{error, info, warn};
use vedit_models::JobId;

/// Job logger for structured logging with consistent formatting.
///
/// Carries the job id, the caller's correlation id, and the operation type
/// so lifecycle events line up across the queue, worker, and encoder logs.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: String,
    correlation_id: String,
    operation: String,
}

impl JobLogger {
    /// Create a logger for a specific job and operation
    /// (e.g. "edit", "normalize").
    pub fn new(job_id: &JobId, correlation_id: &str, operation: &str) -> Self {
        Self {
            job_id: job_id.to_string(),
            correlation_id: correlation_id.to_string(),
            operation: operation.to_string(),
        }
    }

    /// Log the start of a job operation.
    pub fn log_start(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            correlation_id = %self.correlation_id,
            operation = %self.operation,
            "Job started: {}", message
        );
    }

    /// Log a warning during job execution.
    pub fn log_warning(&self, message: &str) {
        warn!(
            job_id = %self.job_id,
            correlation_id = %self.correlation_id,
            operation = %self.operation,
            "Job warning: {}", message
        );
    }

    /// Log an error during job execution.
    pub fn log_error(&self, message: &str) {
        error!(
            job_id = %self.job_id,
            correlation_id = %self.correlation_id,
            operation = %self.operation,
            "Job error: {}", message
        );
    }

    /// Log the completion of a job operation.
    pub fn log_completion(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            correlation_id = %self.correlation_id,
            operation = %self.operation,
            "Job completed: {}", message
        );
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_logger_creation() {
        let job_id = JobId::new();
        let logger = JobLogger::new(&job_id, "req-9", "edit");

        assert_eq!(logger.job_id(), job_id.to_string());
        assert_eq!(logger.operation(), "edit");
    }
}
