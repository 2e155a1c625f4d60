//! Job record and status state machine.

use chrono::{DateTime, Duration, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

use crate::request::JobRequest;

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Job lifecycle status.
///
/// Transitions are monotonic: `Queued -> Running -> {Succeeded|Failed|Canceled}`,
/// plus `Expired` from any non-terminal state via TTL sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Job is waiting in the queue
    #[default]
    Queued,
    /// Job is being processed by a worker
    Running,
    /// Job completed successfully
    Succeeded,
    /// Job failed with an error
    Failed,
    /// Job was canceled by the caller
    Canceled,
    /// Job passed its TTL before reaching a terminal state
    Expired,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
            JobStatus::Canceled => "canceled",
            JobStatus::Expired => "expired",
        }
    }

    /// Check if this is a terminal state (no more transitions expected).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Succeeded | JobStatus::Failed | JobStatus::Canceled | JobStatus::Expired
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Encoding mode requested by the caller or resolved by the resource monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum EncodeMode {
    /// Full-quality encoding, two-pass when a target size is requested
    #[default]
    Standard,
    /// Reduced-memory encoding: single constrained-bitrate pass,
    /// tightened vertical-offset clamp, single encoder thread
    UltraSafe,
}

impl EncodeMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            EncodeMode::Standard => "standard",
            EncodeMode::UltraSafe => "ultra_safe",
        }
    }
}

impl fmt::Display for EncodeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Why a job's mode was downgraded by the resource monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum RamDecision {
    /// No downgrade
    #[default]
    None,
    /// Total system memory is at or below the configured threshold
    LowMemoryServer,
    /// The most recent encoder run was killed by the OOM killer
    PreviousOomKill,
}

impl RamDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            RamDecision::None => "none",
            RamDecision::LowMemoryServer => "low_memory_server",
            RamDecision::PreviousOomKill => "previous_oom_kill",
        }
    }
}

/// Everything a caller supplies when submitting work.
///
/// The admission controller performs no validation of these fields; the HTTP
/// layer resolves paths and validates the request before submission.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct JobSubmission {
    /// The edit or normalization request
    pub request: JobRequest,
    /// Resolved input file path
    pub input_path: PathBuf,
    /// Pre-decided output file path
    pub output_path: PathBuf,
    /// Caller-supplied correlation id for log threading
    pub correlation_id: String,
    /// Encoding mode the caller asked for
    #[serde(default)]
    pub requested_mode: EncodeMode,
    /// Source clip duration in seconds (for progress and bitrate math)
    pub duration_seconds: f64,
}

/// A job record as held by the registry and returned from polling.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Job {
    /// Unique job ID
    pub id: JobId,

    /// Caller-supplied correlation id, immutable after creation
    pub correlation_id: String,

    /// The original request, immutable after creation
    pub request: JobRequest,

    /// Resolved input file path, immutable after creation
    pub input_path: PathBuf,

    /// Pre-decided output file path, immutable after creation
    pub planned_output: PathBuf,

    /// Encoding mode the caller asked for
    pub requested_mode: EncodeMode,

    /// Encoding mode actually used (set when the worker claims the job)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_mode: Option<EncodeMode>,

    /// Why a mode downgrade happened, if any
    #[serde(default)]
    pub ram_decision: RamDecision,

    /// Source clip duration in seconds
    pub duration_seconds: f64,

    /// Current lifecycle status
    #[serde(default)]
    pub status: JobStatus,

    /// Progress percentage (0-100), monotonically non-decreasing while running
    #[serde(default)]
    pub progress: u8,

    /// Error message, populated only on `Failed`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Output file path, populated only on `Succeeded`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Absolute expiry timestamp, always after `created_at`
    pub ttl_at: DateTime<Utc>,
}

impl Job {
    /// Create a new queued job from a submission.
    pub fn new(submission: JobSubmission, ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            correlation_id: submission.correlation_id,
            request: submission.request,
            input_path: submission.input_path,
            planned_output: submission.output_path,
            requested_mode: submission.requested_mode,
            resolved_mode: None,
            ram_decision: RamDecision::None,
            duration_seconds: submission.duration_seconds,
            status: JobStatus::Queued,
            progress: 0,
            error: None,
            output_path: None,
            created_at: now,
            ttl_at: now + ttl,
        }
    }

    /// Check if the job has passed its TTL at the given instant.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.ttl_at
    }

    /// Transition `Queued -> Running`.
    pub fn start(&mut self) {
        debug_assert_eq!(self.status, JobStatus::Queued);
        self.status = JobStatus::Running;
    }

    /// Record the mode resolution made before the pipeline runs.
    pub fn resolve_mode(&mut self, mode: EncodeMode, decision: RamDecision) {
        self.resolved_mode = Some(mode);
        self.ram_decision = decision;
    }

    /// Transition `Running -> Succeeded` with the finished output path.
    pub fn complete(&mut self, output: PathBuf) {
        if self.status == JobStatus::Running {
            self.status = JobStatus::Succeeded;
            self.progress = 100;
            self.output_path = Some(output);
        }
    }

    /// Transition `Running -> Failed` with an error message.
    pub fn fail(&mut self, error: impl Into<String>) {
        if self.status == JobStatus::Running {
            self.status = JobStatus::Failed;
            self.error = Some(error.into());
        }
    }

    /// Transition `Queued|Running -> Canceled`.
    pub fn cancel(&mut self) {
        if matches!(self.status, JobStatus::Queued | JobStatus::Running) {
            self.status = JobStatus::Canceled;
        }
    }

    /// Transition a non-running, non-terminal job to `Expired`.
    pub fn expire(&mut self) {
        if self.status == JobStatus::Queued {
            self.status = JobStatus::Expired;
        }
    }

    /// Update progress; never moves backwards.
    pub fn set_progress(&mut self, progress: u8) {
        if self.status == JobStatus::Running {
            self.progress = self.progress.max(progress.min(100));
        }
    }
}
