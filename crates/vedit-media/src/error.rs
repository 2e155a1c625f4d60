//! Error types for media operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur during media processing.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("FFmpeg not found in PATH")]
    FfmpegNotFound,

    #[error("FFprobe not found in PATH")]
    FfprobeNotFound,

    #[error("encoder failed (exit code {exit_code}): {message}")]
    EncoderFailed {
        message: String,
        stderr: String,
        exit_code: i32,
    },

    #[error("encoder killed by the OOM killer (exit code 137) during {context}")]
    OomKilled { context: String },

    #[error("FFprobe failed: {message}")]
    ProbeFailed { message: String, stderr: Option<String> },

    #[error("invalid edit request: {0}")]
    InvalidRequest(String),

    #[error("file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("operation cancelled")]
    Cancelled,

    #[error("operation timed out after {0} seconds")]
    Timeout(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("invalid video file: {0}")]
    InvalidVideo(String),
}

impl MediaError {
    /// Create an encoder failure error.
    pub fn encoder_failed(
        message: impl Into<String>,
        stderr: impl Into<String>,
        exit_code: i32,
    ) -> Self {
        Self::EncoderFailed {
            message: message.into(),
            stderr: stderr.into(),
            exit_code,
        }
    }

    /// Create an OOM-kill error for the given invocation context.
    pub fn oom_killed(context: impl Into<String>) -> Self {
        Self::OomKilled {
            context: context.into(),
        }
    }

    /// Create an invalid request error.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    /// Whether this failure was an OOM kill of the encoder.
    pub fn is_oom_kill(&self) -> bool {
        matches!(self, Self::OomKilled { .. })
    }

    /// Whether this outcome is a user-initiated cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
