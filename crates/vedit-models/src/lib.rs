//! Shared data models for the VEdit transcode core.
//!
//! This crate provides Serde-serializable types for:
//! - Jobs, job ids, and the job status state machine
//! - Edit and upload-normalization requests
//! - Encode modes and RAM-pressure decisions
//! - Encoding configuration

pub mod encoding;
pub mod job;
pub mod request;

// Re-export common types
pub use encoding::EncodingConfig;
pub use job::{EncodeMode, Job, JobId, JobStatus, JobSubmission, RamDecision};
pub use request::{CropRect, EditRequest, JobRequest, NormalizeRequest, Rotation, Segment};
