//! In-memory admission-controlled job queue and registry.
//!
//! This crate provides:
//! - Bounded FIFO admission (reject-when-full, never blocking the caller)
//! - An id -> job registry with TTL expiry (lazy on `get` plus a sweeper)
//! - Cancellation of queued and running jobs
//! - The claim interface consumed by worker loops

pub mod config;
pub mod queue;

pub use config::QueueConfig;
pub use queue::{Admission, ClaimedJob, JobQueue};
