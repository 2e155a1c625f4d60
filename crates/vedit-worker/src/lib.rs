//! Worker loops for the transcode job queue.
//!
//! A [`JobExecutor`] owns one queue instance and pulls claimed jobs through
//! the pipeline: mode resolution, execution, outcome reporting. The binary
//! runs two executors, one for edit jobs and one for upload normalization.

pub mod config;
pub mod error;
pub mod executor;
pub mod logging;

pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use executor::JobExecutor;
pub use logging::JobLogger;
