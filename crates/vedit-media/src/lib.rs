//! FFmpeg CLI wrapper and transcode pipeline for VEdit.
//!
//! This crate provides:
//! - An FFmpeg command builder and a cancellable process runner with
//!   exit-code classification (including OOM-kill detection)
//! - FFprobe-based source inspection
//! - Filter-graph and geometry construction for edit requests
//! - Target-bitrate math for size-targeted two-pass encodes
//! - A resource monitor deriving the ultra-safe mode decision
//! - The transcode pipeline driving edit and normalization jobs

pub mod bitrate;
pub mod command;
pub mod error;
pub mod filters;
pub mod pipeline;
pub mod probe;
pub mod progress;
pub mod resource;
pub mod runner;

pub use command::FfmpegCommand;
pub use error::{MediaError, MediaResult};
pub use pipeline::{JobContext, PipelineConfig, ProgressSink, TranscodePipeline};
pub use probe::{probe_video, VideoInfo};
pub use progress::FfmpegProgress;
pub use resource::ResourceMonitor;
pub use runner::{CommandRunner, RunContext, RunOutput, SystemRunner};
