//! The transcode pipeline: edit request -> encoder invocation(s).

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info};

use vedit_models::encoding::{DEFAULT_SIZE_SAFETY_MARGIN, ULTRA_SAFE_PRESET};
use vedit_models::{EditRequest, EncodeMode, EncodingConfig, JobRequest, NormalizeRequest};

use crate::bitrate::video_bitrate_kbps;
use crate::command::{FfmpegCommand, NULL_OUTPUT};
use crate::error::{MediaError, MediaResult};
use crate::filters::{build_audio_filter, build_video_filter, normalize_scale_filter};
use crate::probe::{probe_video, VideoInfo};
use crate::progress::FfmpegProgress;
use crate::runner::{CommandRunner, ProgressFn, RunContext};

/// Sink receiving 0-100 job progress updates.
pub type ProgressSink = Arc<dyn Fn(u8) + Send + Sync>;

/// Pipeline configuration supplied by the host at startup.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Base encoding parameters
    pub encoding: EncodingConfig,
    /// Fraction of the target size held back in size-targeted encodes
    pub size_safety_margin: f64,
    /// Directory for per-job scratch space
    pub work_dir: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            encoding: EncodingConfig::default(),
            size_safety_margin: DEFAULT_SIZE_SAFETY_MARGIN,
            work_dir: std::env::temp_dir().join("vedit"),
        }
    }
}

impl PipelineConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            encoding: EncodingConfig::default(),
            size_safety_margin: std::env::var("VEDIT_SIZE_SAFETY_MARGIN")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.size_safety_margin),
            work_dir: std::env::var("VEDIT_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
        }
    }
}

/// Per-job execution context handed to the pipeline by the worker.
#[derive(Clone)]
pub struct JobContext {
    /// Job id, for logging
    pub job_id: String,
    /// Caller-supplied correlation id
    pub correlation_id: String,
    /// Cancellation signal shared with the registry
    pub cancel: watch::Receiver<bool>,
    /// Per-invocation timeout
    pub timeout: Option<Duration>,
    /// Progress sink writing onto the job record
    pub on_progress: ProgressSink,
}

impl JobContext {
    fn run_ctx(&self, label: &str) -> RunContext {
        let mut ctx = RunContext::new(label, self.correlation_id.clone())
            .with_cancel(self.cancel.clone());
        if let Some(t) = self.timeout {
            ctx = ctx.with_timeout(t);
        }
        ctx
    }

    fn check_cancelled(&self) -> MediaResult<()> {
        if *self.cancel.borrow() {
            return Err(MediaError::Cancelled);
        }
        Ok(())
    }
}

/// The time range of the source fed into the encode invocation.
enum Timeline {
    /// Single window, applied with -ss/-t on the encode itself
    Window { start: f64 },
    /// Multiple segments already assembled into one intermediate file
    Assembled,
}

/// Drives edit and normalization jobs through the encoder.
pub struct TranscodePipeline {
    runner: Arc<dyn CommandRunner>,
    config: PipelineConfig,
}

impl TranscodePipeline {
    /// Create a pipeline over the given runner.
    pub fn new(runner: Arc<dyn CommandRunner>, config: PipelineConfig) -> Self {
        Self { runner, config }
    }

    /// Run a job to completion, returning the finished output path.
    pub async fn run(
        &self,
        request: &JobRequest,
        input: &Path,
        output: &Path,
        duration_hint: f64,
        mode: EncodeMode,
        ctx: &JobContext,
    ) -> MediaResult<PathBuf> {
        if !input.exists() {
            return Err(MediaError::FileNotFound(input.to_path_buf()));
        }
        match request {
            JobRequest::Edit(req) => self.run_edit(req, input, output, duration_hint, mode, ctx).await,
            JobRequest::Normalize(req) => self.run_normalize(req, input, output, duration_hint, ctx).await,
        }
    }

    /// Execute an edit request.
    async fn run_edit(
        &self,
        req: &EditRequest,
        input: &Path,
        output: &Path,
        duration_hint: f64,
        mode: EncodeMode,
        ctx: &JobContext,
    ) -> MediaResult<PathBuf> {
        let probe_ctx = ctx.run_ctx("probe");
        let info = probe_video(self.runner.as_ref(), input, &probe_ctx).await?;

        let source_duration = if duration_hint > 0.0 {
            duration_hint
        } else {
            info.duration
        };
        let output_duration = req.output_duration(source_duration);

        info!(
            job_id = %ctx.job_id,
            correlation_id = %ctx.correlation_id,
            mode = %mode,
            output_duration,
            "Starting edit transcode"
        );

        // Scratch directory for segment assembly and two-pass stats files;
        // dropped (and deleted) on every exit path.
        tokio::fs::create_dir_all(&self.config.work_dir).await?;
        let scratch = tempfile::tempdir_in(&self.config.work_dir)?;

        let (encode_input, timeline) = if req.segments.len() > 1 {
            let joined = self
                .assemble_segments(req, input, scratch.path(), ctx)
                .await?;
            (joined, Timeline::Assembled)
        } else if let Some(seg) = req.segments.first() {
            (input.to_path_buf(), Timeline::Window { start: seg.start })
        } else {
            let start = req.trim_start.unwrap_or(0.0).max(0.0);
            (input.to_path_buf(), Timeline::Window { start })
        };

        let video_filter = build_video_filter(&info, req, mode)?;
        let audio_filter = build_audio_filter(req)?;

        let base_cmd = |out: &Path| {
            let mut cmd = FfmpegCommand::new(&encode_input, out);
            if let Timeline::Window { start } = &timeline {
                if *start > 0.0 {
                    cmd = cmd.seek(*start);
                }
            }
            cmd = cmd.duration(output_duration);
            if let Some(vf) = &video_filter {
                cmd = cmd.video_filter(vf.clone());
            }
            cmd
        };

        let encoding = &self.config.encoding;
        let result = match req.target_size_mb {
            Some(target_mb) => {
                let audio_allowance = if req.mute {
                    0
                } else {
                    encoding.audio_bitrate_kbps
                };
                let kbps = video_bitrate_kbps(
                    target_mb,
                    output_duration,
                    self.config.size_safety_margin,
                    audio_allowance,
                )?;

                match mode {
                    EncodeMode::Standard => {
                        self.two_pass_encode(
                            &base_cmd,
                            output,
                            kbps,
                            req,
                            &audio_filter,
                            scratch.path(),
                            ctx,
                        )
                        .await
                    }
                    EncodeMode::UltraSafe => {
                        // Single constrained-bitrate pass: no stats pass, no
                        // lookahead buffers, one encoder thread.
                        let mut cmd = base_cmd(output)
                            .video_codec(&encoding.codec)
                            .preset(ULTRA_SAFE_PRESET)
                            .video_bitrate_kbps(kbps)
                            .constrained_bitrate_kbps(kbps)
                            .threads(1)
                            .faststart();
                        cmd = apply_audio(cmd, req, &audio_filter, encoding);
                        self.run_encode(&cmd, "edit_ultra_safe", 0, 100, output_duration, ctx)
                            .await
                    }
                }
            }
            None => {
                let preset = match mode {
                    EncodeMode::Standard => encoding.preset.as_str(),
                    EncodeMode::UltraSafe => ULTRA_SAFE_PRESET,
                };
                let mut cmd = base_cmd(output)
                    .video_codec(&encoding.codec)
                    .preset(preset)
                    .crf(encoding.crf)
                    .faststart();
                if mode == EncodeMode::UltraSafe {
                    cmd = cmd.threads(1);
                }
                cmd = apply_audio(cmd, req, &audio_filter, encoding);
                self.run_encode(&cmd, "edit", 0, 100, output_duration, ctx)
                    .await
            }
        };

        result?;

        info!(
            job_id = %ctx.job_id,
            correlation_id = %ctx.correlation_id,
            output = %output.display(),
            "Edit transcode finished"
        );

        Ok(output.to_path_buf())
    }

    /// Run the two passes of a size-targeted encode.
    ///
    /// Pass-log files are removed on every exit path: explicitly here, and
    /// again when the scratch directory drops.
    async fn two_pass_encode(
        &self,
        base_cmd: &(dyn Fn(&Path) -> FfmpegCommand + Sync),
        output: &Path,
        kbps: u32,
        req: &EditRequest,
        audio_filter: &Option<String>,
        scratch: &Path,
        ctx: &JobContext,
    ) -> MediaResult<()> {
        let encoding = &self.config.encoding;
        let passlog = scratch.join("ffpass");

        let pass1 = base_cmd(Path::new(NULL_OUTPUT))
            .video_codec(&encoding.codec)
            .preset(&encoding.preset)
            .video_bitrate_kbps(kbps)
            .pass(1, &passlog)
            .no_audio()
            .format("mp4");

        let mut pass2 = base_cmd(output)
            .video_codec(&encoding.codec)
            .preset(&encoding.preset)
            .video_bitrate_kbps(kbps)
            .pass(2, &passlog)
            .faststart();
        pass2 = apply_audio(pass2, req, audio_filter, encoding);

        let duration = duration_arg_of(&pass1);
        let result = async {
            self.run_encode(&pass1, "edit_pass1", 0, 50, duration, ctx)
                .await?;
            ctx.check_cancelled()?;
            self.run_encode(&pass2, "edit_pass2", 50, 100, duration, ctx)
                .await
        }
        .await;

        cleanup_pass_logs(&passlog).await;
        result
    }

    /// Stream-copy each segment out of the source and concatenate them.
    async fn assemble_segments(
        &self,
        req: &EditRequest,
        input: &Path,
        scratch: &Path,
        ctx: &JobContext,
    ) -> MediaResult<PathBuf> {
        let mut list = String::new();

        for (i, seg) in req.segments.iter().enumerate() {
            ctx.check_cancelled()?;
            if seg.duration() <= 0.0 {
                return Err(MediaError::invalid_request(format!(
                    "segment {} is empty ({:.3}..{:.3})",
                    i, seg.start, seg.end
                )));
            }

            let part = scratch.join(format!("segment_{i}.mp4"));
            let cmd = FfmpegCommand::new(input, &part)
                .seek(seg.start)
                .duration(seg.duration())
                .codec_copy();

            self.runner
                .run(
                    "ffmpeg",
                    &cmd.build_args(),
                    &ctx.run_ctx(&format!("edit_segment_{i}")),
                )
                .await?;

            // Concat list entries single-quote paths; escape embedded quotes
            let escaped = part.to_string_lossy().replace('\'', "'\\''");
            list.push_str(&format!("file '{escaped}'\n"));
        }

        let list_path = scratch.join("segments.txt");
        tokio::fs::write(&list_path, list).await?;

        let joined = scratch.join("joined.mp4");
        let cmd = FfmpegCommand::new(&list_path, &joined)
            .concat_input()
            .codec_copy();

        self.runner
            .run("ffmpeg", &cmd.build_args(), &ctx.run_ctx("edit_concat"))
            .await?;

        debug!(
            job_id = %ctx.job_id,
            segments = req.segments.len(),
            "Assembled segment concat input"
        );

        Ok(joined)
    }

    /// Transcode a fresh upload into the canonical editable format.
    async fn run_normalize(
        &self,
        req: &NormalizeRequest,
        input: &Path,
        output: &Path,
        duration_hint: f64,
        ctx: &JobContext,
    ) -> MediaResult<PathBuf> {
        let info = probe_video(self.runner.as_ref(), input, &ctx.run_ctx("probe")).await?;
        let duration = if duration_hint > 0.0 {
            duration_hint
        } else {
            info.duration
        };

        info!(
            job_id = %ctx.job_id,
            correlation_id = %ctx.correlation_id,
            source = %input.display(),
            "Normalizing upload to editable format"
        );

        let encoding = &self.config.encoding;
        let cmd = FfmpegCommand::new(input, output)
            .video_filter(normalize_scale_filter(req.max_width, req.max_height))
            .video_codec(&encoding.codec)
            .preset(&encoding.preset)
            .crf(encoding.crf)
            .output_args(["-pix_fmt", "yuv420p"])
            .audio_codec(&encoding.audio_codec)
            .audio_bitrate(encoding.audio_bitrate_arg())
            .faststart();

        self.run_encode(&cmd, "normalize", 0, 100, duration, ctx)
            .await?;

        Ok(output.to_path_buf())
    }

    /// Run one encoder invocation with progress mapped into [lo, hi].
    async fn run_encode(
        &self,
        cmd: &FfmpegCommand,
        label: &str,
        lo: u8,
        hi: u8,
        output_duration: f64,
        ctx: &JobContext,
    ) -> MediaResult<()> {
        let run_ctx = ctx
            .run_ctx(label)
            .with_progress(scaled_progress(ctx.on_progress.clone(), output_duration, lo, hi));

        self.runner.run("ffmpeg", &cmd.build_args(), &run_ctx).await?;
        (ctx.on_progress)(hi);
        Ok(())
    }
}

/// Attach the audio leg of an edit command: mute, tempo filter, or re-encode.
fn apply_audio(
    mut cmd: FfmpegCommand,
    req: &EditRequest,
    audio_filter: &Option<String>,
    encoding: &EncodingConfig,
) -> FfmpegCommand {
    if req.mute {
        return cmd.no_audio();
    }
    if let Some(af) = audio_filter {
        cmd = cmd.audio_filter(af.clone());
    }
    cmd.audio_codec(&encoding.audio_codec)
        .audio_bitrate(encoding.audio_bitrate_arg())
}

/// Recover the `-t` value carried by a built command, for progress math.
fn duration_arg_of(cmd: &FfmpegCommand) -> f64 {
    let args = cmd.build_args();
    args.iter()
        .position(|a| a == "-t")
        .and_then(|i| args.get(i + 1))
        .and_then(|v| v.parse().ok())
        .unwrap_or(0.0)
}

/// Map encoder out-time onto a [lo, hi] slice of overall job progress.
fn scaled_progress(sink: ProgressSink, output_duration: f64, lo: u8, hi: u8) -> ProgressFn {
    let total_ms = (output_duration * 1000.0) as i64;
    Arc::new(move |p: FfmpegProgress| {
        let pct = p.percentage(total_ms);
        sink(map_range(pct, lo, hi));
    })
}

/// Map a 0-100 percentage into the [lo, hi] band.
fn map_range(pct: f64, lo: u8, hi: u8) -> u8 {
    let span = (hi - lo) as f64;
    (lo as f64 + pct.clamp(0.0, 100.0) * span / 100.0).round() as u8
}

/// Remove x264 two-pass statistics files for the given prefix.
///
/// Missing files are fine; anything else is logged and swallowed so cleanup
/// never masks the encode outcome.
pub async fn cleanup_pass_logs(prefix: &Path) {
    let prefix = prefix.to_string_lossy();
    for suffix in ["-0.log", "-0.log.mbtree"] {
        let path = PathBuf::from(format!("{prefix}{suffix}"));
        match tokio::fs::remove_file(&path).await {
            Ok(()) => debug!("Removed pass log {}", path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!("Failed to remove pass log {}: {}", path.display(), e),
        }
    }
}
