//! External process execution with cancellation, timeout, and exit-code
//! classification.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use vedit_models::encoding::OOM_EXIT_CODE;

use crate::error::{MediaError, MediaResult};
use crate::progress::{parse_progress_line, FfmpegProgress};
use crate::resource::ResourceMonitor;

/// Callback invoked with parsed encoder progress.
pub type ProgressFn = Arc<dyn Fn(FfmpegProgress) + Send + Sync>;

/// Per-invocation context threaded through the runner.
#[derive(Clone)]
pub struct RunContext {
    /// Context label (e.g. "edit_pass1", "normalize") for log correlation
    pub label: String,
    /// Caller-supplied correlation id
    pub correlation_id: String,
    /// Cancellation signal; `true` means kill the child and bail out
    pub cancel: Option<watch::Receiver<bool>>,
    /// Per-invocation timeout
    pub timeout: Option<Duration>,
    /// Progress callback fed from the encoder's `-progress` output
    pub progress: Option<ProgressFn>,
}

impl RunContext {
    /// Create a context with just a label and correlation id.
    pub fn new(label: impl Into<String>, correlation_id: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            correlation_id: correlation_id.into(),
            cancel: None,
            timeout: None,
            progress: None,
        }
    }

    /// Attach a cancellation receiver.
    pub fn with_cancel(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Attach a timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Attach a progress callback.
    pub fn with_progress(mut self, progress: ProgressFn) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Derive a context for a sub-invocation with a different label.
    pub fn relabel(&self, label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ..self.clone()
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().map(|rx| *rx.borrow()).unwrap_or(false)
    }
}

/// Result of a finished external process.
#[derive(Debug, Clone)]
pub struct RunOutput {
    /// Whether the process exited with code 0
    pub success: bool,
    /// Final exit code (synthesized as 128 + signal for signal deaths)
    pub exit_code: i32,
    /// Captured standard output
    pub stdout: String,
    /// Captured standard error
    pub stderr: String,
}

/// Capability to run an external command.
///
/// Pipeline logic is written against this trait so it can be exercised with a
/// scripted fake that returns canned exit codes without spawning processes.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `program` with `args`, classifying the exit.
    ///
    /// Returns `Ok` only for exit code 0. Exit code 137 maps to
    /// [`MediaError::OomKilled`], any other non-zero exit to
    /// [`MediaError::EncoderFailed`], and cancellation to
    /// [`MediaError::Cancelled`].
    async fn run(&self, program: &str, args: &[String], ctx: &RunContext) -> MediaResult<RunOutput>;
}

/// [`CommandRunner`] backed by real child processes.
///
/// Every encoder exit code is reported to the shared [`ResourceMonitor`] so
/// the ultra-safe mode decision can react to OOM kills.
pub struct SystemRunner {
    monitor: Arc<ResourceMonitor>,
}

impl SystemRunner {
    /// Create a runner reporting encoder exits to the given monitor.
    pub fn new(monitor: Arc<ResourceMonitor>) -> Self {
        Self { monitor }
    }
}

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, program: &str, args: &[String], ctx: &RunContext) -> MediaResult<RunOutput> {
        which::which(program).map_err(|_| match program {
            "ffprobe" => MediaError::FfprobeNotFound,
            _ => MediaError::FfmpegNotFound,
        })?;

        if ctx.is_cancelled() {
            return Err(MediaError::Cancelled);
        }

        info!(
            context = %ctx.label,
            correlation_id = %ctx.correlation_id,
            program,
            "Running: {} {}",
            program,
            args.join(" ")
        );

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        // Drain both streams concurrently to avoid pipe deadlock on large output.
        let stdout = child.stdout.take();
        let stdout_handle = tokio::spawn(async move {
            let mut buf = String::new();
            if let Some(mut out) = stdout {
                let _ = out.read_to_string(&mut buf).await;
            }
            buf
        });

        let stderr = child.stderr.take();
        let progress_cb = ctx.progress.clone();
        let stderr_handle = tokio::spawn(async move {
            let mut collected = String::new();
            if let Some(err) = stderr {
                let mut lines = BufReader::new(err).lines();
                let mut current = FfmpegProgress::default();
                while let Ok(Some(line)) = lines.next_line().await {
                    if let Some(snapshot) = parse_progress_line(&line, &mut current) {
                        if let Some(cb) = &progress_cb {
                            cb(snapshot);
                        }
                        // Progress blocks are diagnostics, not error text
                        continue;
                    }
                    if !line.starts_with("frame=")
                        && !line.starts_with("fps=")
                        && !line.starts_with("out_time")
                        && !line.starts_with("speed=")
                    {
                        collected.push_str(&line);
                        collected.push('\n');
                    }
                }
            }
            collected
        });

        let status = self.wait_for_exit(&mut child, ctx).await;

        let stdout = stdout_handle.await.unwrap_or_default();
        let stderr = stderr_handle.await.unwrap_or_default();

        let status = match status {
            Ok(status) => status,
            Err(e) => {
                debug!(
                    context = %ctx.label,
                    correlation_id = %ctx.correlation_id,
                    "{} did not complete: {}",
                    program,
                    e
                );
                return Err(e);
            }
        };

        let exit_code = exit_code_of(&status);

        // Only encoder exits feed the mode decision; ffprobe runs are
        // irrelevant to encoder memory pressure.
        if program == "ffmpeg" {
            self.monitor.record_exit_code(exit_code);
        }

        info!(
            context = %ctx.label,
            correlation_id = %ctx.correlation_id,
            exit_code,
            "{} exited",
            program
        );

        classify_exit(exit_code, &ctx.label, stdout, stderr)
    }
}

impl SystemRunner {
    /// Wait for the child, honoring cancellation and timeout by killing it.
    async fn wait_for_exit(
        &self,
        child: &mut tokio::process::Child,
        ctx: &RunContext,
    ) -> MediaResult<std::process::ExitStatus> {
        let mut cancel = ctx.cancel.clone();

        loop {
            tokio::select! {
                status = child.wait() => {
                    return Ok(status?);
                }
                _ = cancelled(&mut cancel) => {
                    warn!(
                        context = %ctx.label,
                        correlation_id = %ctx.correlation_id,
                        "Cancellation requested, killing child process"
                    );
                    child.kill().await.ok();
                    // Reap before reporting: the job is not canceled until
                    // the process has actually exited.
                    let _ = child.wait().await;
                    return Err(MediaError::Cancelled);
                }
                _ = timeout_elapsed(ctx.timeout) => {
                    let secs = ctx.timeout.map(|t| t.as_secs()).unwrap_or(0);
                    warn!(
                        context = %ctx.label,
                        correlation_id = %ctx.correlation_id,
                        "Timed out after {}s, killing child process",
                        secs
                    );
                    child.kill().await.ok();
                    let _ = child.wait().await;
                    return Err(MediaError::Timeout(secs));
                }
            }
        }
    }
}

/// Resolve a final exit code, synthesizing 128 + signal for signal deaths so
/// a SIGKILLed encoder shows up as the conventional 137.
pub fn exit_code_of(status: &std::process::ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    -1
}

/// Map an exit code onto the runner's error taxonomy.
fn classify_exit(
    exit_code: i32,
    label: &str,
    stdout: String,
    stderr: String,
) -> MediaResult<RunOutput> {
    if exit_code == 0 {
        return Ok(RunOutput {
            success: true,
            exit_code,
            stdout,
            stderr,
        });
    }

    if exit_code == OOM_EXIT_CODE {
        return Err(MediaError::oom_killed(label.to_string()));
    }

    Err(MediaError::encoder_failed(
        format!("process exited with code {}", exit_code),
        stderr,
        exit_code,
    ))
}

/// Resolve once the cancel signal flips to `true`; pend forever without one.
async fn cancelled(cancel: &mut Option<watch::Receiver<bool>>) {
    match cancel {
        Some(rx) => {
            loop {
                if *rx.borrow() {
                    return;
                }
                if rx.changed().await.is_err() {
                    // Sender dropped without cancelling; never resolves
                    std::future::pending::<()>().await;
                }
            }
        }
        None => std::future::pending().await,
    }
}

/// Resolve when the optional timeout elapses; pend forever without one.
async fn timeout_elapsed(timeout: Option<Duration>) {
    match timeout {
        Some(t) => tokio::time::sleep(t).await,
        None => std::future::pending().await,
    }
}
