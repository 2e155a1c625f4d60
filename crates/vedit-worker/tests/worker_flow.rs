//! End-to-end worker flow tests over a scripted command runner.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Duration as ChronoDuration;

use vedit_media::{
    CommandRunner, JobContext, MediaError, MediaResult, PipelineConfig, ResourceMonitor,
    RunContext, RunOutput, TranscodePipeline,
};
use vedit_models::{
    EditRequest, EncodeMode, JobRequest, JobStatus, JobSubmission, NormalizeRequest, RamDecision,
};
use vedit_queue::{JobQueue, QueueConfig};
use vedit_worker::executor::execute_job;

const GIB: u64 = 1024 * 1024 * 1024;

const PROBE_JSON: &str = r#"{
    "format": { "duration": "20.0" },
    "streams": [
        { "codec_type": "video", "width": 1920, "height": 1080 },
        { "codec_type": "audio" }
    ]
}"#;

/// Scripted [`CommandRunner`]: canned probe output, queued ffmpeg exit
/// codes, and the same monitor reporting the real runner does.
struct FakeRunner {
    monitor: Arc<ResourceMonitor>,
    ffmpeg_exits: Mutex<VecDeque<i32>>,
    calls: Mutex<Vec<String>>,
    hang_ffmpeg: bool,
    hang_on_pass2: bool,
}

impl FakeRunner {
    fn new(monitor: Arc<ResourceMonitor>) -> Self {
        Self {
            monitor,
            ffmpeg_exits: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
            hang_ffmpeg: false,
            hang_on_pass2: false,
        }
    }

    fn script_exits(self, codes: impl IntoIterator<Item = i32>) -> Self {
        self.ffmpeg_exits.lock().unwrap().extend(codes);
        self
    }

    fn hanging(mut self) -> Self {
        self.hang_ffmpeg = true;
        self
    }

    fn hanging_on_pass2(mut self) -> Self {
        self.hang_on_pass2 = true;
        self
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

/// Simulate the stats files x264 drops next to the pass-log prefix.
fn write_pass_logs(args: &[String]) {
    if let Some(i) = args.iter().position(|a| a == "-passlogfile") {
        if let Some(prefix) = args.get(i + 1) {
            std::fs::write(format!("{prefix}-0.log"), "stats").ok();
            std::fs::write(format!("{prefix}-0.log.mbtree"), "tree").ok();
        }
    }
}

fn is_pass2(args: &[String]) -> bool {
    args.iter()
        .position(|a| a == "-pass")
        .and_then(|i| args.get(i + 1))
        .map_or(false, |v| v == "2")
}

async fn wait_for_cancel(ctx: &RunContext) -> MediaError {
    if let Some(rx) = &ctx.cancel {
        let mut rx = rx.clone();
        loop {
            if *rx.borrow() {
                return MediaError::Cancelled;
            }
            if rx.changed().await.is_err() {
                return MediaError::Cancelled;
            }
        }
    }
    MediaError::Cancelled
}

#[async_trait]
impl CommandRunner for FakeRunner {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        ctx: &RunContext,
    ) -> MediaResult<RunOutput> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("{program}:{}", ctx.label));

        if program == "ffprobe" {
            return Ok(RunOutput {
                success: true,
                exit_code: 0,
                stdout: PROBE_JSON.to_string(),
                stderr: String::new(),
            });
        }

        write_pass_logs(args);

        // Block like a long encode until the job is cancelled
        if self.hang_ffmpeg || (self.hang_on_pass2 && is_pass2(args)) {
            return Err(wait_for_cancel(ctx).await);
        }

        let code = self
            .ffmpeg_exits
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(0);
        self.monitor.record_exit_code(code);

        match code {
            0 => Ok(RunOutput {
                success: true,
                exit_code: 0,
                stdout: String::new(),
                stderr: String::new(),
            }),
            137 => Err(MediaError::oom_killed(ctx.label.clone())),
            other => Err(MediaError::encoder_failed(
                format!("process exited with code {other}"),
                "scripted failure",
                other,
            )),
        }
    }
}

struct Harness {
    queue: Arc<JobQueue>,
    pipeline: TranscodePipeline,
    monitor: Arc<ResourceMonitor>,
    runner: Arc<FakeRunner>,
    work: tempfile::TempDir,
}

impl Harness {
    fn new(runner: impl FnOnce(Arc<ResourceMonitor>) -> FakeRunner) -> Self {
        let monitor = Arc::new(ResourceMonitor::new(16 * GIB, 2 * GIB));
        let runner = Arc::new(runner(Arc::clone(&monitor)));
        let work = tempfile::tempdir().unwrap();
        let pipeline = TranscodePipeline::new(
            Arc::clone(&runner) as Arc<dyn CommandRunner>,
            PipelineConfig {
                work_dir: work.path().join("scratch"),
                ..PipelineConfig::default()
            },
        );
        let queue = Arc::new(JobQueue::new(QueueConfig {
            capacity: 4,
            ttl: ChronoDuration::minutes(5),
        }));
        Self {
            queue,
            pipeline,
            monitor,
            runner,
            work,
        }
    }

    /// Root of the pipeline's scratch space (per-job dirs live below it).
    fn scratch_root(&self) -> std::path::PathBuf {
        self.work.path().join("scratch")
    }

    fn submission(&self, request: JobRequest) -> JobSubmission {
        let input = self.work.path().join("input.mp4");
        std::fs::write(&input, b"not a real video").unwrap();
        JobSubmission {
            request,
            input_path: input,
            output_path: self.work.path().join("output.mp4"),
            correlation_id: "req-1".into(),
            requested_mode: EncodeMode::Standard,
            duration_seconds: 20.0,
        }
    }

    async fn run_one(&self, request: JobRequest) -> vedit_models::Job {
        let id = self
            .queue
            .enqueue(self.submission(request))
            .job()
            .unwrap()
            .id
            .clone();
        let claimed = self.queue.try_claim().unwrap();
        execute_job(
            &self.queue,
            &self.pipeline,
            &self.monitor,
            Duration::from_secs(60),
            claimed,
        )
        .await;
        self.queue.get(&id).unwrap()
    }
}

#[tokio::test]
async fn test_edit_job_runs_to_success() {
    let h = Harness::new(FakeRunner::new);

    let job = h.run_one(JobRequest::Edit(EditRequest::default())).await;

    assert_eq!(job.status, JobStatus::Succeeded);
    assert_eq!(job.progress, 100);
    assert_eq!(
        job.output_path.as_deref(),
        Some(h.work.path().join("output.mp4").as_path())
    );
    assert_eq!(job.resolved_mode, Some(EncodeMode::Standard));
    assert_eq!(job.ram_decision, RamDecision::None);

    let calls = h.runner.calls();
    assert!(calls.iter().any(|c| c == "ffprobe:probe"));
    assert!(calls.iter().any(|c| c == "ffmpeg:edit"));
}

#[tokio::test]
async fn test_normalize_job_runs_to_success() {
    let h = Harness::new(FakeRunner::new);

    let job = h
        .run_one(JobRequest::Normalize(NormalizeRequest::default()))
        .await;

    assert_eq!(job.status, JobStatus::Succeeded);
    assert!(h.runner.calls().iter().any(|c| c == "ffmpeg:normalize"));
}

#[tokio::test]
async fn test_size_target_runs_two_passes() {
    let h = Harness::new(FakeRunner::new);

    let request = EditRequest {
        target_size_mb: Some(10.0),
        ..EditRequest::default()
    };
    let job = h.run_one(JobRequest::Edit(request)).await;

    assert_eq!(job.status, JobStatus::Succeeded);
    let calls = h.runner.calls();
    assert!(calls.iter().any(|c| c == "ffmpeg:edit_pass1"));
    assert!(calls.iter().any(|c| c == "ffmpeg:edit_pass2"));
}

/// All regular files under `dir`, recursively.
fn surviving_files(dir: &Path) -> Vec<std::path::PathBuf> {
    let mut found = Vec::new();
    let mut stack = vec![dir.to_path_buf()];
    while let Some(d) = stack.pop() {
        let Ok(entries) = std::fs::read_dir(&d) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else {
                found.push(path);
            }
        }
    }
    found
}

#[tokio::test]
async fn test_failed_second_pass_leaves_no_pass_logs() {
    // Pass 1 succeeds and drops its stats files, pass 2 dies
    let h = Harness::new(|m| FakeRunner::new(m).script_exits([0, 1]));

    let request = EditRequest {
        target_size_mb: Some(8.0),
        ..EditRequest::default()
    };
    let job = h.run_one(JobRequest::Edit(request)).await;

    assert_eq!(job.status, JobStatus::Failed);
    let leftovers = surviving_files(&h.scratch_root());
    assert!(leftovers.is_empty(), "leftover scratch files: {leftovers:?}");
}

#[tokio::test]
async fn test_cancelled_two_pass_leaves_no_pass_logs() {
    let h = Arc::new(Harness::new(|m| {
        FakeRunner::new(m).script_exits([0]).hanging_on_pass2()
    }));

    let request = EditRequest {
        target_size_mb: Some(8.0),
        ..EditRequest::default()
    };
    let id = h
        .queue
        .enqueue(h.submission(JobRequest::Edit(request)))
        .job()
        .unwrap()
        .id
        .clone();
    let claimed = h.queue.try_claim().unwrap();

    let worker = {
        let h = Arc::clone(&h);
        tokio::spawn(async move {
            execute_job(
                &h.queue,
                &h.pipeline,
                &h.monitor,
                Duration::from_secs(60),
                claimed,
            )
            .await;
        })
    };

    // Cancel mid-encode, while pass 1's stats files are on disk
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(h.queue.cancel(&id));
    tokio::time::timeout(Duration::from_secs(2), worker)
        .await
        .expect("worker should observe the cancellation")
        .unwrap();

    assert_eq!(h.queue.get(&id).unwrap().status, JobStatus::Canceled);
    let leftovers = surviving_files(&h.scratch_root());
    assert!(leftovers.is_empty(), "leftover scratch files: {leftovers:?}");
}

#[tokio::test]
async fn test_encoder_failure_marks_job_failed() {
    let h = Harness::new(|m| FakeRunner::new(m).script_exits([1]));

    let job = h.run_one(JobRequest::Edit(EditRequest::default())).await;

    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.error.unwrap().contains("exit code 1"));
}

#[tokio::test]
async fn test_oom_kill_fails_job_and_downgrades_the_next_one() {
    let h = Harness::new(|m| FakeRunner::new(m).script_exits([137, 0, 0]));

    let oom = h.run_one(JobRequest::Edit(EditRequest::default())).await;
    assert_eq!(oom.status, JobStatus::Failed);
    assert!(oom.error.unwrap().contains("OOM"));
    assert_eq!(oom.resolved_mode, Some(EncodeMode::Standard));

    // Next job runs in ultra-safe mode because of the observed kill
    let retry = h.run_one(JobRequest::Edit(EditRequest::default())).await;
    assert_eq!(retry.status, JobStatus::Succeeded);
    assert_eq!(retry.resolved_mode, Some(EncodeMode::UltraSafe));
    assert_eq!(retry.ram_decision, RamDecision::PreviousOomKill);

    // The successful exit clears the observation
    let third = h.run_one(JobRequest::Edit(EditRequest::default())).await;
    assert_eq!(third.resolved_mode, Some(EncodeMode::Standard));
    assert_eq!(third.ram_decision, RamDecision::None);
}

#[tokio::test]
async fn test_low_memory_server_always_runs_ultra_safe() {
    let monitor = Arc::new(ResourceMonitor::new(1 * GIB, 2 * GIB));
    let runner = Arc::new(FakeRunner::new(Arc::clone(&monitor)));
    let work = tempfile::tempdir().unwrap();
    let pipeline = TranscodePipeline::new(
        Arc::clone(&runner) as Arc<dyn CommandRunner>,
        PipelineConfig {
            work_dir: work.path().join("scratch"),
            ..PipelineConfig::default()
        },
    );
    let queue = Arc::new(JobQueue::new(QueueConfig {
        capacity: 4,
        ttl: ChronoDuration::minutes(5),
    }));

    let input = work.path().join("input.mp4");
    std::fs::write(&input, b"not a real video").unwrap();
    let id = queue
        .enqueue(JobSubmission {
            request: JobRequest::Edit(EditRequest::default()),
            input_path: input,
            output_path: work.path().join("output.mp4"),
            correlation_id: "req-1".into(),
            requested_mode: EncodeMode::Standard,
            duration_seconds: 20.0,
        })
        .job()
        .unwrap()
        .id
        .clone();
    let claimed = queue.try_claim().unwrap();
    execute_job(
        &queue,
        &pipeline,
        &monitor,
        Duration::from_secs(60),
        claimed,
    )
    .await;

    let job = queue.get(&id).unwrap();
    assert_eq!(job.resolved_mode, Some(EncodeMode::UltraSafe));
    assert_eq!(job.ram_decision, RamDecision::LowMemoryServer);
}

#[tokio::test]
async fn test_cancel_running_job_waits_for_process_exit() {
    let h = Arc::new(Harness::new(|m| FakeRunner::new(m).hanging()));

    let id = h
        .queue
        .enqueue(h.submission(JobRequest::Edit(EditRequest::default())))
        .job()
        .unwrap()
        .id
        .clone();
    let claimed = h.queue.try_claim().unwrap();

    let worker = {
        let h = Arc::clone(&h);
        tokio::spawn(async move {
            execute_job(
                &h.queue,
                &h.pipeline,
                &h.monitor,
                Duration::from_secs(60),
                claimed,
            )
            .await;
        })
    };

    // Let the encode reach the hanging runner before cancelling
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(h.queue.cancel(&id));

    tokio::time::timeout(Duration::from_secs(2), worker)
        .await
        .expect("worker should observe the cancellation")
        .unwrap();

    assert_eq!(h.queue.get(&id).unwrap().status, JobStatus::Canceled);
}
