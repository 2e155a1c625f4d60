//! Job executor.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info};

use vedit_media::{JobContext, ResourceMonitor, TranscodePipeline};
use vedit_models::{JobRequest, RamDecision};
use vedit_queue::{ClaimedJob, JobQueue};

use crate::config::WorkerConfig;
use crate::error::WorkerResult;
use crate::logging::JobLogger;

/// Job executor that pulls claimed jobs from one queue through the pipeline.
///
/// The binary runs one executor per queue instance (edit, upload
/// normalization); each spawns `concurrency` worker loops.
pub struct JobExecutor {
    config: WorkerConfig,
    queue: Arc<JobQueue>,
    pipeline: Arc<TranscodePipeline>,
    monitor: Arc<ResourceMonitor>,
    shutdown: tokio::sync::watch::Sender<bool>,
}

impl JobExecutor {
    /// Create a new job executor over the given queue and pipeline.
    pub fn new(
        config: WorkerConfig,
        queue: Arc<JobQueue>,
        pipeline: Arc<TranscodePipeline>,
        monitor: Arc<ResourceMonitor>,
    ) -> Self {
        let (shutdown, _) = tokio::sync::watch::channel(false);
        Self {
            config,
            queue,
            pipeline,
            monitor,
            shutdown,
        }
    }

    /// Run worker loops until shutdown is signalled.
    pub async fn run(&self) -> WorkerResult<()> {
        info!(
            concurrency = self.config.concurrency,
            job_timeout_secs = self.config.job_timeout.as_secs(),
            "Starting job executor"
        );

        let sweeper = Arc::clone(&self.queue).spawn_sweeper(self.config.sweep_interval);

        let mut handles = Vec::with_capacity(self.config.concurrency);
        for worker_idx in 0..self.config.concurrency {
            let queue = Arc::clone(&self.queue);
            let pipeline = Arc::clone(&self.pipeline);
            let monitor = Arc::clone(&self.monitor);
            let job_timeout = self.config.job_timeout;
            let mut shutdown_rx = self.shutdown.subscribe();

            handles.push(tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = shutdown_rx.changed() => {
                            if *shutdown_rx.borrow() {
                                break;
                            }
                        }
                        claimed = queue.next_job() => {
                            execute_job(&queue, &pipeline, &monitor, job_timeout, claimed).await;
                        }
                    }
                }
                debug!(worker_idx, "Worker loop stopped");
            }));
        }

        for handle in handles {
            if let Err(e) = handle.await {
                error!("Worker loop panicked: {}", e);
            }
        }
        sweeper.abort();

        info!("Job executor stopped");
        Ok(())
    }

    /// Signal shutdown; running jobs finish their current invocation.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }
}

/// Execute a single claimed job and report its outcome to the registry.
pub async fn execute_job(
    queue: &Arc<JobQueue>,
    pipeline: &TranscodePipeline,
    monitor: &ResourceMonitor,
    job_timeout: Duration,
    claimed: ClaimedJob,
) {
    let job = claimed.job;
    let operation = match &job.request {
        JobRequest::Edit(_) => "edit",
        JobRequest::Normalize(_) => "normalize",
    };
    let logger = JobLogger::new(&job.id, &job.correlation_id, operation);

    // Mode resolution happens at claim time, not admission time, so an OOM
    // kill observed while this job waited in the queue still downgrades it.
    let (mode, decision) = monitor.resolve_mode(job.requested_mode);
    queue.record_resolution(&job.id, mode, decision);
    if decision != RamDecision::None {
        logger.log_warning(&format!(
            "Encoding downgraded to {} ({})",
            mode,
            decision.as_str()
        ));
    }

    logger.log_start(&format!("input {}", job.input_path.display()));

    let progress_queue = Arc::clone(queue);
    let progress_id = job.id.clone();
    let ctx = JobContext {
        job_id: job.id.to_string(),
        correlation_id: job.correlation_id.clone(),
        cancel: claimed.cancel,
        timeout: Some(job_timeout),
        on_progress: Arc::new(move |pct| progress_queue.set_progress(&progress_id, pct)),
    };

    match pipeline
        .run(
            &job.request,
            &job.input_path,
            &job.planned_output,
            job.duration_seconds,
            mode,
            &ctx,
        )
        .await
    {
        Ok(output) => {
            queue.complete(&job.id, output.clone());
            logger.log_completion(&format!("output {}", output.display()));
        }
        Err(e) if e.is_cancelled() => {
            queue.mark_canceled(&job.id);
            logger.log_warning("Cancelled while running");
        }
        Err(e) => {
            logger.log_error(&e.to_string());
            queue.fail(&job.id, e.to_string());
        }
    }
}
