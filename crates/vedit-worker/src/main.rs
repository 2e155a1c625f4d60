//! Transcode worker binary.
//!
//! Runs two queue/executor instances over one shared resource monitor and
//! pipeline: edit jobs and upload normalization jobs.

use std::sync::Arc;

use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vedit_media::{PipelineConfig, ResourceMonitor, SystemRunner, TranscodePipeline};
use vedit_queue::{JobQueue, QueueConfig};
use vedit_worker::{JobExecutor, WorkerConfig};

#[tokio::main]
async fn main() {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing with colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env()
        .add_directive("vedit=info".parse().unwrap());

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }

    info!("Starting vedit-worker");

    let monitor = Arc::new(ResourceMonitor::from_system_default());
    let runner = Arc::new(SystemRunner::new(Arc::clone(&monitor)));
    let pipeline = Arc::new(TranscodePipeline::new(runner, PipelineConfig::from_env()));

    // Edit jobs: short TTL, tight timeout
    let edit_queue = Arc::new(JobQueue::new(QueueConfig::from_env("EDIT_QUEUE")));
    let edit_config = WorkerConfig::from_env("EDIT_WORKER");
    info!(config = ?edit_config, "Edit worker config");
    let edit_executor = Arc::new(JobExecutor::new(
        edit_config,
        Arc::clone(&edit_queue),
        Arc::clone(&pipeline),
        Arc::clone(&monitor),
    ));

    // Upload normalization: same machinery, longer budgets
    let upload_queue = Arc::new(JobQueue::new(QueueConfig::from_env_with(
        "UPLOAD_QUEUE",
        QueueConfig::default().with_ttl(chrono::Duration::hours(2)),
    )));
    let upload_config = WorkerConfig::from_env_with("UPLOAD_WORKER", WorkerConfig::upload_defaults());
    info!(config = ?upload_config, "Upload worker config");
    let upload_executor = Arc::new(JobExecutor::new(
        upload_config,
        Arc::clone(&upload_queue),
        Arc::clone(&pipeline),
        Arc::clone(&monitor),
    ));

    let edit_run = {
        let executor = Arc::clone(&edit_executor);
        tokio::spawn(async move { executor.run().await })
    };
    let upload_run = {
        let executor = Arc::clone(&upload_executor);
        tokio::spawn(async move { executor.run().await })
    };

    tokio::signal::ctrl_c().await.ok();
    info!("Received shutdown signal");

    edit_executor.shutdown();
    upload_executor.shutdown();
    edit_run.await.ok();
    upload_run.await.ok();

    info!("Worker shutdown complete");
}
