//! The admission-controlled queue and job registry.

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use tokio::sync::{watch, Notify};
use tracing::{debug, info, warn};

use vedit_models::{EncodeMode, Job, JobId, JobStatus, JobSubmission, RamDecision};

use crate::config::QueueConfig;

/// Outcome of an admission attempt.
///
/// Rejection never blocks the caller; a full queue is reported immediately.
#[derive(Debug, Clone)]
pub enum Admission {
    /// The job was accepted and is retrievable via its id
    Accepted(Job),
    /// The queue is at capacity; retry later
    QueueFull,
}

impl Admission {
    /// The accepted job, if any.
    pub fn job(&self) -> Option<&Job> {
        match self {
            Admission::Accepted(job) => Some(job),
            Admission::QueueFull => None,
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, Admission::Accepted(_))
    }
}

/// A job claimed by a worker, with its cancellation signal.
pub struct ClaimedJob {
    /// Snapshot of the job at claim time (already `Running`)
    pub job: Job,
    /// Receiver flipping to `true` when the job is cancelled
    pub cancel: watch::Receiver<bool>,
}

struct Entry {
    job: Job,
    cancel_tx: watch::Sender<bool>,
}

struct Inner {
    pending: VecDeque<JobId>,
    jobs: HashMap<String, Entry>,
}

/// In-memory job queue: bounded FIFO admission plus the id -> job registry.
///
/// `enqueue`, `get`, and `cancel` are synchronous and never block on I/O;
/// workers claim jobs through [`JobQueue::next_job`].
pub struct JobQueue {
    config: QueueConfig,
    inner: Mutex<Inner>,
    notify: Notify,
}

impl JobQueue {
    /// Create an empty queue.
    pub fn new(config: QueueConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner {
                pending: VecDeque::new(),
                jobs: HashMap::new(),
            }),
            notify: Notify::new(),
        }
    }

    /// Admit new work or reject it when the queue is full.
    ///
    /// No validation of the submission happens here; callers validate before
    /// submitting.
    pub fn enqueue(&self, submission: JobSubmission) -> Admission {
        let mut inner = self.lock();

        if inner.pending.len() >= self.config.capacity {
            debug!(
                capacity = self.config.capacity,
                "Queue full, rejecting submission"
            );
            return Admission::QueueFull;
        }

        let job = Job::new(submission, self.config.ttl);
        let (cancel_tx, _) = watch::channel(false);

        info!(
            job_id = %job.id,
            correlation_id = %job.correlation_id,
            ttl_at = %job.ttl_at,
            "Job accepted"
        );

        inner.pending.push_back(job.id.clone());
        inner.jobs.insert(
            job.id.as_str().to_string(),
            Entry {
                job: job.clone(),
                cancel_tx,
            },
        );
        drop(inner);

        self.notify.notify_one();
        Admission::Accepted(job)
    }

    /// Look up a job snapshot by id.
    ///
    /// A queued job past its TTL is lazily marked `Expired` before the
    /// snapshot is returned, so an expired job is never reported as
    /// `Queued` again. Running jobs are never expired here.
    pub fn get(&self, id: &JobId) -> Option<Job> {
        let mut inner = self.lock();
        let now = Utc::now();
        let entry = inner.jobs.get_mut(id.as_str())?;

        if entry.job.status == JobStatus::Queued && entry.job.is_expired_at(now) {
            entry.job.expire();
            inner.pending.retain(|p| p != id);
        }

        inner.jobs.get(id.as_str()).map(|e| e.job.clone())
    }

    /// Cancel a job.
    ///
    /// Queued jobs are removed from the FIFO and marked `Canceled` without
    /// ever starting. Running jobs get a kill signal; the worker marks them
    /// `Canceled` once the encoder has actually exited. Terminal or unknown
    /// jobs return `false`.
    pub fn cancel(&self, id: &JobId) -> bool {
        let mut inner = self.lock();
        let Some(entry) = inner.jobs.get_mut(id.as_str()) else {
            return false;
        };

        match entry.job.status {
            JobStatus::Queued => {
                entry.job.cancel();
                inner.pending.retain(|p| p != id);
                info!(job_id = %id, "Cancelled queued job");
                true
            }
            JobStatus::Running => {
                entry.cancel_tx.send(true).ok();
                info!(job_id = %id, "Cancellation signalled to running job");
                true
            }
            _ => false,
        }
    }

    /// Claim the next queued job, FIFO, waiting until one is available.
    ///
    /// The claimed job is transitioned to `Running` before being returned.
    pub async fn next_job(&self) -> ClaimedJob {
        loop {
            let notified = self.notify.notified();

            if let Some(claimed) = self.try_claim() {
                return claimed;
            }

            notified.await;
        }
    }

    /// Claim the next queued job if one is ready right now.
    pub fn try_claim(&self) -> Option<ClaimedJob> {
        let mut inner = self.lock();
        let now = Utc::now();

        while let Some(id) = inner.pending.pop_front() {
            let Some(entry) = inner.jobs.get_mut(id.as_str()) else {
                continue;
            };
            if entry.job.status != JobStatus::Queued {
                // Cancelled or expired while waiting
                continue;
            }
            if entry.job.is_expired_at(now) {
                entry.job.expire();
                debug!(job_id = %id, "Skipping expired queued job");
                continue;
            }

            entry.job.start();
            return Some(ClaimedJob {
                job: entry.job.clone(),
                cancel: entry.cancel_tx.subscribe(),
            });
        }

        None
    }

    /// Record the mode resolution made for a claimed job.
    pub fn record_resolution(&self, id: &JobId, mode: EncodeMode, decision: RamDecision) {
        if let Some(entry) = self.lock().jobs.get_mut(id.as_str()) {
            entry.job.resolve_mode(mode, decision);
        }
    }

    /// Update a running job's progress; never moves backwards.
    pub fn set_progress(&self, id: &JobId, progress: u8) {
        if let Some(entry) = self.lock().jobs.get_mut(id.as_str()) {
            entry.job.set_progress(progress);
        }
    }

    /// Mark a running job `Succeeded`.
    pub fn complete(&self, id: &JobId, output: PathBuf) {
        if let Some(entry) = self.lock().jobs.get_mut(id.as_str()) {
            entry.job.complete(output);
            info!(job_id = %id, "Job succeeded");
        }
    }

    /// Mark a running job `Failed`.
    pub fn fail(&self, id: &JobId, error: impl Into<String>) {
        if let Some(entry) = self.lock().jobs.get_mut(id.as_str()) {
            let error = error.into();
            warn!(job_id = %id, error = %error, "Job failed");
            entry.job.fail(error);
        }
    }

    /// Mark a job `Canceled` after its process has exited.
    pub fn mark_canceled(&self, id: &JobId) {
        if let Some(entry) = self.lock().jobs.get_mut(id.as_str()) {
            entry.job.cancel();
            info!(job_id = %id, "Job cancelled");
        }
    }

    /// Evict a job record outright.
    ///
    /// Running jobs are not removable; cancel them first. Returns whether a
    /// record was removed.
    pub fn remove(&self, id: &JobId) -> bool {
        let mut inner = self.lock();
        match inner.jobs.get(id.as_str()) {
            Some(e) if e.job.status == JobStatus::Running => false,
            Some(_) => {
                inner.jobs.remove(id.as_str());
                inner.pending.retain(|p| p != id);
                true
            }
            None => false,
        }
    }

    /// Evict expired records.
    ///
    /// Queued jobs past their TTL are marked `Expired`; expired and
    /// terminal jobs past their TTL are removed. Running jobs are never
    /// touched. Returns the number of evicted records.
    pub fn sweep_expired(&self) -> usize {
        let mut inner = self.lock();
        let now = Utc::now();

        let expired: Vec<String> = inner
            .jobs
            .iter()
            .filter(|(_, e)| e.job.status != JobStatus::Running && e.job.is_expired_at(now))
            .map(|(k, _)| k.clone())
            .collect();

        for key in &expired {
            inner.jobs.remove(key);
        }
        inner
            .pending
            .retain(|id| !expired.iter().any(|k| k.as_str() == id.as_str()));

        if !expired.is_empty() {
            debug!(evicted = expired.len(), "TTL sweep evicted job records");
        }
        expired.len()
    }

    /// Spawn a periodic TTL sweeper.
    pub fn spawn_sweeper(
        self: std::sync::Arc<Self>,
        interval: std::time::Duration,
    ) -> tokio::task::JoinHandle<()> {
        let queue = self;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                queue.sweep_expired();
            }
        })
    }

    /// Number of queued (unclaimed) jobs.
    pub fn pending_len(&self) -> usize {
        self.lock().pending.len()
    }

    /// Number of registered job records.
    pub fn len(&self) -> usize {
        self.lock().jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
