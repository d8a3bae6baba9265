// SPDX-License-Identifier: GPL-3.0-or-later
use crate::job::{Job, JobContext, JobResult};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration};
use tracing::{error, info, warn};

/// Job schedule configuration
#[derive(Debug, Clone)]
pub enum Schedule {
    /// Run at fixed intervals (in seconds). A tick is skipped while the
    /// previous run of the same job id, retries included, is still pending.
    Interval(u64),
}

/// What to do when a unique job is enqueued while a run of it is pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExistingJobPolicy {
    /// Abort the pending run and start over.
    Replace,
    /// Leave the pending run alone and drop the new request.
    Keep,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Enqueued,
    Replaced,
    Kept,
}

/// Final state of a job run, retries included.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Succeeded,
    Failed,
    Cancelled,
}

/// Registered job with its schedule
struct RegisteredJob {
    job: Arc<dyn Job>,
    schedule: Schedule,
}

/// Job registry that manages and executes scheduled and on-demand jobs
pub struct JobRegistry {
    jobs: Arc<RwLock<HashMap<String, RegisteredJob>>>,
    unique: Mutex<HashMap<String, JoinHandle<JobOutcome>>>,
    semaphore: Arc<Semaphore>,
    max_concurrent: usize,
}

impl JobRegistry {
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            jobs: Arc::new(RwLock::new(HashMap::new())),
            unique: Mutex::new(HashMap::new()),
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
        }
    }

    /// Register a job with its schedule
    pub async fn register(
        &self,
        job_id: impl Into<String>,
        job: impl Job + 'static,
        schedule: Schedule,
    ) {
        let job_id = job_id.into();
        let registered = RegisteredJob {
            job: Arc::new(job) as Arc<dyn Job>,
            schedule,
        };

        let mut jobs = self.jobs.write().await;
        info!(target: "registry", %job_id, job_type = registered.job.job_type(), "registering job");
        jobs.insert(job_id, registered);
    }

    /// Start the scheduled jobs
    pub async fn start(self: Arc<Self>) {
        info!(target: "registry", max_concurrent = self.max_concurrent, "starting job registry");

        let jobs = self.jobs.read().await;

        for (job_id, registered) in jobs.iter() {
            match &registered.schedule {
                Schedule::Interval(seconds) => {
                    let registry = self.clone();
                    let job_id = job_id.clone();
                    let job = registered.job.clone();
                    let interval_duration = Duration::from_secs(*seconds);

                    tokio::spawn(async move {
                        let mut ticker = interval(interval_duration);
                        loop {
                            ticker.tick().await;
                            registry
                                .enqueue_unique(
                                    job_id.clone(),
                                    job.clone(),
                                    ExistingJobPolicy::Keep,
                                )
                                .await;
                        }
                    });
                }
            }
        }

        info!(target: "registry", "job registry started with {} jobs", jobs.len());
    }

    /// Run `job` now under a unique id.
    pub async fn enqueue_unique(
        &self,
        job_id: impl Into<String>,
        job: Arc<dyn Job>,
        policy: ExistingJobPolicy,
    ) -> EnqueueOutcome {
        let job_id = job_id.into();
        let mut unique = self.unique.lock().await;

        let outcome = match unique.get(&job_id) {
            Some(pending) if !pending.is_finished() => match policy {
                ExistingJobPolicy::Keep => {
                    info!(target: "registry", %job_id, "job already pending, keeping it");
                    return EnqueueOutcome::Kept;
                }
                ExistingJobPolicy::Replace => {
                    warn!(target: "registry", %job_id, "replacing pending job run");
                    pending.abort();
                    EnqueueOutcome::Replaced
                }
            },
            _ => EnqueueOutcome::Enqueued,
        };

        let semaphore = self.semaphore.clone();
        let run_id = job_id.clone();
        let handle = tokio::spawn(async move {
            match semaphore.acquire_owned().await {
                Ok(_permit) => Self::execute_job(run_id, job).await,
                Err(_) => JobOutcome::Cancelled,
            }
        });

        info!(target: "registry", %job_id, ?outcome, "enqueued unique job");
        unique.insert(job_id, handle);
        outcome
    }

    /// Wait for the latest run of a unique job. `None` if nothing was enqueued.
    pub async fn join(&self, job_id: &str) -> Option<JobOutcome> {
        let handle = self.unique.lock().await.remove(job_id)?;
        match handle.await {
            Ok(outcome) => Some(outcome),
            Err(err) if err.is_cancelled() => Some(JobOutcome::Cancelled),
            Err(err) => {
                error!(target: "registry", %job_id, error = %err, "job task panicked");
                Some(JobOutcome::Failed)
            }
        }
    }

    /// Execute a single job with retry logic
    pub async fn execute_job(job_id: String, job: Arc<dyn Job>) -> JobOutcome {
        let mut ctx = JobContext::new(&job_id);
        let mut attempts = 0;
        let max_attempts = if job.is_retriable() {
            job.max_retries() + 1
        } else {
            1
        };
        let base_delay = Duration::from_secs(job.retry_delay_seconds());

        loop {
            attempts += 1;
            info!(
                target: "registry",
                job_id = %job_id,
                job_type = job.job_type(),
                attempt = attempts,
                max_attempts,
                "executing job"
            );

            let retry = match job.execute(ctx.clone()).await {
                Ok(JobResult::Success) => {
                    info!(
                        target: "registry",
                        job_id = %job_id,
                        job_type = job.job_type(),
                        attempts,
                        "job completed successfully"
                    );
                    return JobOutcome::Succeeded;
                }
                Ok(JobResult::Failure { error, retry }) => {
                    error!(
                        target: "registry",
                        job_id = %job_id,
                        job_type = job.job_type(),
                        attempts,
                        %error,
                        retry,
                        "job failed"
                    );
                    retry
                }
                Err(err) => {
                    error!(
                        target: "registry",
                        job_id = %job_id,
                        job_type = job.job_type(),
                        attempts,
                        error = %err,
                        "job execution error"
                    );
                    job.is_retriable()
                }
            };

            if !retry || attempts >= max_attempts {
                error!(
                    target: "registry",
                    job_id = %job_id,
                    attempts,
                    "job gave up"
                );
                return JobOutcome::Failed;
            }

            let delay = job.backoff_policy().delay(base_delay, attempts);
            warn!(
                target: "registry",
                job_id = %job_id,
                ?delay,
                "retrying job after delay"
            );
            tokio::time::sleep(delay).await;
            ctx = ctx.retry();
        }
    }
}
