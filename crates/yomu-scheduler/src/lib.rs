// SPDX-License-Identifier: GPL-3.0-or-later
pub mod job;
pub mod jobs;
pub mod registry;

use anyhow::Result;
use registry::JobRegistry;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;
use yomu_application::DelayedTrackingSync;
use yomu_config::AppConfig;
use yomu_domain::MediaKind;

use jobs::{delayed_tracking_job_id, DelayedTrackingUpdateJob};

/// How often the daemon flushes parked tracker updates on its own.
const DELAYED_TRACKING_INTERVAL_SECS: u64 = 60 * 60;

pub struct Scheduler {
    config: AppConfig,
    registry: Arc<JobRegistry>,
}

impl Scheduler {
    pub fn new(config: AppConfig) -> Self {
        let registry = Arc::new(JobRegistry::new(config.scheduler.max_concurrent_jobs));
        Self { config, registry }
    }

    pub fn registry(&self) -> Arc<JobRegistry> {
        self.registry.clone()
    }

    fn delayed_tracking_job(
        &self,
        kind: MediaKind,
        sync: DelayedTrackingSync,
    ) -> DelayedTrackingUpdateJob {
        DelayedTrackingUpdateJob::new(
            kind,
            sync,
            self.config.scheduler.delayed_tracking_max_attempts,
            self.config.scheduler.delayed_tracking_backoff_seconds,
        )
    }

    /// Register all periodic background jobs. The hourly flush shares its id
    /// with [`Self::enqueue_delayed_tracking`], so a tick is skipped while a
    /// flush of the same side is pending.
    pub async fn register_jobs(&self, delayed_tracking: Vec<(MediaKind, DelayedTrackingSync)>) {
        info!(target: "scheduler", "registering background jobs");

        for (kind, sync) in delayed_tracking {
            self.registry
                .register(
                    delayed_tracking_job_id(kind),
                    self.delayed_tracking_job(kind, sync),
                    Schedule::Interval(DELAYED_TRACKING_INTERVAL_SECS),
                )
                .await;
        }

        info!(target: "scheduler", "all jobs registered");
    }

    /// Flush parked tracker updates now, replacing any pending flush of the same side.
    pub async fn enqueue_delayed_tracking(
        &self,
        kind: MediaKind,
        sync: DelayedTrackingSync,
    ) -> EnqueueOutcome {
        let job = Arc::new(self.delayed_tracking_job(kind, sync));
        self.registry
            .enqueue_unique(delayed_tracking_job_id(kind), job, ExistingJobPolicy::Replace)
            .await
    }

    /// Start the scheduler and return a handle to the background task
    pub fn start(self) -> JoinHandle<Result<()>> {
        let registry = self.registry.clone();
        tokio::spawn(async move {
            registry.start().await;
            Ok(())
        })
    }
}

// Re-export key types for convenience
pub use job::{BackoffPolicy, Job, JobContext, JobResult};
pub use registry::{EnqueueOutcome, ExistingJobPolicy, JobOutcome, Schedule};
