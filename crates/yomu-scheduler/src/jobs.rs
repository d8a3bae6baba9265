// SPDX-License-Identifier: GPL-3.0-or-later
use crate::job::{BackoffPolicy, Job, JobContext, JobResult};
use anyhow::Result;
use tracing::{info, warn};
use yomu_application::DelayedTrackingSync;
use yomu_domain::MediaKind;

/// Unique job id for the delayed tracking flush of one library side.
pub fn delayed_tracking_job_id(kind: MediaKind) -> String {
    format!("delayed-tracking-update-{kind}")
}

/// Replays tracker updates that were parked while a service was unreachable.
pub struct DelayedTrackingUpdateJob {
    kind: MediaKind,
    sync: DelayedTrackingSync,
    max_attempts: u32,
    backoff_seconds: u64,
}

impl DelayedTrackingUpdateJob {
    pub fn new(
        kind: MediaKind,
        sync: DelayedTrackingSync,
        max_attempts: u32,
        backoff_seconds: u64,
    ) -> Self {
        Self {
            kind,
            sync,
            max_attempts,
            backoff_seconds,
        }
    }
}

#[async_trait::async_trait]
impl Job for DelayedTrackingUpdateJob {
    fn job_type(&self) -> &'static str {
        "delayed_tracking_update"
    }

    fn name(&self) -> String {
        format!("Delayed {} tracking update", self.kind)
    }

    async fn execute(&self, ctx: JobContext) -> Result<JobResult> {
        if ctx.run_attempt > self.max_attempts {
            warn!(target: "jobs", job_id = %ctx.job_id, run_attempt = ctx.run_attempt, "giving up on delayed tracking updates");
            return Ok(JobResult::Failure {
                error: "too many attempts".to_string(),
                retry: false,
            });
        }

        info!(target: "jobs", job_id = %ctx.job_id, kind = %self.kind, "flushing delayed tracking updates");
        let report = self.sync.run().await?;

        if report.remaining == 0 {
            Ok(JobResult::Success)
        } else {
            Ok(JobResult::Failure {
                error: format!("{} delayed tracking updates remaining", report.remaining),
                retry: true,
            })
        }
    }

    /// One extra run past `max_attempts` so the job itself reports the give-up.
    fn max_retries(&self) -> u32 {
        self.max_attempts + 1
    }

    fn retry_delay_seconds(&self) -> u64 {
        self.backoff_seconds
    }

    fn backoff_policy(&self) -> BackoffPolicy {
        BackoffPolicy::Exponential
    }
}
