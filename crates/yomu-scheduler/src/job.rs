// SPDX-License-Identifier: GPL-3.0-or-later
use anyhow::Result;
use std::fmt;
use std::time::Duration;

/// Represents the execution context for a job
#[derive(Clone)]
pub struct JobContext {
    pub job_id: String,
    /// Zero for the first run, incremented for every retry.
    pub run_attempt: u32,
}

impl JobContext {
    pub fn new(job_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            run_attempt: 0,
        }
    }

    pub fn retry(&self) -> Self {
        Self {
            job_id: self.job_id.clone(),
            run_attempt: self.run_attempt + 1,
        }
    }
}

/// Job execution result with optional retry information
#[derive(Debug)]
pub enum JobResult {
    Success,
    Failure { error: String, retry: bool },
}

/// How the delay between retries grows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffPolicy {
    Linear,
    Exponential,
}

/// Longest delay any backoff may reach.
pub const MAX_BACKOFF: Duration = Duration::from_secs(5 * 60 * 60);

impl BackoffPolicy {
    /// Delay before retry number `retry` (1-based) given the base delay.
    pub fn delay(self, base: Duration, retry: u32) -> Duration {
        let delay = match self {
            Self::Linear => base.saturating_mul(retry.max(1)),
            Self::Exponential => {
                let factor = 1u32.checked_shl(retry.saturating_sub(1)).unwrap_or(u32::MAX);
                base.saturating_mul(factor)
            }
        };
        delay.min(MAX_BACKOFF)
    }
}

/// Core trait for all background jobs
#[async_trait::async_trait]
pub trait Job: Send + Sync {
    /// Unique identifier for this job type
    fn job_type(&self) -> &'static str;

    /// Human-readable job name
    fn name(&self) -> String;

    /// Execute the job with given context
    async fn execute(&self, ctx: JobContext) -> Result<JobResult>;

    /// Whether this job can be retried on failure
    fn is_retriable(&self) -> bool {
        true
    }

    /// Maximum number of retry attempts
    fn max_retries(&self) -> u32 {
        3
    }

    /// Base delay in seconds between retries
    fn retry_delay_seconds(&self) -> u64 {
        60
    }

    fn backoff_policy(&self) -> BackoffPolicy {
        BackoffPolicy::Linear
    }
}

impl fmt::Debug for dyn Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("type", &self.job_type())
            .field("name", &self.name())
            .finish()
    }
}
