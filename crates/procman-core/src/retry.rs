//! Retry-with-backoff wrapper around the runner, used for continuous jobs.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use procman_store::{JobStore, StoreError};
use procman_types::{JobDescriptor, JobState};
use rand::Rng;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::Result;
use crate::runner::{self, RunOutcome};
use crate::state::StateCell;

/// Exponential backoff schedule for continuous-job restarts. Total elapsed
/// time is unbounded; only the per-interval delay is capped.
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    pub initial: Duration,
    pub multiplier: f64,
    /// Randomization factor: each delay is drawn uniformly from
    /// `[base * (1 - r), base * (1 + r)]`.
    pub randomization: f64,
    pub max: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(500),
            multiplier: 1.5,
            randomization: 0.5,
            max: Duration::from_secs(60),
        }
    }
}

impl Backoff {
    /// Next unjittered interval after `prev`.
    #[must_use]
    pub fn next(&self, prev: Option<Duration>) -> Duration {
        match prev {
            None => self.initial.min(self.max),
            Some(d) => d.mul_f64(self.multiplier).min(self.max),
        }
    }

    /// Randomizes `base` within the configured spread.
    #[must_use]
    pub fn jitter(&self, base: Duration) -> Duration {
        if self.randomization <= 0.0 || base.is_zero() {
            return base;
        }
        let low = base.as_secs_f64() * (1.0 - self.randomization);
        let high = base.as_secs_f64() * (1.0 + self.randomization);
        Duration::from_secs_f64(rand::rng().random_range(low..=high).max(0.0))
    }
}

/// Why a driven run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunEnd {
    /// One-time attempt ran to completion (any exit status).
    Completed,
    /// The cancel token fired.
    Cancelled,
    /// The descriptor disappeared from the store.
    Deleted,
}

/// Runs the descriptor's command over and over until cancelled or the
/// descriptor is deleted. Natural exit with any status and start failure are
/// both retried; between attempts the job state is `Retrying` and the driver
/// sleeps the next backoff delay with cancellation preempt.
pub async fn drive_continuous(
    descriptor: &JobDescriptor,
    store: &Arc<dyn JobStore>,
    logs_root: &Path,
    state: &StateCell,
    cancel: &CancellationToken,
    policy: &Backoff,
) -> Result<RunEnd> {
    let mut interval: Option<Duration> = None;

    loop {
        if cancel.is_cancelled() {
            return Ok(RunEnd::Cancelled);
        }

        match store.find_by_name(&descriptor.name).await {
            Ok(_) => {}
            Err(StoreError::NotFound(_)) => {
                info!(job = %descriptor.name, "descriptor deleted, ending retries");
                return Ok(RunEnd::Deleted);
            }
            Err(err) => return Err(err.into()),
        }

        let log_path = runner::attempt_log_path(logs_root, &descriptor.name);
        match runner::run(descriptor, &log_path, state, cancel).await? {
            RunOutcome::Cancelled => return Ok(RunEnd::Cancelled),
            RunOutcome::Exited(_) | RunOutcome::StartFailed => {
                state.set(JobState::Retrying);
                let base = policy.next(interval);
                interval = Some(base);
                let delay = policy.jitter(base);
                debug!(
                    job = %descriptor.name,
                    delay_ms = delay.as_millis() as u64,
                    "backing off before retry"
                );
                tokio::select! {
                    () = time::sleep(delay) => {}
                    () = cancel.cancelled() => return Ok(RunEnd::Cancelled),
                }
            }
        }
    }
}
