//! Per-job supervisor: owns one job's state and sequences its lifecycle
//! commands, holding the invariant of at most one live runner per job.

use std::path::PathBuf;
use std::sync::Arc;

use procman_store::{JobStore, StoreError};
use procman_types::{JobDescriptor, JobState, JobType, LifecycleCommand, Verb};
use tokio::sync::mpsc::Receiver;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::cpu;
use crate::retry::{self, Backoff, RunEnd};
use crate::runner::{self, RunOutcome};
use crate::state::StateCell;

/// CPU threshold (percent) a new runner must wait below before launching.
pub const ADMISSION_CPU_THRESHOLD: f64 = 30.0;

/// Knobs shared by every supervisor the registry creates.
#[derive(Debug, Clone)]
pub struct SupervisorOptions {
    /// Mean-CPU admission threshold; `None` disables the gate.
    pub admission_threshold: Option<f64>,
    pub backoff: Backoff,
    /// Root of the per-job log tree.
    pub logs_root: PathBuf,
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self {
            admission_threshold: Some(ADMISSION_CPU_THRESHOLD),
            backoff: Backoff::default(),
            logs_root: PathBuf::from("logs"),
        }
    }
}

enum Flow {
    Continue,
    Exit,
}

pub(crate) struct JobSupervisor {
    descriptor: JobDescriptor,
    state: StateCell,
    store: Arc<dyn JobStore>,
    options: Arc<SupervisorOptions>,
    commands: Receiver<LifecycleCommand>,
    cancel: Option<CancellationToken>,
    attempt: Option<JoinHandle<()>>,
}

impl JobSupervisor {
    pub(crate) fn new(
        descriptor: JobDescriptor,
        state: StateCell,
        store: Arc<dyn JobStore>,
        options: Arc<SupervisorOptions>,
        commands: Receiver<LifecycleCommand>,
    ) -> Self {
        Self {
            descriptor,
            state,
            store,
            options,
            commands,
            cancel: None,
            attempt: None,
        }
    }

    /// Command loop. Returns when the mailbox closes or the descriptor turns
    /// out to have been removed from the store.
    pub(crate) async fn run(mut self) {
        info!(job = %self.descriptor.name, "supervisor started");

        while let Some(command) = self.commands.recv().await {
            if command.job_name != self.descriptor.name {
                warn!(
                    job = %self.descriptor.name,
                    target = %command.job_name,
                    "command addressed to another job, ignoring"
                );
                continue;
            }

            let flow = match command.verb {
                Verb::Start => self.handle_start().await,
                Verb::Stop => {
                    self.handle_stop().await;
                    Flow::Continue
                }
                Verb::Restart => self.handle_restart().await,
            };
            if matches!(flow, Flow::Exit) {
                break;
            }
        }

        self.shutdown().await;
        info!(job = %self.descriptor.name, "supervisor finished");
    }

    /// A runner attempt is live until its task has returned. Processing the
    /// next command only after joining the old attempt is what keeps the
    /// one-runner invariant.
    fn runner_live(&self) -> bool {
        self.attempt
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    async fn handle_start(&mut self) -> Flow {
        if self.runner_live() {
            info!(job = %self.descriptor.name, "already running, ignoring start");
            return Flow::Continue;
        }
        self.reap().await;
        self.state.set(JobState::Starting);

        // Re-read the descriptor so catalogue edits take effect on this start.
        match self.store.find_by_name(&self.descriptor.name).await {
            Ok(record) => self.descriptor = record.descriptor(),
            Err(StoreError::NotFound(_)) => {
                info!(job = %self.descriptor.name, "descriptor no longer in store");
                self.state.set(JobState::Exited);
                return Flow::Exit;
            }
            Err(err) => {
                error!(job = %self.descriptor.name, error = %err, "failed to reload descriptor");
                self.state.set(JobState::Error);
                return Flow::Continue;
            }
        }

        let cancel = CancellationToken::new();
        let attempt = tokio::spawn(run_attempt(
            self.descriptor.clone(),
            Arc::clone(&self.store),
            Arc::clone(&self.options),
            self.state.clone(),
            cancel.clone(),
        ));
        self.cancel = Some(cancel);
        self.attempt = Some(attempt);
        Flow::Continue
    }

    async fn handle_stop(&mut self) {
        if !self.runner_live() {
            self.reap().await;
            self.cancel = None;
            self.state.set(JobState::Stopped);
            return;
        }

        self.state.set(JobState::Stopping);
        if let Some(cancel) = self.cancel.take() {
            cancel.cancel();
        }
        self.reap().await;
        self.state.set(JobState::Stopped);
    }

    async fn handle_restart(&mut self) -> Flow {
        if self.runner_live() {
            self.state.set(JobState::Stopping);
            if let Some(cancel) = self.cancel.take() {
                cancel.cancel();
            }
            self.reap().await;
        }
        self.handle_start().await
    }

    /// Joins the current attempt task, if any.
    async fn reap(&mut self) {
        if let Some(handle) = self.attempt.take() {
            if let Err(err) = handle.await {
                error!(job = %self.descriptor.name, error = %err, "runner task panicked");
            }
        }
    }

    /// Implicit Stop performed when the mailbox closes. Leaves the state
    /// untouched unless a runner actually had to be cancelled.
    async fn shutdown(&mut self) {
        let live = self.runner_live();
        if live {
            self.state.set(JobState::Stopping);
        }
        if let Some(cancel) = self.cancel.take() {
            cancel.cancel();
        }
        self.reap().await;
        if live {
            self.state.set(JobState::Stopped);
        }
    }
}

/// One Start-to-termination interval: admission gate, then the runner
/// (wrapped by the retry driver for continuous jobs). Sets the job's final
/// state when it returns.
async fn run_attempt(
    descriptor: JobDescriptor,
    store: Arc<dyn JobStore>,
    options: Arc<SupervisorOptions>,
    state: StateCell,
    cancel: CancellationToken,
) {
    if let Some(threshold) = options.admission_threshold {
        let admitted = tokio::select! {
            result = cpu::wait_until_average_below(threshold) => result,
            () = cancel.cancelled() => {
                state.set(JobState::Stopped);
                return;
            }
        };
        if let Err(err) = admitted {
            error!(job = %descriptor.name, error = %err, "cpu admission gate failed");
            state.set(JobState::Error);
            return;
        }
    }

    let end = match descriptor.job_type {
        JobType::Continuous => {
            retry::drive_continuous(
                &descriptor,
                &store,
                &options.logs_root,
                &state,
                &cancel,
                &options.backoff,
            )
            .await
        }
        JobType::OneTime => {
            let log_path = runner::attempt_log_path(&options.logs_root, &descriptor.name);
            runner::run(&descriptor, &log_path, &state, &cancel)
                .await
                .map(|outcome| match outcome {
                    RunOutcome::Cancelled => RunEnd::Cancelled,
                    RunOutcome::Exited(_) | RunOutcome::StartFailed => RunEnd::Completed,
                })
        }
    };

    match end {
        Ok(RunEnd::Deleted) => state.set(JobState::Exited),
        Ok(RunEnd::Completed | RunEnd::Cancelled) => state.set(JobState::Stopped),
        Err(err) => {
            error!(job = %descriptor.name, error = %err, "runner failed");
            state.set(JobState::Error);
        }
    }
}
