//! Supervisor registry and job ingress: one handle per job name, commands
//! routed by lookup-then-send.

use std::collections::HashMap;
use std::sync::Arc;

use procman_store::JobStore;
use procman_types::{JobDescriptor, JobState, LifecycleCommand, Verb};
use tokio::sync::{mpsc, RwLock};
use tracing::{error, info, warn};

use crate::error::{Error, Result};
use crate::state::StateCell;
use crate::supervisor::{JobSupervisor, SupervisorOptions};

/// Mailbox capacity. The closest tokio analogue of an unbuffered channel: a
/// sender parks until the supervisor has drained the slot.
const MAILBOX_CAPACITY: usize = 1;

/// Routing entry for one job: the descriptor as registered, the live state
/// cell, and the supervisor's mailbox.
#[derive(Debug, Clone)]
pub struct SupervisorHandle {
    descriptor: JobDescriptor,
    state: StateCell,
    mailbox: mpsc::Sender<LifecycleCommand>,
}

impl SupervisorHandle {
    #[must_use]
    pub fn descriptor(&self) -> &JobDescriptor {
        &self.descriptor
    }

    #[must_use]
    pub fn state(&self) -> JobState {
        self.state.get()
    }

    /// Appends a lifecycle command to the supervisor's mailbox, waiting for
    /// room if the supervisor is busy.
    ///
    /// # Errors
    ///
    /// Fails only when the supervisor has terminated.
    pub async fn send(&self, verb: Verb) -> Result<()> {
        self.mailbox
            .send(LifecycleCommand::new(self.descriptor.name.as_str(), verb))
            .await
            .map_err(|_| Error::MailboxClosed(self.descriptor.name.clone()))
    }
}

/// Shared `name -> handle` map. Cloning is cheap; all clones see one map.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    jobs: Arc<RwLock<HashMap<String, SupervisorHandle>>>,
}

impl Registry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lookup(&self, name: &str) -> Option<SupervisorHandle> {
        self.jobs.read().await.get(name).cloned()
    }

    /// Snapshot of every registered job's state.
    pub async fn states(&self) -> Vec<(String, JobState)> {
        self.jobs
            .read()
            .await
            .iter()
            .map(|(name, handle)| (name.clone(), handle.state()))
            .collect()
    }

    async fn insert(&self, handle: SupervisorHandle) {
        self.jobs
            .write()
            .await
            .insert(handle.descriptor.name.clone(), handle);
    }

    async fn remove(&self, name: &str) {
        self.jobs.write().await.remove(name);
    }
}

/// Consumes descriptors from `arrivals`, materialising one supervisor per
/// job name. Runs until the arrivals channel closes.
pub async fn serve_ingress(
    registry: Registry,
    store: Arc<dyn JobStore>,
    options: SupervisorOptions,
    mut arrivals: mpsc::Receiver<JobDescriptor>,
) {
    let options = Arc::new(options);
    info!("job ingress started");

    while let Some(descriptor) = arrivals.recv().await {
        let name = descriptor.name.clone();
        if name.is_empty() {
            warn!("descriptor with empty name, ignoring arrival");
            continue;
        }
        if registry.lookup(&name).await.is_some() {
            warn!(job = %name, "supervisor already registered, ignoring arrival");
            continue;
        }

        if let Err(err) = tokio::fs::create_dir_all(options.logs_root.join(&name)).await {
            error!(job = %name, error = %err, "failed to create log directory");
            continue;
        }

        let (mailbox, commands) = mpsc::channel(MAILBOX_CAPACITY);
        let state = StateCell::default();
        let handle = SupervisorHandle {
            descriptor: descriptor.clone(),
            state: state.clone(),
            mailbox,
        };
        registry.insert(handle.clone()).await;

        let supervisor = JobSupervisor::new(
            descriptor.clone(),
            state,
            Arc::clone(&store),
            Arc::clone(&options),
            commands,
        );
        let cleanup = registry.clone();
        let job = name.clone();
        tokio::spawn(async move {
            supervisor.run().await;
            cleanup.remove(&job).await;
        });

        // Reboot-scheduled jobs get a synthesized Start without blocking the
        // ingress loop on the new supervisor's readiness.
        if descriptor.autostarts_on_boot() {
            let autostart = handle.clone();
            tokio::spawn(async move {
                if let Err(err) = autostart.send(Verb::Start).await {
                    warn!(job = %autostart.descriptor.name, error = %err, "autostart failed");
                }
            });
        }

        info!(job = %name, "supervisor registered");
    }

    info!("job ingress finished");
}
