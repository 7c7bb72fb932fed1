//! Startup orchestration: open the catalogue, start the registry ingress and
//! the web server, then dispatch every persisted job.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use procman_api::AppState;
use procman_core::{serve_ingress, Registry, SupervisorOptions};
use procman_store::{JobStore, SqliteJobStore};
use tokio::sync::mpsc;
use tracing::info;

const DB_FILE: &str = "procman.db";

#[derive(Debug)]
pub struct DaemonRunner {
    port: u16,
    db_path: PathBuf,
    options: SupervisorOptions,
}

impl DaemonRunner {
    #[must_use]
    pub fn new(port: u16) -> Self {
        DaemonRunner {
            port,
            db_path: PathBuf::from(DB_FILE),
            options: SupervisorOptions::default(),
        }
    }

    #[must_use]
    pub fn with_db_path(mut self, path: PathBuf) -> Self {
        self.db_path = path;
        self
    }

    #[must_use]
    pub fn with_options(mut self, options: SupervisorOptions) -> Self {
        self.options = options;
        self
    }

    /// Runs the daemon. Only returns when the web server fails; there is no
    /// clean shutdown trigger in this release.
    pub async fn start(&self) -> anyhow::Result<()> {
        let store = SqliteJobStore::connect(&self.db_path)
            .await
            .with_context(|| format!("open catalogue {}", self.db_path.display()))?;
        store.migrate().await.context("apply catalogue schema")?;
        let store: Arc<dyn JobStore> = Arc::new(store);

        let registry = Registry::new();
        let (arrivals, arrivals_rx) = mpsc::channel(1);
        tokio::spawn(serve_ingress(
            registry.clone(),
            Arc::clone(&store),
            self.options.clone(),
            arrivals_rx,
        ));

        let state = AppState {
            store: Arc::clone(&store),
            registry,
            arrivals: arrivals.clone(),
        };
        let server = tokio::spawn(procman_api::serve(self.port, state));

        // Materialise a supervisor handle for every persisted job so any of
        // them can be started over REST; only reboot-scheduled jobs
        // auto-start.
        let records = store.list().await.context("enumerate persisted jobs")?;
        info!(jobs = records.len(), "dispatching persisted jobs");
        for record in records {
            if arrivals.send(record.descriptor()).await.is_err() {
                anyhow::bail!("job ingress terminated during startup");
            }
        }

        server
            .await
            .context("web server task")?
            .context("web server failed")?;
        Ok(())
    }
}
