//! Daemon bootstrap: wire one supervisor per configured worker
//!
//! This module provides a `bootstrap` function that loads the workers
//! configuration, starts a supervisor for every worker, and spawns a
//! forwarder task that reflects lifecycle events into the log.

use crate::{HostdError, Result};
use arcturus_core::config::load_workers_from_toml_path;
use arcturus_core::supervisor::adapters::WorkerAdapter;
use arcturus_core::WorkerSupervisor;
use schema::{LaunchConfiguration, WorkerEvent};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Handle to the running daemon components
#[allow(missing_debug_implementations)]
pub struct BootstrapHandle {
    /// Launch configurations loaded from the workers file
    pub workers: Vec<LaunchConfiguration>,
    supervisors: HashMap<String, Arc<WorkerSupervisor>>,
    forwarders: Vec<JoinHandle<()>>,
}

impl BootstrapHandle {
    /// Look up the supervisor for a worker label
    pub fn supervisor(&self, label: &str) -> Option<&Arc<WorkerSupervisor>> {
        self.supervisors.get(label)
    }

    /// Number of supervised workers
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.supervisors.len()
    }

    /// Initiate shutdown: dispose every supervisor and stop the forwarders
    pub async fn shutdown(mut self) {
        for supervisor in self.supervisors.values() {
            supervisor.dispose();
        }
        for task in self.forwarders.drain(..) {
            task.abort();
        }
        info!("Bootstrap shutdown complete");
    }
}

/// Bootstrap the daemon components
///
/// Loads workers from `config_path` if provided, otherwise starts with no
/// supervisors. Every configured worker is started immediately; a worker
/// that fails to spawn is reported through the log and its supervisor ends
/// up in the crashed state without affecting the others.
pub async fn bootstrap(
    config_path: Option<PathBuf>,
    adapter: Arc<dyn WorkerAdapter>,
) -> Result<BootstrapHandle> {
    let workers: Vec<LaunchConfiguration> = if let Some(path) = config_path {
        let cfg = load_workers_from_toml_path(&path)
            .map_err(|e| HostdError::ConfigurationError(e.to_string()))?;
        cfg.workers
    } else {
        vec![]
    };

    let mut supervisors = HashMap::new();
    let mut forwarders = Vec::new();

    for config in workers.iter().cloned() {
        let label = config.worker_label.clone();
        let supervisor = Arc::new(WorkerSupervisor::new(config, adapter.clone()));

        // Subscribe before start so no event is missed
        let mut events = supervisor.subscribe();
        forwarders.push(tokio::spawn(async move {
            while let Ok(event) = events.recv().await {
                match event {
                    WorkerEvent::Ready { worker_label, .. } => {
                        info!("Worker '{}' is ready", worker_label);
                    }
                    WorkerEvent::Exited {
                        worker_label, exit, ..
                    } => {
                        if exit.is_crash() {
                            warn!(
                                "Worker '{}' exited (code: {:?}, signal: {:?})",
                                worker_label, exit.exit_code, exit.signal
                            );
                        } else {
                            info!("Worker '{}' exited cleanly", worker_label);
                        }
                        break;
                    }
                    WorkerEvent::Inbound { worker_label, .. } => {
                        debug!("Worker '{}' sent a message", worker_label);
                    }
                }
            }
        }));

        supervisor.start().await;
        supervisors.insert(label, supervisor);
    }

    if supervisors.is_empty() {
        warn!("No workers configured");
    } else {
        info!("Supervising {} worker(s)", supervisors.len());
    }

    Ok(BootstrapHandle {
        workers,
        supervisors,
        forwarders,
    })
}
