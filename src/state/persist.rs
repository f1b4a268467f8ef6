//! State Persistence
//!
//! A single background worker writes the full store to the state file after
//! every mutation. Requests that arrive while a write is in flight collapse
//! into one follow-up write, and every write snapshots the store at write
//! time, so the last file written always reflects the latest state.

use crate::error::{Error, Result};
use crate::metrics::Metrics;
use crate::state::store::StateStore;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error};

/// Default state file, relative to the working directory
pub const DEFAULT_STATE_FILE: &str = "statefile.json";

// =============================================================================
// Persister Configuration
// =============================================================================

/// Configuration for state persistence
#[derive(Debug, Clone)]
pub struct PersistConfig {
    /// Path of the state file
    pub path: PathBuf,
}

impl Default for PersistConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_STATE_FILE),
        }
    }
}

// =============================================================================
// Persister
// =============================================================================

/// Best-effort, single-writer persistence of a [`StateStore`]
pub struct Persister {
    path: PathBuf,
    store: Arc<StateStore>,
    metrics: Metrics,
    /// Held for the duration of every file write
    write_lock: Mutex<()>,
    pending: Notify,
    stop: Notify,
}

impl Persister {
    /// Create a persister for `store`
    pub fn new(config: PersistConfig, store: Arc<StateStore>, metrics: Metrics) -> Arc<Self> {
        Arc::new(Self {
            path: config.path,
            store,
            metrics,
            write_lock: Mutex::new(()),
            pending: Notify::new(),
            stop: Notify::new(),
        })
    }

    /// Start the background write worker.
    ///
    /// The worker runs until [`Persister::stop`]; a write in progress is
    /// always finished before it exits.
    pub fn spawn(self: &Arc<Self>) -> JoinHandle<()> {
        let persister = self.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = persister.stop.notified() => break,
                    _ = persister.pending.notified() => {
                        // Failures are already logged and counted by flush
                        let _ = persister.flush().await;
                    }
                }
            }
            debug!(path = %persister.path.display(), "Persistence worker stopped");
        })
    }

    /// Ask the worker to exit once its current write, if any, completes
    pub fn stop(&self) {
        self.stop.notify_one();
    }

    /// Schedule a write without waiting for it
    pub fn persist_async(&self) {
        self.pending.notify_one();
    }

    /// Write the current state now, after any write already in flight
    pub async fn flush(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        match self.write_snapshot().await {
            Ok(bytes) => {
                self.metrics.persists.inc();
                debug!(path = %self.path.display(), bytes = bytes, "State persisted");
                Ok(())
            }
            Err(e) => {
                self.metrics.persist_failures.inc();
                error!(path = %self.path.display(), error = %e, "Failed to save state file");
                Err(Error::Persist {
                    path: self.path.clone(),
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Replace the state file atomically: write a sibling file, then rename
    async fn write_snapshot(&self) -> Result<usize> {
        let data = self.store.snapshot().to_vec()?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let tmp = self.temp_path();
        tokio::fs::write(&tmp, &data).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        Ok(data.len())
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| DEFAULT_STATE_FILE.into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}
