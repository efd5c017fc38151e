//! Bounded access to the record store.
//!
//! Store implementations block, so every round-trip runs on tokio's blocking
//! pool and is raced against the configured timeout. Reads that time out are
//! simply reported as [`Error::Transient`]. Mutations also race a [`Commit`]
//! gate: a timeout that wins the gate guarantees the write never lands, and a
//! store that already passed its commit point is awaited so the caller sees
//! what actually happened.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinError;
use tracing::warn;

use crate::error::{Error, Result};
use crate::models::Incident;
use crate::storage::{Commit, RecordStore};

/// Default bound on one store round-trip.
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(2);

/// Shared, timeout-bounded handle on a [`RecordStore`].
#[derive(Clone)]
pub struct Records {
    store: Arc<dyn RecordStore>,
    timeout: Duration,
}

fn joined<T>(op: &'static str, outcome: std::result::Result<Result<T>, JoinError>) -> Result<T> {
    outcome.unwrap_or_else(|join_err| Err(Error::Transient(format!("{op} aborted: {join_err}"))))
}

impl Records {
    pub fn new(store: Arc<dyn RecordStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn timed_out(&self, op: &'static str) -> Error {
        warn!(op, timeout_ms = self.timeout.as_millis() as u64, "record store timed out");
        Error::Transient(format!("{op} timed out after {}ms", self.timeout.as_millis()))
    }

    /// Run one read-only store operation off the async executor.
    pub async fn run<T, F>(&self, op: &'static str, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn RecordStore) -> Result<T> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        let task = tokio::task::spawn_blocking(move || f(store.as_ref()));
        match tokio::time::timeout(self.timeout, task).await {
            Ok(result) => joined(op, result),
            Err(_) => Err(self.timed_out(op)),
        }
    }

    /// Run one mutating store operation. `Transient` means nothing was written.
    pub async fn mutate<T, F>(&self, op: &'static str, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn RecordStore, &Commit) -> Result<T> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        let commit = Commit::new();
        let gate = commit.clone();
        let mut task = tokio::task::spawn_blocking(move || f(store.as_ref(), &gate));
        match tokio::time::timeout(self.timeout, &mut task).await {
            Ok(result) => joined(op, result),
            Err(_) if commit.abandon() => Err(self.timed_out(op)),
            Err(_) => {
                warn!(op, "record store committing past its timeout, awaiting outcome");
                joined(op, task.await)
            }
        }
    }

    /// Load an incident or fail with `NotFound`.
    pub async fn require_incident(&self, id: &str) -> Result<Incident> {
        self.find_incident(id)
            .await?
            .ok_or_else(|| Error::incident_not_found(id))
    }

    pub async fn find_incident(&self, id: &str) -> Result<Option<Incident>> {
        let owned = id.to_string();
        self.run("get_incident", move |s| s.get_incident(&owned)).await
    }
}

impl std::fmt::Debug for Records {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Records")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
