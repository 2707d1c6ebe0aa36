// Process Registry - bookkeeping of live process handles
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

/// Registry key for one process handle
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HandleId(String);

impl HandleId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for HandleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Registry entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunningProcess {
    pub id: HandleId,
    pub pid: Option<u32>,
    pub program: String,
    pub target: String,
    pub started_at_ms: i64, // epoch ms
}

/// Live process handles, for visibility only
///
/// Admission is enforced elsewhere. The lock is held for the mutation or
/// read itself and never across an await.
#[derive(Debug, Default)]
pub struct ProcessRegistry {
    entries: Mutex<HashMap<HandleId, RunningProcess>>,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // A panic while holding the lock cannot leave the map half-updated
    fn lock(&self) -> MutexGuard<'_, HashMap<HandleId, RunningProcess>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add an entry; returns false if the id was already registered
    pub fn add(&self, entry: RunningProcess) -> bool {
        let mut entries = self.lock();
        if entries.contains_key(&entry.id) {
            warn!(handle_id = %entry.id, "Process handle already registered");
            return false;
        }
        debug!(handle_id = %entry.id, pid = ?entry.pid, "Process handle registered");
        entries.insert(entry.id.clone(), entry);
        true
    }

    /// Remove an entry; None if it was not (or no longer) registered
    pub fn remove(&self, id: &HandleId) -> Option<RunningProcess> {
        let removed = self.lock().remove(id);
        if removed.is_some() {
            debug!(handle_id = %id, "Process handle unregistered");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Copy of all entries, oldest first
    pub fn snapshot(&self) -> Vec<RunningProcess> {
        let mut entries: Vec<RunningProcess> = self.lock().values().cloned().collect();
        entries.sort_by(|a, b| {
            a.started_at_ms
                .cmp(&b.started_at_ms)
                .then_with(|| a.id.as_str().cmp(b.id.as_str()))
        });
        entries
    }
}
