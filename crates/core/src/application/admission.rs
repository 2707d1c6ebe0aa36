// Admission Gate - bounds how many external processes run at once
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, trace};

use super::cancel::CancelToken;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AdmissionError {
    #[error("Cancelled while waiting for admission")]
    Cancelled,

    #[error("Admission gate closed")]
    Closed,
}

/// Counting gate in front of process start
///
/// Waiters are admitted in FIFO order (tokio semaphore fairness).
#[derive(Debug)]
pub struct AdmissionGate {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

/// One admitted slot; released exactly once when dropped
#[derive(Debug)]
pub struct AdmissionPermit {
    _permit: OwnedSemaphorePermit,
}

impl Drop for AdmissionPermit {
    fn drop(&mut self) {
        trace!("Admission slot released");
    }
}

impl AdmissionGate {
    pub fn new(capacity: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Wait for a free slot
    ///
    /// Returns without consuming a slot if `cancel` fires first (or already
    /// fired).
    pub async fn acquire(&self, cancel: &CancelToken) -> Result<AdmissionPermit, AdmissionError> {
        if cancel.is_cancelled() {
            return Err(AdmissionError::Cancelled);
        }

        if self.semaphore.available_permits() == 0 {
            debug!(
                capacity = self.capacity,
                "All admission slots busy, waiting"
            );
        }

        let semaphore = Arc::clone(&self.semaphore);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(AdmissionError::Cancelled),
            permit = semaphore.acquire_owned() => permit
                .map(|p| AdmissionPermit { _permit: p })
                .map_err(|_| AdmissionError::Closed),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Slots currently held
    pub fn in_use(&self) -> usize {
        self.capacity.saturating_sub(self.available())
    }
}
