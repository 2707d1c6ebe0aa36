// Extraction Errors

use crate::domain::DomainError;
use crate::port::LaunchError;
use thiserror::Error;

/// Outcome of an invocation that did not complete normally
#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("Invalid request: {0}")]
    InvalidRequest(#[from] DomainError),

    #[error(transparent)]
    Launch(#[from] LaunchError),

    /// The process stalled and had to be stopped
    #[error("External tool failed for {target}: {reason}")]
    ToolFailed {
        target: String,
        exit_code: i32,
        reason: String,
    },

    #[error("Extraction cancelled for {target}")]
    Cancelled { target: String },

    #[error("Admission gate closed")]
    AdmissionClosed,
}

impl ExtractionError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ExtractionError::Cancelled { .. })
    }
}
