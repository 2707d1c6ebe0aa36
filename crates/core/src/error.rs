// Central Error Type for the Application

use thiserror::Error;

/// Application-level error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Domain error: {0}")]
    Domain(#[from] crate::domain::DomainError),

    #[error("Extraction error: {0}")]
    Extraction(#[from] crate::application::ExtractionError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

impl AppError {
    /// Cancellation is an outcome, not a fault
    pub fn is_cancelled(&self) -> bool {
        matches!(self, AppError::Extraction(e) if e.is_cancelled())
    }
}
