// Domain Error Types

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("Program must not be empty")]
    EmptyProgram,

    #[error("Polling interval must be greater than zero")]
    ZeroPollInterval,

    #[error("Frame extension must not be empty")]
    EmptyExtension,
}
