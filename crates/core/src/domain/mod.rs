// Domain Layer - Invocation and outcome types

pub mod command;
pub mod error;
pub mod outcome;

// Re-exports
pub use command::CommandLine;
pub use error::DomainError;
pub use outcome::{final_exit_code, ExitRecord, ExtractionOutcome, STALLED_EXIT_CODE};
