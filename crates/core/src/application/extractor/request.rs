// Invocation Request

use std::path::PathBuf;
use std::time::Duration;

use crate::application::cancel::CancelToken;
use crate::application::constants::{DEFAULT_FRAME_EXTENSION, DEFAULT_POLL_INTERVAL};
use crate::domain::{CommandLine, DomainError};

/// Everything one extraction needs; immutable once handed to the extractor
#[derive(Debug, Clone)]
pub struct InvocationRequest {
    pub command: CommandLine,
    /// Directory polled for new frames (defaults to the working directory)
    pub output_dir: PathBuf,
    /// Extension without the leading dot
    pub frame_extension: String,
    pub poll_interval: Duration,
    /// Input being processed, used in diagnostics
    pub target: String,
    pub cancel: CancelToken,
}

impl InvocationRequest {
    pub fn new(command: CommandLine, target: impl Into<String>) -> Self {
        Self {
            output_dir: command.working_dir.clone(),
            command,
            frame_extension: DEFAULT_FRAME_EXTENSION.to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            target: target.into(),
            cancel: CancelToken::never(),
        }
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    pub fn with_frame_extension(mut self, extension: &str) -> Self {
        self.frame_extension = extension.trim_start_matches('.').to_string();
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        if self.command.program.as_os_str().is_empty() {
            return Err(DomainError::EmptyProgram);
        }
        if self.poll_interval.is_zero() {
            return Err(DomainError::ZeroPollInterval);
        }
        if self.frame_extension.is_empty() {
            return Err(DomainError::EmptyExtension);
        }
        Ok(())
    }
}
