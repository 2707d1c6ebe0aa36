//! Runtime settings
//! Layered: defaults, optional TOML file, FRAMEWATCH_* environment

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use framewatch_core::application::constants::{
    DEFAULT_FRAME_EXTENSION, DEFAULT_MAX_CONCURRENT, DEFAULT_POLL_INTERVAL,
    DEFAULT_TERMINATION_GRACE,
};
use framewatch_core::AppError;

const ENV_PREFIX: &str = "FRAMEWATCH";
const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// ffmpeg executable (looked up on PATH unless absolute)
    pub ffmpeg_path: PathBuf,
    pub max_concurrent: usize,
    pub poll_interval_secs: u64,
    pub termination_grace_ms: u64,
    pub frame_extension: String,
    /// Inherited environment passed to ffmpeg (ADR-040)
    pub env_allowlist: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            ffmpeg_path: PathBuf::from("ffmpeg"),
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            poll_interval_secs: DEFAULT_POLL_INTERVAL.as_secs(),
            termination_grace_ms: DEFAULT_TERMINATION_GRACE.as_millis() as u64,
            frame_extension: DEFAULT_FRAME_EXTENSION.to_string(),
            env_allowlist: ["PATH", "HOME", "USER", "LD_LIBRARY_PATH"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl Settings {
    /// Load settings
    ///
    /// An explicit `file` must exist. Without one, the per-user config file
    /// is read if present.
    ///
    /// # Example
    /// ```ignore
    /// // FRAMEWATCH_MAX_CONCURRENT=4 framewatch extract ...
    /// let settings = Settings::load(None)?;
    /// assert_eq!(settings.max_concurrent, 4);
    /// ```
    pub fn load(file: Option<&Path>) -> Result<Self, AppError> {
        Self::load_with_env(file, environment())
    }

    fn load_with_env(file: Option<&Path>, env: config::Environment) -> Result<Self, AppError> {
        let mut builder = config::Config::builder();

        match file {
            Some(path) => {
                builder = builder.add_source(config::File::from(path).required(true));
            }
            None => {
                if let Some(path) = default_config_path() {
                    builder = builder.add_source(config::File::from(path).required(false));
                }
            }
        }

        let settings: Settings = builder
            .add_source(env)
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| AppError::Config(e.to_string()))?;

        settings.validate()?;
        Ok(settings)
    }

    /// Reject values the supervisor cannot run with
    pub fn validate(&self) -> Result<(), AppError> {
        if self.ffmpeg_path.as_os_str().is_empty() {
            return Err(AppError::Config("ffmpeg_path must not be empty".to_string()));
        }
        if self.max_concurrent == 0 {
            return Err(AppError::Config(
                "max_concurrent must be at least 1".to_string(),
            ));
        }
        if self.poll_interval_secs == 0 {
            return Err(AppError::Config(
                "poll_interval_secs must be at least 1".to_string(),
            ));
        }
        if self.frame_extension.trim_start_matches('.').is_empty() {
            return Err(AppError::Config(
                "frame_extension must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn termination_grace(&self) -> Duration {
        Duration::from_millis(self.termination_grace_ms)
    }
}

fn environment() -> config::Environment {
    config::Environment::with_prefix(ENV_PREFIX)
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("env_allowlist")
}

/// e.g. ~/.config/framewatch/config.toml on Linux
pub fn default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "framewatch")
        .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
}
