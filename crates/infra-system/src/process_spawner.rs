// Process spawner implementation (Phase 2)
// reason: tokio for async process management (ADR-001)
use async_trait::async_trait;
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::process::{Child, Command};
use tracing::debug;

use framewatch_core::domain::CommandLine;
use framewatch_core::port::{LaunchError, ProcessSpawner, ProcessStopper, SpawnedProcess};

use crate::signal_stopper::SignalStopper;

/// Spawner for real OS processes
/// Children inherit only allowlisted environment variables (ADR-040)
pub struct TokioProcessSpawner {
    env_allowlist: Vec<String>,
}

impl TokioProcessSpawner {
    /// Create a new process spawner
    ///
    /// # Arguments
    /// * `env_allowlist` - Inherited environment variables passed through
    ///   (security constraint, ADR-040). Variables set on the command line
    ///   itself are always passed.
    ///
    /// # Example
    /// ```ignore
    /// let spawner = TokioProcessSpawner::new(
    ///     vec!["PATH".to_string(), "HOME".to_string(), "USER".to_string()],
    /// );
    /// ```
    pub fn new(env_allowlist: Vec<String>) -> Self {
        Self { env_allowlist }
    }

    /// Filter environment variables to allowlist only (ADR-040)
    fn filter_env<I>(&self, env: I) -> HashMap<String, String>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        env.into_iter()
            .filter(|(k, _)| self.env_allowlist.contains(k))
            .collect()
    }
}

impl ProcessSpawner for TokioProcessSpawner {
    fn spawn(&self, command: &CommandLine) -> Result<Box<dyn SpawnedProcess>, LaunchError> {
        let inherited = self.filter_env(std::env::vars());

        // stdout/stderr are not parsed; progress comes from the output directory
        let child = Command::new(&command.program)
            .args(&command.args)
            .env_clear()
            .envs(&inherited)
            .envs(&command.env)
            .current_dir(&command.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| LaunchError {
                program: command.program_name(),
                source,
            })?;

        let pid = child.id();
        let reaped = Arc::new(AtomicBool::new(false));
        debug!(pid = ?pid, command = %command, "Spawned child process");

        Ok(Box::new(TokioChild {
            child,
            pid,
            stopper: Arc::new(SignalStopper::new(pid, Arc::clone(&reaped))),
            reaped,
        }))
    }
}

/// Child process owned by its exit watcher
///
/// Dropping it kills a still-running process; the tokio runtime reaps it.
struct TokioChild {
    child: Child,
    pid: Option<u32>,
    stopper: Arc<SignalStopper>,
    reaped: Arc<AtomicBool>,
}

#[async_trait]
impl SpawnedProcess for TokioChild {
    fn pid(&self) -> Option<u32> {
        self.pid
    }

    fn stopper(&self) -> Arc<dyn ProcessStopper> {
        self.stopper.clone()
    }

    async fn wait(&mut self) -> std::io::Result<Option<i32>> {
        let status = self.child.wait().await;
        // The pid may be reused from here on
        self.reaped.store(true, Ordering::Release);
        Ok(exit_code(status?))
    }
}

/// Exit code; signal deaths are reported shell-style as 128 + signal
fn exit_code(status: std::process::ExitStatus) -> Option<i32> {
    if let Some(code) = status.code() {
        return Some(code);
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return Some(128 + signal);
        }
    }
    None
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use framewatch_core::port::{SignalError, StopSignal};

    fn spawner() -> TokioProcessSpawner {
        TokioProcessSpawner::new(vec!["PATH".to_string()])
    }

    fn sh(script: &str, dir: &std::path::Path) -> CommandLine {
        CommandLine::new("/bin/sh", dir).args(["-c", script])
    }

    #[tokio::test]
    async fn test_exit_code_is_captured() {
        let dir = tempfile::tempdir().unwrap();
        let mut child = spawner().spawn(&sh("exit 3", dir.path())).unwrap();

        assert!(child.pid().is_some());
        assert_eq!(child.wait().await.unwrap(), Some(3));
    }

    #[tokio::test]
    async fn test_runs_in_working_dir_with_command_env() {
        let dir = tempfile::tempdir().unwrap();
        let command = sh("touch \"$FRAME_NAME\"", dir.path()).env("FRAME_NAME", "img_00001.jpg");

        let mut child = spawner().spawn(&command).unwrap();
        assert_eq!(child.wait().await.unwrap(), Some(0));
        assert!(dir.path().join("img_00001.jpg").exists());
    }

    #[tokio::test]
    async fn test_missing_executable_is_launch_error() {
        let dir = tempfile::tempdir().unwrap();
        let command = CommandLine::new("/nonexistent/ffmpeg-framewatch", dir.path());

        let err = spawner().spawn(&command).err().unwrap();
        assert_eq!(err.program, "ffmpeg-framewatch");
        assert_eq!(err.source.kind(), std::io::ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_terminate_reports_signal_exit() {
        let dir = tempfile::tempdir().unwrap();
        let mut child = spawner().spawn(&sh("exec sleep 30", dir.path())).unwrap();
        let stopper = child.stopper();

        stopper.send(StopSignal::Terminate).unwrap();
        let code = tokio::time::timeout(std::time::Duration::from_secs(5), child.wait())
            .await
            .expect("child should exit after SIGTERM")
            .unwrap();
        assert_eq!(code, Some(128 + 15));

        // Reaped: further signals are the expected race
        assert_eq!(
            stopper.send(StopSignal::Kill),
            Err(SignalError::AlreadyExited)
        );
    }

    #[test]
    fn test_env_filtering() {
        let spawner = TokioProcessSpawner::new(vec!["ALLOWED_VAR".to_string()]);

        let env = vec![
            ("ALLOWED_VAR".to_string(), "value1".to_string()),
            ("BLOCKED_VAR".to_string(), "value2".to_string()),
        ];

        let filtered = spawner.filter_env(env);

        assert_eq!(filtered.len(), 1);
        assert!(filtered.contains_key("ALLOWED_VAR"));
        assert!(!filtered.contains_key("BLOCKED_VAR"));
    }
}
