// Process Handle - one supervised OS process and its teardown
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

use super::constants::KILL_REAP_TIMEOUT;
use super::registry::{HandleId, ProcessRegistry, RunningProcess};
use crate::domain::{CommandLine, ExitRecord};
use crate::port::{LaunchError, ProcessSpawner, ProcessStopper, SignalError, StopSignal};

/// Which trigger ran the teardown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TeardownPath {
    ExitNotification,
    Disposal,
}

/// Teardown state shared by the handle and its exit watcher
struct Teardown {
    id: HandleId,
    registry: Arc<ProcessRegistry>,
    destroyed: AtomicBool,
    exit_notification: AtomicBool,
    watcher: Mutex<Option<AbortHandle>>,
}

impl Teardown {
    /// Unregister, then release the process object
    ///
    /// Returns true for the single call that did the work.
    fn destroy(&self, path: TeardownPath) -> bool {
        if self.destroyed.swap(true, Ordering::AcqRel) {
            return false;
        }

        if self.registry.remove(&self.id).is_none() {
            debug!(handle_id = %self.id, "Handle was not registered at teardown");
        }

        let watcher = self
            .watcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        // The watcher owns the process object; on the exit path it drops it
        // itself when it returns.
        if path == TeardownPath::Disposal {
            if let Some(watcher) = watcher {
                watcher.abort();
            }
        }

        debug!(handle_id = %self.id, path = ?path, "Process handle destroyed");
        true
    }
}

/// Owns exactly one external process for its lifetime
///
/// Exit is observed by a background watcher task, not by polling. Teardown
/// runs once, from whichever of exit notification or `dispose` comes first.
/// Dropping the handle disposes it.
pub struct ProcessHandle {
    teardown: Arc<Teardown>,
    pid: Option<u32>,
    stopper: Arc<dyn ProcessStopper>,
    exit_rx: watch::Receiver<Option<ExitRecord>>,
    disposed: AtomicBool,
}

impl ProcessHandle {
    /// Spawn the command and register the handle
    ///
    /// Must be called inside a tokio runtime.
    ///
    /// # Errors
    /// - LaunchError if the executable cannot be spawned; nothing is
    ///   registered in that case
    pub fn start(
        spawner: &dyn ProcessSpawner,
        command: &CommandLine,
        target: &str,
        id: HandleId,
        started_at_ms: i64,
        registry: Arc<ProcessRegistry>,
    ) -> Result<Self, LaunchError> {
        let mut process = spawner.spawn(command)?;
        let pid = process.pid();
        let stopper = process.stopper();
        let program = command.program_name();

        // Registered before the watcher exists, so an immediate exit cannot
        // unregister ahead of the add.
        registry.add(RunningProcess {
            id: id.clone(),
            pid,
            program: program.clone(),
            target: target.to_string(),
            started_at_ms,
        });

        info!(
            handle_id = %id,
            pid = ?pid,
            program = %program,
            input = %target,
            "Process started"
        );

        let teardown = Arc::new(Teardown {
            id,
            registry,
            destroyed: AtomicBool::new(false),
            exit_notification: AtomicBool::new(true),
            watcher: Mutex::new(None),
        });

        let (exit_tx, exit_rx) = watch::channel(None);
        let watcher = tokio::spawn({
            let teardown = Arc::clone(&teardown);
            async move {
                let exit_code = match process.wait().await {
                    Ok(code) => code,
                    Err(e) => {
                        debug!(handle_id = %teardown.id, error = %e, "Exit code unavailable");
                        None
                    }
                };
                exit_tx.send_replace(Some(ExitRecord { exit_code }));
                info!(handle_id = %teardown.id, exit_code = ?exit_code, "Process exited");

                if teardown.exit_notification.load(Ordering::Acquire) {
                    teardown.destroy(TeardownPath::ExitNotification);
                }
                drop(process);
            }
        });
        *teardown
            .watcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(watcher.abort_handle());

        Ok(Self {
            teardown,
            pid,
            stopper,
            exit_rx,
            disposed: AtomicBool::new(false),
        })
    }

    pub fn id(&self) -> &HandleId {
        &self.teardown.id
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn has_exited(&self) -> bool {
        self.exit_rx.borrow().is_some()
    }

    pub fn exit_record(&self) -> Option<ExitRecord> {
        *self.exit_rx.borrow()
    }

    /// None while running, and also when the exit code could not be captured
    pub fn exit_code(&self) -> Option<i32> {
        self.exit_record().and_then(|r| r.exit_code)
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Wait up to `timeout` for the process to exit
    pub async fn wait_for_exit(&self, timeout: Duration) -> Option<ExitRecord> {
        let mut rx = self.exit_rx.clone();
        // Copy out of the watch::Ref before `rx` goes out of scope
        let record = match tokio::time::timeout(timeout, rx.wait_for(Option::is_some)).await {
            Ok(Ok(record)) => *record,
            // Watcher gone without reporting: the handle was disposed
            Ok(Err(_)) => self.exit_record(),
            Err(_) => None,
        };
        record
    }

    /// Ask the process to stop; kill it if it is still running after `grace`
    ///
    /// Best effort: signal failures are logged, never returned.
    pub async fn terminate(&self, grace: Duration) -> Option<ExitRecord> {
        if self.is_disposed() {
            return self.exit_record();
        }
        if let Some(record) = self.exit_record() {
            return Some(record);
        }

        self.signal(StopSignal::Terminate);
        if let Some(record) = self.wait_for_exit(grace).await {
            return Some(record);
        }

        warn!(
            handle_id = %self.id(),
            pid = ?self.pid,
            grace_ms = grace.as_millis() as u64,
            "Process still running after grace period, killing"
        );
        self.signal(StopSignal::Kill);

        let record = self.wait_for_exit(KILL_REAP_TIMEOUT).await;
        if record.is_none() {
            warn!(handle_id = %self.id(), pid = ?self.pid, "No exit reported after kill");
        }
        record
    }

    fn signal(&self, signal: StopSignal) {
        match self.stopper.send(signal) {
            Ok(()) => debug!(handle_id = %self.id(), pid = ?self.pid, signal = %signal, "Stop signal sent"),
            Err(SignalError::AlreadyExited) => {}
            Err(e) => warn!(
                handle_id = %self.id(),
                pid = ?self.pid,
                error = %e,
                "Failed to signal process"
            ),
        }
    }

    /// Detach the exit notification and tear down; repeat calls are no-ops
    ///
    /// A process still running at this point is killed: the supervisor's
    /// future may have been dropped mid-run, and nothing would stop it later.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        if !self.has_exited() {
            warn!(handle_id = %self.id(), pid = ?self.pid, "Disposing handle of a running process, killing");
            self.signal(StopSignal::Kill);
        }
        self.teardown
            .exit_notification
            .store(false, Ordering::Release);
        self.teardown.destroy(TeardownPath::Disposal);
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        self.dispose();
    }
}
