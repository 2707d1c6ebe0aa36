// Process Port (ADR-002)
// Abstraction over spawning and signalling the external tool

use crate::domain::CommandLine;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// How hard to ask a process to stop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopSignal {
    /// Polite request (SIGTERM)
    Terminate,
    /// Forced kill (SIGKILL)
    Kill,
}

impl std::fmt::Display for StopSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopSignal::Terminate => write!(f, "TERMINATE"),
            StopSignal::Kill => write!(f, "KILL"),
        }
    }
}

/// The external tool could not be started at all
#[derive(Error, Debug)]
#[error("Failed to launch {program}: {source}")]
pub struct LaunchError {
    pub program: String,
    #[source]
    pub source: std::io::Error,
}

/// Signal delivery errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignalError {
    /// Expected race: the process is already gone
    #[error("Process already exited")]
    AlreadyExited,

    #[error("{signal} failed: {reason}")]
    Failed { signal: StopSignal, reason: String },
}

/// Delivers stop signals to a running process
///
/// Obtained before the process is handed to its exit watcher, so it must not
/// need exclusive access to the process object.
pub trait ProcessStopper: Send + Sync {
    fn send(&self, signal: StopSignal) -> Result<(), SignalError>;
}

/// One live OS process
///
/// Dropping the value releases the OS resources held for it.
#[async_trait]
pub trait SpawnedProcess: Send {
    fn pid(&self) -> Option<u32>;

    fn stopper(&self) -> Arc<dyn ProcessStopper>;

    /// Resolves when the process exits
    ///
    /// Returns the exit code, `Ok(None)` if the platform reported none.
    ///
    /// # Errors
    /// The exit status could not be collected. The process should still be
    /// considered exited.
    async fn wait(&mut self) -> std::io::Result<Option<i32>>;
}

/// Process spawner port
///
/// Implementations:
/// - TokioProcessSpawner: real OS processes (infra-system)
/// - MockProcessSpawner: scripted processes on the tokio clock (tests)
pub trait ProcessSpawner: Send + Sync {
    /// Start the command
    ///
    /// # Errors
    /// - LaunchError if the executable cannot be spawned
    fn spawn(&self, command: &CommandLine) -> Result<Box<dyn SpawnedProcess>, LaunchError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::port::output_probe::mocks::MockOutputProbe;
    use std::io;
    use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::watch;

    /// What a scripted process does once it has written its frames
    #[derive(Debug, Clone)]
    pub enum AfterFrames {
        Exit(i32),
        /// Never exits on its own
        Hang,
        /// Exits, but the exit status cannot be collected
        WaitError,
    }

    /// Behaviour of a scripted process, driven by the tokio clock
    #[derive(Debug, Clone)]
    pub struct ScriptedRun {
        pub frames: usize,
        pub frame_every: Duration,
        pub then: AfterFrames,
        pub ignores_terminate: bool,
        /// Every stop signal fails with `SignalError::Failed`
        pub signals_fail: bool,
    }

    impl ScriptedRun {
        pub fn exits_after(frames: usize, frame_every: Duration, exit_code: i32) -> Self {
            Self {
                frames,
                frame_every,
                then: AfterFrames::Exit(exit_code),
                ignores_terminate: false,
                signals_fail: false,
            }
        }

        pub fn hangs_after(frames: usize, frame_every: Duration) -> Self {
            Self {
                frames,
                frame_every,
                then: AfterFrames::Hang,
                ignores_terminate: false,
                signals_fail: false,
            }
        }

        pub fn with_wait_error(mut self) -> Self {
            self.then = AfterFrames::WaitError;
            self
        }

        pub fn ignoring_terminate(mut self) -> Self {
            self.ignores_terminate = true;
            self
        }

        pub fn with_failing_signals(mut self) -> Self {
            self.signals_fail = true;
            self
        }
    }

    /// Counters shared by every process a spawner created
    #[derive(Default)]
    pub struct SpawnStats {
        spawned: AtomicUsize,
        live: AtomicUsize,
        max_live: AtomicUsize,
        released: AtomicUsize,
        signals: Mutex<Vec<StopSignal>>,
    }

    impl SpawnStats {
        pub fn spawned(&self) -> usize {
            self.spawned.load(Ordering::SeqCst)
        }

        pub fn live(&self) -> usize {
            self.live.load(Ordering::SeqCst)
        }

        pub fn max_live(&self) -> usize {
            self.max_live.load(Ordering::SeqCst)
        }

        pub fn released(&self) -> usize {
            self.released.load(Ordering::SeqCst)
        }

        pub fn signals(&self) -> Vec<StopSignal> {
            self.signals.lock().unwrap().clone()
        }
    }

    /// Mock spawner producing scripted processes
    pub struct MockProcessSpawner {
        probe: Arc<MockOutputProbe>,
        script: ScriptedRun,
        fail: Option<io::ErrorKind>,
        stats: Arc<SpawnStats>,
        next_pid: AtomicU32,
    }

    impl MockProcessSpawner {
        pub fn new(probe: Arc<MockOutputProbe>, script: ScriptedRun) -> Self {
            Self {
                probe,
                script,
                fail: None,
                stats: Arc::new(SpawnStats::default()),
                next_pid: AtomicU32::new(1000),
            }
        }

        pub fn new_failing(kind: io::ErrorKind) -> Self {
            let mut spawner = Self::new(
                Arc::new(MockOutputProbe::new()),
                ScriptedRun::exits_after(0, Duration::ZERO, 0),
            );
            spawner.fail = Some(kind);
            spawner
        }

        pub fn stats(&self) -> Arc<SpawnStats> {
            Arc::clone(&self.stats)
        }
    }

    impl ProcessSpawner for MockProcessSpawner {
        fn spawn(&self, command: &CommandLine) -> Result<Box<dyn SpawnedProcess>, LaunchError> {
            if let Some(kind) = self.fail {
                return Err(LaunchError {
                    program: command.program_name(),
                    source: io::Error::new(kind, "mock spawn failure"),
                });
            }

            self.stats.spawned.fetch_add(1, Ordering::SeqCst);
            let live = self.stats.live.fetch_add(1, Ordering::SeqCst) + 1;
            self.stats.max_live.fetch_max(live, Ordering::SeqCst);

            let (stop_tx, stop_rx) = watch::channel(None);
            let exited = Arc::new(AtomicBool::new(false));
            let stopper = Arc::new(MockStopper {
                stop_tx,
                fail: self.script.signals_fail,
                exited: Arc::clone(&exited),
                stats: Arc::clone(&self.stats),
            });

            Ok(Box::new(MockProcess {
                pid: self.next_pid.fetch_add(1, Ordering::SeqCst),
                script: self.script.clone(),
                frames: self.probe.counter(command.working_dir()),
                stop_rx,
                stopper,
                exited,
                stats: Arc::clone(&self.stats),
            }))
        }
    }

    struct MockStopper {
        stop_tx: watch::Sender<Option<StopSignal>>,
        fail: bool,
        exited: Arc<AtomicBool>,
        stats: Arc<SpawnStats>,
    }

    impl ProcessStopper for MockStopper {
        fn send(&self, signal: StopSignal) -> Result<(), SignalError> {
            if self.exited.load(Ordering::SeqCst) {
                return Err(SignalError::AlreadyExited);
            }
            if self.fail {
                return Err(SignalError::Failed {
                    signal,
                    reason: "mock permission denied".to_string(),
                });
            }
            self.stats.signals.lock().unwrap().push(signal);
            self.stop_tx.send_replace(Some(signal));
            Ok(())
        }
    }

    struct MockProcess {
        pid: u32,
        script: ScriptedRun,
        frames: Arc<AtomicUsize>,
        stop_rx: watch::Receiver<Option<StopSignal>>,
        stopper: Arc<MockStopper>,
        exited: Arc<AtomicBool>,
        stats: Arc<SpawnStats>,
    }

    #[async_trait]
    impl SpawnedProcess for MockProcess {
        fn pid(&self) -> Option<u32> {
            Some(self.pid)
        }

        fn stopper(&self) -> Arc<dyn ProcessStopper> {
            self.stopper.clone()
        }

        async fn wait(&mut self) -> io::Result<Option<i32>> {
            let script = self.script.clone();
            let frames = Arc::clone(&self.frames);
            let run = async move {
                for _ in 0..script.frames {
                    tokio::time::sleep(script.frame_every).await;
                    frames.fetch_add(1, Ordering::SeqCst);
                }
                match script.then {
                    AfterFrames::Exit(code) => Ok(Some(code)),
                    AfterFrames::WaitError => Err(io::Error::new(
                        io::ErrorKind::Other,
                        "mock exit status unavailable",
                    )),
                    AfterFrames::Hang => std::future::pending().await,
                }
            };

            let ignores_terminate = self.script.ignores_terminate;
            let mut stop_rx = self.stop_rx.clone();
            let stopped = async move {
                let accepted = stop_rx
                    .wait_for(|s| match s {
                        Some(StopSignal::Kill) => true,
                        Some(StopSignal::Terminate) => !ignores_terminate,
                        None => false,
                    })
                    .await
                    .map(|s| *s);
                match accepted {
                    Ok(Some(StopSignal::Kill)) => Ok::<_, io::Error>(Some(137)),
                    Ok(_) => Ok(Some(143)),
                    Err(_) => std::future::pending().await,
                }
            };

            let result = tokio::select! {
                r = run => r,
                r = stopped => r,
            };
            self.exited.store(true, Ordering::SeqCst);
            result
        }
    }

    impl Drop for MockProcess {
        fn drop(&mut self) {
            self.exited.store(true, Ordering::SeqCst);
            self.stats.live.fetch_sub(1, Ordering::SeqCst);
            self.stats.released.fetch_add(1, Ordering::SeqCst);
        }
    }
}
