// Signal-based process stopper (ADR-002)
// SIGTERM asks, SIGKILL forces; "no such process" is the expected race
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

use framewatch_core::port::{ProcessStopper, SignalError, StopSignal};

/// Delivers stop signals by pid
pub struct SignalStopper {
    pid: Option<u32>,
    reaped: Arc<AtomicBool>,
}

impl SignalStopper {
    /// `reaped` is set once the exit status was collected; the pid is never
    /// signalled after that.
    pub fn new(pid: Option<u32>, reaped: Arc<AtomicBool>) -> Self {
        Self { pid, reaped }
    }
}

impl ProcessStopper for SignalStopper {
    fn send(&self, signal: StopSignal) -> Result<(), SignalError> {
        let pid = match self.pid {
            Some(pid) if !self.reaped.load(Ordering::Acquire) => pid,
            _ => return Err(SignalError::AlreadyExited),
        };

        info!(pid = %pid, signal = %signal, "Sending stop signal");
        deliver(pid, signal)
    }
}

#[cfg(unix)]
fn deliver(pid: u32, signal: StopSignal) -> Result<(), SignalError> {
    use nix::errno::Errno;
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let sig = match signal {
        StopSignal::Terminate => Signal::SIGTERM,
        StopSignal::Kill => Signal::SIGKILL,
    };
    let raw = i32::try_from(pid).map_err(|_| SignalError::Failed {
        signal,
        reason: format!("pid {} out of range", pid),
    })?;

    match kill(Pid::from_raw(raw), sig) {
        Ok(()) => Ok(()),
        Err(Errno::ESRCH) => Err(SignalError::AlreadyExited),
        Err(e) => Err(SignalError::Failed {
            signal,
            reason: e.to_string(),
        }),
    }
}

#[cfg(windows)]
fn deliver(pid: u32, signal: StopSignal) -> Result<(), SignalError> {
    // Windows: taskkill /PID, with /F flag (force kill) for Kill
    use std::process::Command;

    let mut cmd = Command::new("taskkill");
    if signal == StopSignal::Kill {
        cmd.arg("/F");
    }
    let output = cmd
        .args(["/PID", &pid.to_string()])
        .output()
        .map_err(|e| SignalError::Failed {
            signal,
            reason: e.to_string(),
        })?;

    if output.status.success() {
        return Ok(());
    }
    let stderr = String::from_utf8_lossy(&output.stderr);
    if stderr.contains("not found") {
        return Err(SignalError::AlreadyExited);
    }
    Err(SignalError::Failed {
        signal,
        reason: format!("taskkill failed: {}", stderr.trim()),
    })
}
