// Frame Extractor - supervises one external extraction process per call

mod error;
mod request;

pub use error::ExtractionError;
pub use request::InvocationRequest;

use std::io::ErrorKind;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::admission::{AdmissionError, AdmissionGate};
use super::constants::DEFAULT_TERMINATION_GRACE;
use super::process_handle::ProcessHandle;
use super::registry::{HandleId, ProcessRegistry};
use crate::domain::{final_exit_code, ExitRecord, ExtractionOutcome};
use crate::port::{IdProvider, OutputProbe, ProcessSpawner, TimeProvider};

/// How the stall-detection loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopExit {
    Exited(ExitRecord),
    Stalled,
    Cancelled,
}

#[derive(Debug)]
struct WatchReport {
    exit: LoopExit,
    polls: u32,
}

/// Extraction supervisor
///
/// Progress is inferred from new frame files appearing in the output
/// directory. The tool's own progress stream is never parsed, and total
/// runtime is unbounded as long as every polling interval shows new output.
pub struct FrameExtractor {
    spawner: Arc<dyn ProcessSpawner>,
    probe: Arc<dyn OutputProbe>,
    admission: Arc<AdmissionGate>,
    registry: Arc<ProcessRegistry>,
    time_provider: Arc<dyn TimeProvider>,
    id_provider: Arc<dyn IdProvider>,
    termination_grace: Duration,
}

impl FrameExtractor {
    /// Create a new extractor
    ///
    /// # Arguments
    /// * `spawner` - Starts the external tool
    /// * `probe` - Counts frame files in the output directory
    /// * `admission` - Shared concurrency cap
    /// * `registry` - Shared bookkeeping of live processes
    /// * `time_provider` - Registry timestamps
    /// * `id_provider` - Process handle IDs
    ///
    /// # Example
    /// ```ignore
    /// let extractor = FrameExtractor::new(
    ///     Arc::new(TokioProcessSpawner::new(vec!["PATH".to_string()])),
    ///     Arc::new(FsOutputProbe),
    ///     Arc::new(AdmissionGate::new(2)),
    ///     Arc::new(ProcessRegistry::new()),
    ///     Arc::new(SystemTimeProvider),
    ///     Arc::new(UuidProvider),
    /// );
    /// ```
    pub fn new(
        spawner: Arc<dyn ProcessSpawner>,
        probe: Arc<dyn OutputProbe>,
        admission: Arc<AdmissionGate>,
        registry: Arc<ProcessRegistry>,
        time_provider: Arc<dyn TimeProvider>,
        id_provider: Arc<dyn IdProvider>,
    ) -> Self {
        Self {
            spawner,
            probe,
            admission,
            registry,
            time_provider,
            id_provider,
            termination_grace: DEFAULT_TERMINATION_GRACE,
        }
    }

    pub fn with_termination_grace(mut self, grace: Duration) -> Self {
        self.termination_grace = grace;
        self
    }

    pub fn admission(&self) -> &Arc<AdmissionGate> {
        &self.admission
    }

    pub fn registry(&self) -> &Arc<ProcessRegistry> {
        &self.registry
    }

    /// Run one extraction to completion
    ///
    /// Algorithm:
    /// 1. Acquire an admission slot (cancellable; no process on cancel)
    /// 2. Start the process and register it
    /// 3. Each polling interval: natural exit ends the loop as completed;
    ///    otherwise new frames mean keep going, no new frames mean stalled
    /// 4. Stalled or cancelled: terminate (grace, then kill)
    /// 5. Release the slot on every path
    ///
    /// # Errors
    /// - InvalidRequest before admission
    /// - Launch if the tool cannot be spawned
    /// - ToolFailed if the process stalled (exit code -1 regardless of what
    ///   termination observed)
    /// - Cancelled if the request's token fired
    pub async fn extract_frames(
        &self,
        request: &InvocationRequest,
    ) -> Result<ExtractionOutcome, ExtractionError> {
        request.validate()?;
        let started = Instant::now();
        let target = request.target.as_str();

        let permit = self
            .admission
            .acquire(&request.cancel)
            .await
            .map_err(|e| match e {
                AdmissionError::Cancelled => {
                    info!(input = %target, "Extraction cancelled before admission");
                    ExtractionError::Cancelled {
                        target: target.to_string(),
                    }
                }
                AdmissionError::Closed => ExtractionError::AdmissionClosed,
            })?;

        let baseline = self.count_frames(request).await;

        // On launch failure the permit drops here and nothing was registered
        let handle = ProcessHandle::start(
            self.spawner.as_ref(),
            &request.command,
            target,
            HandleId::new(self.id_provider.generate_id()),
            self.time_provider.now_millis(),
            Arc::clone(&self.registry),
        )
        .map_err(|e| {
            error!(input = %target, error = %e, "Failed to launch external tool");
            ExtractionError::from(e)
        })?;

        let report = self.watch_progress(&handle, request, baseline).await;

        let observed = match report.exit {
            LoopExit::Exited(record) => Some(record),
            LoopExit::Stalled | LoopExit::Cancelled => {
                handle.terminate(self.termination_grace).await
            }
        };
        handle.dispose();
        drop(permit);

        let ran_to_completion = matches!(report.exit, LoopExit::Exited(_));
        let duration_ms = started.elapsed().as_millis() as u64;

        if report.exit == LoopExit::Cancelled {
            info!(
                input = %target,
                polls = report.polls,
                duration_ms,
                "Extraction cancelled, process stopped"
            );
            return Err(ExtractionError::Cancelled {
                target: target.to_string(),
            });
        }

        let exit_code = final_exit_code(ran_to_completion, observed);
        if !ran_to_completion {
            error!(
                input = %target,
                exit_code,
                observed = ?observed,
                polls = report.polls,
                duration_ms,
                "External tool stalled and was terminated"
            );
            return Err(ExtractionError::ToolFailed {
                target: target.to_string(),
                exit_code,
                reason: format!(
                    "no new .{} output within {}s",
                    request.frame_extension,
                    request.poll_interval.as_secs_f64()
                ),
            });
        }

        let frames = self.count_frames(request).await.saturating_sub(baseline);
        info!(
            input = %target,
            exit_code,
            frames,
            polls = report.polls,
            duration_ms,
            "Extraction finished"
        );

        Ok(ExtractionOutcome {
            target: target.to_string(),
            exit_code,
            frames,
            polls: report.polls,
            duration_ms,
        })
    }

    /// Stall-detection loop
    async fn watch_progress(
        &self,
        handle: &ProcessHandle,
        request: &InvocationRequest,
        baseline: usize,
    ) -> WatchReport {
        let mut previous = baseline;
        let mut polls = 0;

        loop {
            tokio::select! {
                biased;
                _ = request.cancel.cancelled() => {
                    return WatchReport { exit: LoopExit::Cancelled, polls };
                }
                exited = handle.wait_for_exit(request.poll_interval) => {
                    if let Some(record) = exited {
                        return WatchReport { exit: LoopExit::Exited(record), polls };
                    }
                }
            }

            polls += 1;
            let current = self.count_frames(request).await;
            if current > previous {
                debug!(
                    handle_id = %handle.id(),
                    frames = current,
                    previous,
                    "Output progressing"
                );
                previous = current;
                continue;
            }

            warn!(
                handle_id = %handle.id(),
                pid = ?handle.pid(),
                frames = current,
                interval_secs = request.poll_interval.as_secs_f64(),
                "No new output within polling interval, process stalled"
            );
            return WatchReport {
                exit: LoopExit::Stalled,
                polls,
            };
        }
    }

    /// Frames currently in the output directory
    ///
    /// Unreadable directories count as zero, which reads as "no progress".
    async fn count_frames(&self, request: &InvocationRequest) -> usize {
        match self
            .probe
            .count_matching(&request.output_dir, &request.frame_extension)
            .await
        {
            Ok(count) => count,
            Err(e) if e.kind() == ErrorKind::NotFound => 0,
            Err(e) => {
                warn!(
                    dir = %request.output_dir.display(),
                    error = %e,
                    "Could not count output frames"
                );
                0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::cancel::cancel_channel;
    use crate::domain::{CommandLine, DomainError, STALLED_EXIT_CODE};
    use crate::port::id_provider::SequentialIdProvider;
    use crate::port::output_probe::mocks::MockOutputProbe;
    use crate::port::process::mocks::{MockProcessSpawner, ScriptedRun, SpawnStats};
    use crate::port::time_provider::FixedTimeProvider;
    use crate::port::StopSignal;
    use std::path::Path;
    use std::sync::atomic::Ordering;

    struct Fixture {
        extractor: Arc<FrameExtractor>,
        probe: Arc<MockOutputProbe>,
        stats: Arc<SpawnStats>,
    }

    fn fixture(script: ScriptedRun, capacity: usize) -> Fixture {
        let probe = Arc::new(MockOutputProbe::new());
        let spawner = MockProcessSpawner::new(Arc::clone(&probe), script);
        let stats = spawner.stats();
        let extractor = FrameExtractor::new(
            Arc::new(spawner),
            probe.clone(),
            Arc::new(AdmissionGate::new(capacity)),
            Arc::new(ProcessRegistry::new()),
            Arc::new(FixedTimeProvider(1_700_000_000_000)),
            Arc::new(SequentialIdProvider::default()),
        );
        Fixture {
            extractor: Arc::new(extractor),
            probe,
            stats,
        }
    }

    fn request(name: &str) -> InvocationRequest {
        let dir = format!("/frames/{}", name);
        InvocationRequest::new(
            CommandLine::new("ffmpeg", &dir).args(["-i", name]),
            format!("{}.mkv", name),
        )
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    fn assert_idle(fx: &Fixture) {
        assert_eq!(fx.extractor.admission().in_use(), 0, "admission slot leaked");
        assert!(fx.extractor.registry().is_empty(), "registry entry leaked");
    }

    #[tokio::test(start_paused = true)]
    async fn test_progressing_process_completes_without_kill() {
        let fx = fixture(ScriptedRun::exits_after(12, Duration::from_secs(10), 0), 2);

        let outcome = fx.extractor.extract_frames(&request("a")).await.unwrap();

        assert_eq!(outcome.exit_code, 0);
        assert_eq!(outcome.frames, 12);
        assert_eq!(outcome.target, "a.mkv");
        assert!(outcome.polls >= 3, "expected several polls, got {}", outcome.polls);
        assert!(outcome.exited_cleanly());
        assert!(fx.stats.signals().is_empty(), "progressing process must not be stopped");
        settle().await;
        assert_idle(&fx);
        assert_eq!(fx.stats.live(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_steady_output_is_not_a_stall() {
        let fx = fixture(ScriptedRun::exits_after(6, Duration::from_secs(29), 0), 1);

        let outcome = fx.extractor.extract_frames(&request("a")).await.unwrap();

        assert_eq!(outcome.frames, 6);
        assert!(outcome.duration_ms >= 6 * 29_000);
        assert!(fx.stats.signals().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_process_is_killed_and_fails() {
        let fx = fixture(
            ScriptedRun::hangs_after(2, Duration::from_secs(10)).ignoring_terminate(),
            2,
        );

        let err = fx.extractor.extract_frames(&request("a")).await.unwrap_err();

        match err {
            ExtractionError::ToolFailed {
                target, exit_code, ..
            } => {
                assert_eq!(target, "a.mkv");
                assert_eq!(exit_code, STALLED_EXIT_CODE);
            }
            other => panic!("expected ToolFailed, got {:?}", other),
        }
        assert_eq!(
            fx.stats.signals(),
            vec![StopSignal::Terminate, StopSignal::Kill]
        );
        settle().await;
        assert_idle(&fx);
        assert_eq!(fx.stats.live(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stall_wins_over_exit_seen_during_termination() {
        let fx = fixture(ScriptedRun::hangs_after(0, Duration::ZERO), 2);

        let err = fx.extractor.extract_frames(&request("a")).await.unwrap_err();

        // The process honoured TERMINATE and exited with 143, still a failure
        assert!(matches!(
            err,
            ExtractionError::ToolFailed { exit_code: STALLED_EXIT_CODE, .. }
        ));
        assert_eq!(fx.stats.signals(), vec![StopSignal::Terminate]);
        assert!(err.to_string().contains("a.mkv"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_nonzero_natural_exit_is_completion() {
        let fx = fixture(ScriptedRun::exits_after(1, Duration::from_secs(1), 3), 2);

        let outcome = fx.extractor.extract_frames(&request("a")).await.unwrap();

        assert_eq!(outcome.exit_code, 3);
        assert!(!outcome.exited_cleanly());
        assert_eq!(outcome.polls, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_exit_code_defaults_to_zero() {
        let fx = fixture(
            ScriptedRun::exits_after(1, Duration::from_secs(1), 9).with_wait_error(),
            2,
        );

        let outcome = fx.extractor.extract_frames(&request("a")).await.unwrap();
        assert_eq!(outcome.exit_code, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_launch_failure_releases_slot() {
        let probe = Arc::new(MockOutputProbe::new());
        let extractor = FrameExtractor::new(
            Arc::new(MockProcessSpawner::new_failing(ErrorKind::NotFound)),
            probe,
            Arc::new(AdmissionGate::new(2)),
            Arc::new(ProcessRegistry::new()),
            Arc::new(FixedTimeProvider(0)),
            Arc::new(SequentialIdProvider::default()),
        );

        let err = extractor.extract_frames(&request("a")).await.unwrap_err();

        assert!(matches!(err, ExtractionError::Launch(_)));
        assert_eq!(extractor.admission().available(), 2);
        assert!(extractor.registry().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_request_is_rejected_before_admission() {
        let fx = fixture(ScriptedRun::exits_after(0, Duration::ZERO, 0), 1);
        let req = request("a").with_poll_interval(Duration::ZERO);

        let err = fx.extractor.extract_frames(&req).await.unwrap_err();

        assert!(matches!(
            err,
            ExtractionError::InvalidRequest(DomainError::ZeroPollInterval)
        ));
        assert_eq!(fx.stats.spawned(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_while_waiting_for_admission_starts_nothing() {
        let fx = fixture(ScriptedRun::exits_after(20, Duration::from_secs(10), 0), 1);

        let (holder_tx, holder_token) = cancel_channel();
        let holder = tokio::spawn({
            let extractor = Arc::clone(&fx.extractor);
            let req = request("a").with_cancel(holder_token);
            async move { extractor.extract_frames(&req).await }
        });
        settle().await;
        assert_eq!(fx.stats.spawned(), 1);

        let (tx, token) = cancel_channel();
        let waiter = tokio::spawn({
            let extractor = Arc::clone(&fx.extractor);
            let req = request("b").with_cancel(token);
            async move { extractor.extract_frames(&req).await }
        });

        tokio::time::sleep(Duration::from_secs(5)).await;
        tx.cancel();

        let err = waiter.await.unwrap().unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(fx.stats.spawned(), 1, "cancelled waiter must not start a process");
        assert_eq!(fx.extractor.admission().in_use(), 1);

        holder_tx.cancel();
        assert!(holder.await.unwrap().unwrap_err().is_cancelled());
        settle().await;
        assert_idle(&fx);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_mid_loop_terminates_then_releases() {
        let fx = fixture(ScriptedRun::hangs_after(100, Duration::from_secs(10)), 2);
        let (tx, token) = cancel_channel();

        let task = tokio::spawn({
            let extractor = Arc::clone(&fx.extractor);
            let req = request("a").with_cancel(token);
            async move { extractor.extract_frames(&req).await }
        });

        tokio::time::sleep(Duration::from_secs(45)).await;
        assert_eq!(fx.extractor.registry().len(), 1);
        tx.cancel();

        let err = task.await.unwrap().unwrap_err();
        assert!(matches!(err, ExtractionError::Cancelled { ref target } if target == "a.mkv"));
        assert_eq!(fx.stats.signals(), vec![StopSignal::Terminate]);
        // Released before the outcome reached us
        assert_eq!(fx.extractor.admission().in_use(), 0);
        settle().await;
        assert!(fx.extractor.registry().is_empty());
        assert_eq!(fx.stats.live(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_third_invocation_waits_for_a_slot() {
        let fx = fixture(ScriptedRun::exits_after(6, Duration::from_secs(10), 0), 2);

        let tasks: Vec<_> = ["a", "b", "c"]
            .into_iter()
            .map(|name| {
                let extractor = Arc::clone(&fx.extractor);
                let req = request(name);
                tokio::spawn(async move { extractor.extract_frames(&req).await })
            })
            .collect();

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(fx.stats.spawned(), 2);
        assert_eq!(fx.extractor.admission().in_use(), 2);
        assert_eq!(fx.extractor.registry().len(), 2);

        for task in tasks {
            let outcome = task.await.unwrap().unwrap();
            assert_eq!(outcome.frames, 6);
        }

        assert_eq!(fx.stats.spawned(), 3);
        assert_eq!(fx.stats.max_live(), 2);
        settle().await;
        assert_idle(&fx);
    }

    #[tokio::test(start_paused = true)]
    async fn test_preexisting_frames_are_not_progress() {
        let fx = fixture(ScriptedRun::hangs_after(0, Duration::ZERO), 1);
        fx.probe
            .counter(Path::new("/frames/a"))
            .store(5, Ordering::SeqCst);

        let err = fx.extractor.extract_frames(&request("a")).await.unwrap_err();
        assert!(matches!(err, ExtractionError::ToolFailed { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreadable_output_reads_as_stall() {
        let fx = fixture(ScriptedRun::hangs_after(50, Duration::from_secs(1)), 1);
        fx.probe.set_fail_reads(true);

        let err = fx.extractor.extract_frames(&request("a")).await.unwrap_err();
        assert!(matches!(err, ExtractionError::ToolFailed { .. }));
        assert!(fx.probe.frames(Path::new("/frames/a")) > 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_extraction_kills_process() {
        let fx = fixture(ScriptedRun::hangs_after(0, Duration::ZERO), 2);
        let req = request("a");

        let mut run = Box::pin(fx.extractor.extract_frames(&req));
        assert!(tokio::time::timeout(Duration::from_secs(5), &mut run)
            .await
            .is_err());
        assert_eq!(fx.extractor.registry().len(), 1);
        assert_eq!(fx.stats.live(), 1);

        drop(run);
        settle().await;

        assert_eq!(fx.stats.signals(), vec![StopSignal::Kill]);
        assert_eq!(fx.stats.live(), 0);
        assert_idle(&fx);
    }

    #[tokio::test(start_paused = true)]
    async fn test_signal_failures_still_fail_and_release() {
        let fx = fixture(
            ScriptedRun::hangs_after(2, Duration::from_secs(10)).with_failing_signals(),
            1,
        );

        let err = fx.extractor.extract_frames(&request("a")).await.unwrap_err();

        assert!(
            matches!(
                err,
                ExtractionError::ToolFailed {
                    exit_code: STALLED_EXIT_CODE,
                    ..
                }
            ),
            "got {:?}",
            err
        );
        assert!(fx.stats.signals().is_empty());
        settle().await;
        assert_idle(&fx);
        assert_eq!(fx.stats.live(), 0);
    }
}
