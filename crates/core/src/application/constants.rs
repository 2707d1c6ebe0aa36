// Supervision constants (ADR: No magic values)
use std::time::Duration;

/// Window for both the natural-exit wait and the output progress sample (30s)
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Time a stalled process gets between TERMINATE and KILL (1s)
pub const DEFAULT_TERMINATION_GRACE: Duration = Duration::from_millis(1000);

/// Wait for the exit notification after KILL (5s)
pub const KILL_REAP_TIMEOUT: Duration = Duration::from_secs(5);

/// Extraction processes allowed to run at once
pub const DEFAULT_MAX_CONCURRENT: usize = 2;

/// Frame files counted as progress
pub const DEFAULT_FRAME_EXTENSION: &str = "jpg";
