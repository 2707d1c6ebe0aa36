// Extraction Outcome Domain Model

use serde::{Deserialize, Serialize};

/// Exit code reported when the supervisor had to stop the process itself
pub const STALLED_EXIT_CODE: i32 = -1;

/// What the exit notification observed
///
/// `exit_code` is None when the code could not be captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitRecord {
    pub exit_code: Option<i32>,
}

/// Successful completion of one extraction invocation
///
/// A natural non-zero exit still lands here; interpreting the code is up to
/// the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionOutcome {
    pub target: String,
    pub exit_code: i32,
    pub frames: usize,
    pub polls: u32,
    pub duration_ms: u64,
}

impl ExtractionOutcome {
    pub fn exited_cleanly(&self) -> bool {
        self.exit_code == 0
    }
}

/// Final status precedence: a stall always wins over any exit code observed
/// while the process was being stopped.
pub fn final_exit_code(ran_to_completion: bool, record: Option<ExitRecord>) -> i32 {
    if ran_to_completion {
        record.and_then(|r| r.exit_code).unwrap_or(0)
    } else {
        STALLED_EXIT_CODE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_final_exit_code_completed() {
        let record = Some(ExitRecord { exit_code: Some(3) });
        assert_eq!(final_exit_code(true, record), 3);
    }

    #[test]
    fn test_final_exit_code_unknown_defaults_to_zero() {
        assert_eq!(final_exit_code(true, Some(ExitRecord { exit_code: None })), 0);
        assert_eq!(final_exit_code(true, None), 0);
    }

    #[test]
    fn test_stall_wins_over_observed_exit() {
        let killed = Some(ExitRecord {
            exit_code: Some(137),
        });
        assert_eq!(final_exit_code(false, killed), STALLED_EXIT_CODE);

        let clean = Some(ExitRecord { exit_code: Some(0) });
        assert_eq!(final_exit_code(false, clean), STALLED_EXIT_CODE);
    }
}
