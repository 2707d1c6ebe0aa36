// Output Probe Port
// reason: async-trait needed for dyn dispatch (ADR-001)
use async_trait::async_trait;
use std::path::Path;

/// Observes the only externally visible side effect of an extraction:
/// frame files appearing in the output directory.
#[async_trait]
pub trait OutputProbe: Send + Sync {
    /// Count regular files in `dir` whose extension matches `extension`
    /// (case-insensitive, without the leading dot)
    ///
    /// # Errors
    /// Any I/O error reading the directory. A missing directory is reported
    /// as `ErrorKind::NotFound`.
    async fn count_matching(&self, dir: &Path, extension: &str) -> std::io::Result<usize>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    /// In-memory frame counters keyed by directory
    #[derive(Default)]
    pub struct MockOutputProbe {
        counters: Mutex<HashMap<PathBuf, Arc<AtomicUsize>>>,
        fail_reads: Mutex<bool>,
    }

    impl MockOutputProbe {
        pub fn new() -> Self {
            Self::default()
        }

        /// Counter for a directory, created on first use
        pub fn counter(&self, dir: &Path) -> Arc<AtomicUsize> {
            self.counters
                .lock()
                .unwrap()
                .entry(dir.to_path_buf())
                .or_default()
                .clone()
        }

        pub fn frames(&self, dir: &Path) -> usize {
            self.counter(dir).load(Ordering::SeqCst)
        }

        pub fn set_fail_reads(&self, fail: bool) {
            *self.fail_reads.lock().unwrap() = fail;
        }
    }

    #[async_trait]
    impl OutputProbe for MockOutputProbe {
        async fn count_matching(&self, dir: &Path, _extension: &str) -> std::io::Result<usize> {
            if *self.fail_reads.lock().unwrap() {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::PermissionDenied,
                    "mock read failure",
                ));
            }
            Ok(self.frames(dir))
        }
    }
}
