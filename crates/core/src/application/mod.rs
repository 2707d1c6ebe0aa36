// Application Layer - Supervision services

pub mod admission;
pub mod cancel;
pub mod constants;
pub mod extractor;
pub mod process_handle;
pub mod registry;

// Re-exports
pub use admission::{AdmissionError, AdmissionGate, AdmissionPermit};
pub use cancel::{cancel_channel, CancelSender, CancelToken};
pub use extractor::{ExtractionError, FrameExtractor, InvocationRequest};
pub use process_handle::ProcessHandle;
pub use registry::{HandleId, ProcessRegistry, RunningProcess};
