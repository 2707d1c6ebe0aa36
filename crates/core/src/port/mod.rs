// Port Layer - Interfaces for external dependencies

pub mod id_provider; // For deterministic testing
pub mod output_probe;
pub mod process;
pub mod time_provider;

// Re-exports
pub use id_provider::IdProvider;
pub use output_probe::OutputProbe;
pub use process::{
    LaunchError, ProcessSpawner, ProcessStopper, SignalError, SpawnedProcess, StopSignal,
};
pub use time_provider::TimeProvider;
