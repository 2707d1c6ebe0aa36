// Framewatch Infrastructure - System Adapters
// Implements: ProcessSpawner, OutputProbe (ADR-002)

pub mod output_probe;
pub mod process_spawner;
pub mod signal_stopper;

pub use output_probe::FsOutputProbe;
pub use process_spawner::TokioProcessSpawner;
pub use signal_stopper::SignalStopper;
