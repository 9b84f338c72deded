//! Pipeline orchestration: scheduling, the run loop, checkpointing, and the
//! advisory quality gate.

pub mod checkpoint;
pub mod quality;
pub mod runner;
pub mod scheduler;

pub use checkpoint::CheckpointManager;
pub use quality::{QualityGate, QualityLevel, QualityReport};
pub use runner::PipelineRunner;
