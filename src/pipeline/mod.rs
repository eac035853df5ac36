// Batch pipeline: per-source stages, the transformations they share, and
// the orchestrator that runs them in order.

pub mod orchestrator;
pub mod processing;
pub mod steps;

pub use orchestrator::{PipelineExecutionResult, PipelineOrchestrator};
pub use steps::{Stage, StageResult};
