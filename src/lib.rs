pub mod config;
pub mod constants;
pub mod error;
pub mod keys;
pub mod logging;
pub mod pipeline;
pub mod storage;
pub mod table;

pub use config::Config;
pub use error::{EtlError, Result};
pub use pipeline::{PipelineExecutionResult, PipelineOrchestrator};
