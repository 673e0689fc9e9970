use thiserror::Error;

use crate::pipeline::PipelineError;
use crate::sink::SinkError;

/// Errors emitted by producers and the synthesis engine.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("core error: {0}")]
    Core(#[from] airsynth_core::Error),
    #[error("sink error: {0}")]
    Sink(#[from] SinkError),
    #[error("{phase} phase failed: {source}")]
    Phase {
        phase: &'static str,
        #[source]
        source: PipelineError,
    },
}
