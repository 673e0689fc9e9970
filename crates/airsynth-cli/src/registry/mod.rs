mod logging;
mod run;

pub use logging::init_run_logging;
pub use run::{RunContext, RunPaths, redact_url, start_run, write_parked, write_report};

use thiserror::Error;

/// Registry-level errors for run artifacts.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("logging error: {0}")]
    Logging(String),
    #[error("failed to park {producer} batch {index}: {source}")]
    ParkedWrite {
        producer: String,
        index: u64,
        #[source]
        source: Box<RegistryError>,
    },
}

/// Result type for registry operations.
pub type RegistryResult<T> = std::result::Result<T, RegistryError>;
