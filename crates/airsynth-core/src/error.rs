use thiserror::Error;

use crate::pool::{ResourceId, ResourceKind};

/// Core error type shared across airsynth crates.
#[derive(Debug, Error)]
pub enum Error {
    /// An interval whose end precedes its start.
    #[error("invalid interval: end {end} precedes start {start}")]
    InvalidInterval { start: String, end: String },
    /// A reservation was requested for an identity outside the pool.
    #[error("unknown {kind} resource: {id}")]
    UnknownResource { kind: ResourceKind, id: ResourceId },
    /// A pool was built without any identities.
    #[error("empty {0} pool")]
    EmptyPool(ResourceKind),
}

/// Convenience alias for results returned by airsynth crates.
pub type Result<T> = std::result::Result<T, Error>;
