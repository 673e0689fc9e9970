//! Batch producers: pure functions of (random stream, batch coordinates,
//! shared resource state) that synthesize one batch of entities.

mod complement;
mod customers;
mod flights;

pub use complement::{ComplementProducer, ComplementShape, FlightSlot};
pub use customers::CustomerProducer;
pub use flights::{FlightProducer, FlightTimetable, airport_delay_probabilities};

use rand_chacha::ChaCha8Rng;

use crate::errors::GenerationError;
use crate::model::{Batch, BatchSpec};

/// Strategy the pipeline calls once per batch.
///
/// Implementations carry their extra arguments (pools, shared books) as
/// fields. The random stream is owned by the calling worker and seeded from
/// the batch index, so a batch is reproducible given the same shared state.
pub trait BatchProducer: Sync {
    /// Stable label used in logs and reports.
    fn name(&self) -> &'static str;

    fn produce(&self, rng: &mut ChaCha8Rng, spec: BatchSpec) -> Result<Batch, GenerationError>;
}

/// Derives a named sub-seed, so phases of one run draw independent streams.
pub fn hash_seed(seed: u64, key: &str) -> u64 {
    let mut hash = seed ^ 0xcbf29ce484222325;
    for byte in key.as_bytes() {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

/// Seed for one batch's random stream.
pub fn batch_seed(run_seed: u64, batch_index: u64) -> u64 {
    let mut hash = run_seed ^ batch_index.wrapping_mul(0x9e3779b97f4a7c15);
    hash ^= hash >> 29;
    hash = hash.wrapping_mul(0x100000001b3);
    hash
}
