use std::sync::Arc;

use rand::Rng;
use rand_chacha::ChaCha8Rng;

use airsynth_core::Customer;

use crate::errors::GenerationError;
use crate::faker::{FakeValues, FakerValues};
use crate::model::{Batch, BatchSpec, BatchStats, TableRows};
use crate::producers::BatchProducer;

/// Produces customer rows with ids `first_row + 1 ..= first_row + rows`.
#[derive(Clone)]
pub struct CustomerProducer {
    fake: Arc<dyn FakeValues>,
    frequent_flyer_probability: f64,
}

impl CustomerProducer {
    pub fn new() -> Self {
        Self {
            fake: Arc::new(FakerValues),
            frequent_flyer_probability: 0.5,
        }
    }

    pub fn with_fake(mut self, fake: Arc<dyn FakeValues>) -> Self {
        self.fake = fake;
        self
    }
}

impl Default for CustomerProducer {
    fn default() -> Self {
        Self::new()
    }
}

impl BatchProducer for CustomerProducer {
    fn name(&self) -> &'static str {
        "customers"
    }

    fn produce(&self, rng: &mut ChaCha8Rng, spec: BatchSpec) -> Result<Batch, GenerationError> {
        let customers = (0..spec.rows as u64)
            .map(|offset| Customer {
                id: spec.first_row + offset + 1,
                full_name: self.fake.full_name(rng),
                email: self.fake.email(rng),
                frequent_flyer: rng.random_bool(self.frequent_flyer_probability),
            })
            .collect();

        let stats = BatchStats {
            slots_requested: spec.rows as u64,
            ..BatchStats::default()
        };
        Ok(Batch::new(spec.index, vec![TableRows::Customers(customers)]).with_stats(stats))
    }
}
