//! Randomized, bounded-cost resource probes over a shared [`ScheduleBook`].
//!
//! Probes are best-effort: a miss means none of the sampled identities were
//! free, not that the whole pool is booked. Under saturation this under-fills
//! assignments, which is acceptable for synthetic data.

use rand::Rng;
use rand::seq::index;
use serde::{Deserialize, Serialize};

use airsynth_core::{Interval, ResourceId, Result, ScheduleBook};

/// Inclusive `[min, max]` bounds, always ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(usize, usize)", into = "(usize, usize)")]
pub struct SampleRange {
    min: usize,
    max: usize,
}

impl SampleRange {
    pub fn new(a: usize, b: usize) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    pub fn min(&self) -> usize {
        self.min
    }

    pub fn max(&self) -> usize {
        self.max
    }

    fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> usize {
        rng.random_range(self.min..=self.max)
    }
}

impl From<(usize, usize)> for SampleRange {
    fn from((a, b): (usize, usize)) -> Self {
        Self::new(a, b)
    }
}

impl From<SampleRange> for (usize, usize) {
    fn from(range: SampleRange) -> Self {
        (range.min, range.max)
    }
}

impl Default for SampleRange {
    fn default() -> Self {
        Self::new(120, 160)
    }
}

/// Assigns identities from one pool to time windows.
#[derive(Debug, Clone, Copy)]
pub struct Allocator<'a> {
    book: &'a ScheduleBook,
    sample: SampleRange,
}

impl<'a> Allocator<'a> {
    pub fn new(book: &'a ScheduleBook) -> Self {
        Self {
            book,
            sample: SampleRange::default(),
        }
    }

    pub fn with_sample(mut self, sample: SampleRange) -> Self {
        self.sample = sample;
        self
    }

    pub fn book(&self) -> &'a ScheduleBook {
        self.book
    }

    /// Samples without replacement from `candidates` and reserves the first
    /// identity that is free for `interval`.
    ///
    /// The sample size is drawn from the configured range and clamped to the
    /// candidate count.
    pub fn pick_from_candidates<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        candidates: &[ResourceId],
        interval: Interval,
    ) -> Result<Option<ResourceId>> {
        if candidates.is_empty() {
            return Ok(None);
        }
        let amount = self.sample.draw(rng).min(candidates.len());
        for idx in index::sample(rng, candidates.len(), amount) {
            let id = candidates[idx];
            if self.book.try_reserve(id, interval)? {
                return Ok(Some(id));
            }
        }
        Ok(None)
    }

    /// Same as [`pick_from_candidates`] over the whole pool.
    ///
    /// [`pick_from_candidates`]: Allocator::pick_from_candidates
    pub fn pick_from_pool<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        interval: Interval,
    ) -> Result<Option<ResourceId>> {
        self.pick_from_candidates(rng, self.book.ids(), interval)
    }

    /// Single-shot probe of one uniformly drawn identity in `1..=pool_size`.
    pub fn pick_uniform<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        pool_size: u64,
        interval: Interval,
    ) -> Result<Option<ResourceId>> {
        if pool_size == 0 {
            return Ok(None);
        }
        let id = rng.random_range(1..=pool_size);
        Ok(self.book.try_reserve(id, interval)?.then_some(id))
    }
}
