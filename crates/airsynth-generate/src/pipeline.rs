//! Producer/consumer batch pipeline.
//!
//! A run moves through `configured -> running -> draining -> done`:
//! producers synthesize batches into a bounded queue, consumers write them
//! through a [`SinkFactory`] with bounded retries, and the calling thread
//! polls the settled-batch count until every batch is accounted for.

use std::any::Any;
use std::ops::Range;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, ScopedJoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, bounded};
use indicatif::{ProgressBar, ProgressStyle};
use parking_lot::Mutex;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::errors::GenerationError;
use crate::model::{Batch, BatchSpec, ParkedBatch, PipelineReport};
use crate::producers::{BatchProducer, batch_seed};
use crate::sink::{BatchSink, SinkError, SinkFactory};

const POLL_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid pipeline config: {0}")]
    InvalidConfig(String),
    #[error("producer failed on batch {index}: {source}")]
    Producer {
        index: u64,
        #[source]
        source: Box<GenerationError>,
    },
    #[error("batch {index} failed after {attempts} attempts: {error}")]
    BatchFailed {
        index: u64,
        attempts: u32,
        error: String,
    },
    #[error("failed to open sink: {0}")]
    SinkOpen(#[source] SinkError),
    #[error("worker panicked: {0}")]
    WorkerPanicked(String),
}

/// What to do with a row count that is not a multiple of the batch size.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Remainder {
    /// Fail validation.
    #[default]
    Reject,
    /// Drop the tail rows.
    Truncate,
    /// Emit one final short batch.
    PartialBatch,
}

/// What a consumer does with a batch whose retries are exhausted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnExhausted {
    /// Keep the batch in the outcome for reprocessing.
    #[default]
    Park,
    /// Stop the run and report the failure.
    Abort,
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub num_rows: u64,
    pub batch_size: usize,
    pub num_producers: usize,
    pub num_consumers: usize,
    pub queue_capacity: usize,
    /// Total write attempts per batch, including the first.
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub remainder: Remainder,
    pub on_exhausted: OnExhausted,
    pub seed: u64,
    pub show_progress: bool,
}

impl PipelineConfig {
    pub fn new(num_rows: u64) -> Self {
        Self {
            num_rows,
            batch_size: 5000,
            num_producers: 8,
            num_consumers: 3,
            queue_capacity: 16,
            max_retries: 3,
            retry_delay: Duration::from_millis(500),
            remainder: Remainder::default(),
            on_exhausted: OnExhausted::default(),
            seed: 0,
            show_progress: false,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_workers(mut self, producers: usize, consumers: usize) -> Self {
        self.num_producers = producers;
        self.num_consumers = consumers;
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn with_retries(mut self, max_retries: u32, retry_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_delay = retry_delay;
        self
    }

    pub fn with_remainder(mut self, remainder: Remainder) -> Self {
        self.remainder = remainder;
        self
    }

    pub fn with_on_exhausted(mut self, on_exhausted: OnExhausted) -> Self {
        self.on_exhausted = on_exhausted;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        let zero = [
            ("batch_size", self.batch_size == 0),
            ("num_producers", self.num_producers == 0),
            ("num_consumers", self.num_consumers == 0),
            ("queue_capacity", self.queue_capacity == 0),
            ("max_retries", self.max_retries == 0),
        ];
        if let Some((name, _)) = zero.iter().find(|(_, is_zero)| *is_zero) {
            return Err(PipelineError::InvalidConfig(format!(
                "{name} must be greater than zero"
            )));
        }
        if self.remainder == Remainder::Reject && self.num_rows % self.batch_size as u64 != 0 {
            return Err(PipelineError::InvalidConfig(format!(
                "num_rows {} is not a multiple of batch_size {}",
                self.num_rows, self.batch_size
            )));
        }
        Ok(())
    }

    /// Validates and splits the row count into batches.
    pub fn batch_plan(&self) -> Result<BatchPlan, PipelineError> {
        self.validate()?;
        let batch_size = self.batch_size as u64;
        let full_batches = self.num_rows / batch_size;
        let tail = self.num_rows % batch_size;
        let (tail_rows, truncated_rows) = match self.remainder {
            Remainder::PartialBatch => (tail as usize, 0),
            Remainder::Truncate | Remainder::Reject => (0, tail),
        };
        Ok(BatchPlan {
            batch_size: self.batch_size,
            full_batches,
            tail_rows,
            truncated_rows,
        })
    }
}

/// Batch layout of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchPlan {
    pub batch_size: usize,
    pub full_batches: u64,
    /// Rows in the trailing short batch, zero if there is none.
    pub tail_rows: usize,
    pub truncated_rows: u64,
}

impl BatchPlan {
    pub fn batch_count(&self) -> u64 {
        self.full_batches + u64::from(self.tail_rows > 0)
    }

    pub fn spec(&self, index: u64) -> BatchSpec {
        let rows = if index < self.full_batches {
            self.batch_size
        } else {
            self.tail_rows
        };
        BatchSpec {
            index,
            first_row: index * self.batch_size as u64,
            rows,
        }
    }
}

/// Splits `total` batch indices into contiguous ranges, one per worker.
///
/// The remainder goes one-per-worker to the earliest workers; with more
/// workers than batches the extras get empty ranges.
pub fn partition_batches(total: u64, workers: usize) -> Vec<Range<u64>> {
    if workers == 0 {
        return Vec::new();
    }
    let base = total / workers as u64;
    let extra = total % workers as u64;
    let mut start = 0;
    (0..workers as u64)
        .map(|worker| {
            let count = base + u64::from(worker < extra);
            let range = start..start + count;
            start += count;
            range
        })
        .collect()
}

/// Queue payload.
#[derive(Debug)]
pub enum WorkItem {
    Batch(Batch),
    /// Tells one consumer to exit.
    Shutdown,
}

#[derive(Debug)]
pub struct PipelineOutcome {
    pub report: PipelineReport,
    /// Batches whose writes were exhausted, ordered by index.
    pub parked: Vec<ParkedBatch>,
}

#[derive(Default)]
struct RunState {
    produced: AtomicU64,
    committed: AtomicU64,
    parked: AtomicU64,
    halted: AtomicBool,
    failure: Mutex<Option<PipelineError>>,
}

impl RunState {
    fn settled(&self) -> u64 {
        self.committed.load(Ordering::SeqCst) + self.parked.load(Ordering::SeqCst)
    }

    fn is_halted(&self) -> bool {
        self.halted.load(Ordering::SeqCst)
    }

    /// Records the first failure and stops the run.
    fn fail(&self, err: PipelineError) {
        let mut failure = self.failure.lock();
        if failure.is_none() {
            *failure = Some(err);
        }
        self.halted.store(true, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct ConsumerTally {
    report: PipelineReport,
    parked: Vec<ParkedBatch>,
}

/// Runs one pipeline to completion.
///
/// Returns once every batch is committed or parked. A producer error, a
/// sink that cannot be opened, or an exhausted batch under
/// [`OnExhausted::Abort`] stops the run and is returned as the error.
pub fn run_pipeline<P, F>(
    config: &PipelineConfig,
    producer: &P,
    sinks: &F,
) -> Result<PipelineOutcome, PipelineError>
where
    P: BatchProducer + ?Sized,
    F: SinkFactory,
{
    let plan = config.batch_plan()?;
    let total = plan.batch_count();
    let mut report = PipelineReport::new(producer.name());
    report.rows_requested = config.num_rows;
    report.rows_truncated = plan.truncated_rows;
    report.batches_total = total;

    if plan.truncated_rows > 0 {
        warn!(
            producer = producer.name(),
            truncated_rows = plan.truncated_rows,
            batch_size = config.batch_size,
            "row count truncated to a whole number of batches"
        );
    }
    if total == 0 {
        info!(producer = producer.name(), "pipeline has no batches");
        return Ok(PipelineOutcome {
            report,
            parked: Vec::new(),
        });
    }

    info!(
        producer = producer.name(),
        rows = config.num_rows,
        batches = total,
        batch_size = config.batch_size,
        producers = config.num_producers,
        consumers = config.num_consumers,
        queue_capacity = config.queue_capacity,
        "pipeline started"
    );

    let started = Instant::now();
    let state = RunState::default();
    let progress = progress_bar(total, config.show_progress, producer.name());
    let (tx, rx) = bounded::<WorkItem>(config.queue_capacity);
    let ranges = partition_batches(total, config.num_producers);

    let (tallies, panics) = thread::scope(|scope| {
        let consumers: Vec<ScopedJoinHandle<'_, ConsumerTally>> = (0..config.num_consumers)
            .map(|worker| {
                let rx = rx.clone();
                let state = &state;
                let label = producer.name();
                scope.spawn(move || consume(worker, label, rx, sinks, config, state))
            })
            .collect();
        drop(rx);

        let producers: Vec<ScopedJoinHandle<'_, ()>> = ranges
            .into_iter()
            .enumerate()
            .map(|(worker, range)| {
                let tx = tx.clone();
                let state = &state;
                let plan = &plan;
                scope.spawn(move || produce(worker, range, plan, producer, config, tx, state))
            })
            .collect();

        loop {
            let settled = state.settled();
            progress.set_position(settled);
            if settled >= total || state.is_halted() {
                break;
            }
            let producers_done = producers.iter().all(|handle| handle.is_finished());
            if producers_done && settled >= state.produced.load(Ordering::SeqCst) {
                break;
            }
            // Consumers only exit on shutdown, so an early exit is a panic.
            if consumers.iter().any(|handle| handle.is_finished()) {
                break;
            }
            thread::sleep(POLL_INTERVAL);
        }

        let mut panics = Vec::new();
        for (worker, handle) in producers.into_iter().enumerate() {
            if let Err(panic) = handle.join() {
                panics.push(format!("producer {worker}: {}", panic_message(panic)));
            }
        }
        for _ in 0..config.num_consumers {
            if tx.send(WorkItem::Shutdown).is_err() {
                break;
            }
        }
        drop(tx);

        let mut tallies = Vec::new();
        for (worker, handle) in consumers.into_iter().enumerate() {
            match handle.join() {
                Ok(tally) => tallies.push(tally),
                Err(panic) => panics.push(format!("consumer {worker}: {}", panic_message(panic))),
            }
        }
        (tallies, panics)
    });

    progress.set_position(state.settled());
    progress.finish_and_clear();

    if let Some(err) = state.failure.lock().take() {
        error!(producer = producer.name(), error = %err, "pipeline stopped");
        return Err(err);
    }
    if !panics.is_empty() {
        return Err(PipelineError::WorkerPanicked(format!(
            "{} pipeline: {}",
            producer.name(),
            panics.join("; ")
        )));
    }

    let mut parked = Vec::new();
    for tally in tallies {
        report.absorb(&tally.report);
        parked.extend(tally.parked);
    }
    parked.sort_by_key(|item| item.batch.index);

    if report.batches_committed + report.batches_parked != total {
        return Err(PipelineError::WorkerPanicked(format!(
            "{} of {total} batches settled in {} pipeline",
            report.batches_committed + report.batches_parked,
            producer.name()
        )));
    }

    let elapsed = started.elapsed();
    report.duration_ms = elapsed.as_millis() as u64;
    report.batches_per_sec = if elapsed.as_secs_f64() > 0.0 {
        total as f64 / elapsed.as_secs_f64()
    } else {
        0.0
    };

    info!(
        producer = producer.name(),
        batches_committed = report.batches_committed,
        batches_parked = report.batches_parked,
        retries = report.retries_total,
        slots_skipped = report.stats.slots_skipped,
        duration_ms = report.duration_ms,
        batches_per_sec = report.batches_per_sec,
        "pipeline finished"
    );

    Ok(PipelineOutcome { report, parked })
}

fn produce<P: BatchProducer + ?Sized>(
    worker: usize,
    range: Range<u64>,
    plan: &BatchPlan,
    producer: &P,
    config: &PipelineConfig,
    tx: Sender<WorkItem>,
    state: &RunState,
) {
    debug!(worker, first = range.start, end = range.end, "producer started");
    for index in range {
        if state.is_halted() {
            break;
        }
        let spec = plan.spec(index);
        let mut rng = ChaCha8Rng::seed_from_u64(batch_seed(config.seed, index));
        let batch = match producer.produce(&mut rng, spec) {
            Ok(batch) => batch,
            Err(err) => {
                state.fail(PipelineError::Producer {
                    index,
                    source: Box::new(err),
                });
                break;
            }
        };
        if tx.send(WorkItem::Batch(batch)).is_err() {
            break;
        }
        state.produced.fetch_add(1, Ordering::SeqCst);
    }
}

fn consume<F: SinkFactory>(
    worker: usize,
    label: &'static str,
    rx: Receiver<WorkItem>,
    sinks: &F,
    config: &PipelineConfig,
    state: &RunState,
) -> ConsumerTally {
    let mut tally = ConsumerTally::default();
    let mut sink = match sinks.open() {
        Ok(sink) => Some(sink),
        Err(err) => {
            error!(worker, error = %err, "consumer could not open sink");
            state.fail(PipelineError::SinkOpen(err));
            None
        }
    };

    while let Ok(item) = rx.recv() {
        let batch = match item {
            WorkItem::Batch(batch) => batch,
            WorkItem::Shutdown => break,
        };
        // Halted runs drain the queue so producers never block on a full channel.
        let Some(sink) = sink.as_mut().filter(|_| !state.is_halted()) else {
            continue;
        };

        let (attempts, result) = write_with_retry(
            sink,
            &batch,
            worker,
            config.max_retries,
            config.retry_delay,
        );
        tally
            .report
            .record_retries(u64::from(attempts.saturating_sub(1)));
        match result {
            Ok(()) => {
                tally.report.record_commit(&batch);
                state.committed.fetch_add(1, Ordering::SeqCst);
                debug!(
                    worker,
                    batch = batch.index,
                    rows = batch.rows(),
                    attempts,
                    "batch committed"
                );
            }
            Err(err) => match config.on_exhausted {
                OnExhausted::Park => {
                    warn!(
                        worker,
                        batch = batch.index,
                        attempts,
                        error = %err,
                        "batch parked after exhausting retries"
                    );
                    tally.report.record_parked();
                    tally.parked.push(ParkedBatch {
                        producer: label.to_string(),
                        batch,
                        attempts,
                        error: err.to_string(),
                    });
                    state.parked.fetch_add(1, Ordering::SeqCst);
                }
                OnExhausted::Abort => {
                    error!(
                        worker,
                        batch = batch.index,
                        attempts,
                        error = %err,
                        "batch failed, aborting run"
                    );
                    state.fail(PipelineError::BatchFailed {
                        index: batch.index,
                        attempts,
                        error: err.to_string(),
                    });
                }
            },
        }
    }
    tally
}

/// Attempts the write up to `max_attempts` times with a fixed delay between
/// attempts. Returns the attempts used and the final result.
fn write_with_retry<S: BatchSink>(
    sink: &mut S,
    batch: &Batch,
    worker: usize,
    max_attempts: u32,
    delay: Duration,
) -> (u32, Result<(), SinkError>) {
    let mut attempt = 1;
    loop {
        match sink.write_batch(batch) {
            Ok(()) => return (attempt, Ok(())),
            Err(err) if attempt >= max_attempts => return (attempt, Err(err)),
            Err(err) => {
                warn!(
                    worker,
                    batch = batch.index,
                    attempt,
                    max_attempts,
                    error = %err,
                    "sink write failed, retrying"
                );
                thread::sleep(delay);
                attempt += 1;
            }
        }
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic in pipeline worker".to_string()
    }
}

fn progress_bar(total: u64, visible: bool, label: &'static str) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(total);
    if let Ok(style) = ProgressStyle::with_template(
        "{spinner:.green} {prefix} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} batches ({eta})",
    ) {
        bar.set_style(style.progress_chars("#>-"));
    }
    bar.set_prefix(label);
    bar
}
