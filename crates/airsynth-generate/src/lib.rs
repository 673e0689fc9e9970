//! Synthetic airline dataset generation for airsynth.
//!
//! Producers synthesize batches of flights, crews and bookings while
//! reserving time on shared resource books; the pipeline fans those batches
//! out to sink sessions with bounded retries.

pub mod allocator;
pub mod engine;
pub mod errors;
pub mod faker;
pub mod model;
pub mod pipeline;
pub mod producers;
pub mod reference;
pub mod sink;

pub use allocator::{Allocator, SampleRange};
pub use engine::{SynthesisEngine, SynthesisResult};
pub use errors::GenerationError;
pub use faker::{FakeValues, FakerValues};
pub use model::{
    Batch, BatchSpec, BatchStats, ParkedBatch, PipelineReport, PipelineSettings, Sizing,
    SynthesisOptions, SynthesisReport, TableRows,
};
pub use pipeline::{
    OnExhausted, PipelineConfig, PipelineError, PipelineOutcome, Remainder, WorkItem,
    partition_batches, run_pipeline,
};
pub use producers::BatchProducer;
pub use reference::{FleetPlan, ReferenceData, synthesize_reference};
pub use sink::{BatchSink, CsvSinkFactory, FlightLedger, SinkError, SinkFactory};
