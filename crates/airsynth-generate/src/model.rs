use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use airsynth_core::{
    Airplane, Airport, CabinCrewMember, Customer, Flight, FlightBooking, FlightCabinCrew, Pilot,
};

use crate::pipeline::{OnExhausted, PipelineConfig, Remainder};
use crate::producers::{ComplementShape, FlightTimetable};
use crate::reference::FleetPlan;

/// Deterministic coordinates of one batch within a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSpec {
    /// Zero-based batch index; also seeds the batch's random stream.
    pub index: u64,
    /// Global offset of the batch's first row.
    pub first_row: u64,
    /// Number of rows (slots) the producer is asked for.
    pub rows: usize,
}

/// Rows of one table inside a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "table", content = "rows", rename_all = "snake_case")]
pub enum TableRows {
    Customers(Vec<Customer>),
    Pilots(Vec<Pilot>),
    CabinCrew(Vec<CabinCrewMember>),
    Airports(Vec<Airport>),
    Airplanes(Vec<Airplane>),
    Flights(Vec<Flight>),
    FlightCabinCrew(Vec<FlightCabinCrew>),
    FlightBookings(Vec<FlightBooking>),
}

impl TableRows {
    pub fn table_name(&self) -> &'static str {
        match self {
            TableRows::Customers(_) => "customers",
            TableRows::Pilots(_) => "pilots",
            TableRows::CabinCrew(_) => "cabin_crew",
            TableRows::Airports(_) => "airports",
            TableRows::Airplanes(_) => "airplanes",
            TableRows::Flights(_) => "flights",
            TableRows::FlightCabinCrew(_) => "flight_cabin_crew",
            TableRows::FlightBookings(_) => "flight_bookings",
        }
    }

    pub fn len(&self) -> usize {
        match self {
            TableRows::Customers(rows) => rows.len(),
            TableRows::Pilots(rows) => rows.len(),
            TableRows::CabinCrew(rows) => rows.len(),
            TableRows::Airports(rows) => rows.len(),
            TableRows::Airplanes(rows) => rows.len(),
            TableRows::Flights(rows) => rows.len(),
            TableRows::FlightCabinCrew(rows) => rows.len(),
            TableRows::FlightBookings(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Allocation outcomes a producer observed while building a batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchStats {
    pub slots_requested: u64,
    /// Slots omitted because no aircraft had a free block.
    pub slots_skipped: u64,
    pub cancelled: u64,
    pub unassigned_pilots: u64,
    pub unassigned_crew: u64,
    pub unassigned_passengers: u64,
}

impl BatchStats {
    pub fn merge(&mut self, other: &BatchStats) {
        self.slots_requested += other.slots_requested;
        self.slots_skipped += other.slots_skipped;
        self.cancelled += other.cancelled;
        self.unassigned_pilots += other.unassigned_pilots;
        self.unassigned_crew += other.unassigned_crew;
        self.unassigned_passengers += other.unassigned_passengers;
    }
}

/// One unit of generated entities, produced and consumed as a whole.
///
/// Tables are written in order, so parents precede children.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    pub index: u64,
    pub tables: Vec<TableRows>,
    #[serde(default)]
    pub stats: BatchStats,
}

impl Batch {
    pub fn new(index: u64, tables: Vec<TableRows>) -> Self {
        Self {
            index,
            tables,
            stats: BatchStats::default(),
        }
    }

    pub fn with_stats(mut self, stats: BatchStats) -> Self {
        self.stats = stats;
        self
    }

    /// Total rows across every table.
    pub fn rows(&self) -> u64 {
        self.tables.iter().map(|table| table.len() as u64).sum()
    }
}

/// A batch whose sink writes were exhausted, kept for reprocessing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParkedBatch {
    /// Name of the producer whose pipeline parked the batch.
    pub producer: String,
    pub batch: Batch,
    pub attempts: u32,
    pub error: String,
}

/// Summary of one pipeline run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineReport {
    pub producer: String,
    pub rows_requested: u64,
    /// Rows dropped by remainder truncation.
    pub rows_truncated: u64,
    pub batches_total: u64,
    pub batches_committed: u64,
    pub batches_parked: u64,
    pub retries_total: u64,
    pub rows_written: BTreeMap<String, u64>,
    pub stats: BatchStats,
    pub duration_ms: u64,
    pub batches_per_sec: f64,
}

impl PipelineReport {
    pub fn new(producer: &str) -> Self {
        Self {
            producer: producer.to_string(),
            ..Self::default()
        }
    }

    pub fn record_commit(&mut self, batch: &Batch) {
        self.batches_committed += 1;
        for table in &batch.tables {
            *self
                .rows_written
                .entry(table.table_name().to_string())
                .or_insert(0) += table.len() as u64;
        }
        self.stats.merge(&batch.stats);
    }

    pub fn record_parked(&mut self) {
        self.batches_parked += 1;
    }

    pub fn record_retries(&mut self, retries: u64) {
        self.retries_total += retries;
    }

    /// Folds a per-worker tally into the run report.
    pub fn absorb(&mut self, other: &PipelineReport) {
        self.batches_committed += other.batches_committed;
        self.batches_parked += other.batches_parked;
        self.retries_total += other.retries_total;
        for (table, rows) in &other.rows_written {
            *self.rows_written.entry(table.clone()).or_insert(0) += rows;
        }
        self.stats.merge(&other.stats);
    }

    pub fn rows_for(&self, table: &str) -> u64 {
        self.rows_written.get(table).copied().unwrap_or(0)
    }
}

/// Derived row estimates for a synthesis run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sizing {
    pub annual_flights: u64,
    pub annual_passengers: u64,
    pub pilots: u64,
    pub cabin_crew: u64,
    pub airports: u64,
    pub aircraft: u64,
    pub customers: u64,
}

/// Report for a full multi-phase synthesis run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisReport {
    pub run_id: String,
    pub seed: u64,
    pub sizing: Sizing,
    pub reference_rows: BTreeMap<String, u64>,
    pub phases: Vec<PipelineReport>,
    pub parked_total: u64,
    pub duration_ms: u64,
}

impl SynthesisReport {
    pub fn new(run_id: String, seed: u64, sizing: Sizing) -> Self {
        Self {
            run_id,
            seed,
            sizing,
            reference_rows: BTreeMap::new(),
            phases: Vec::new(),
            parked_total: 0,
            duration_ms: 0,
        }
    }

    pub fn record_phase(&mut self, report: PipelineReport) {
        self.parked_total += report.batches_parked;
        self.phases.push(report);
    }

    pub fn phase(&self, producer: &str) -> Option<&PipelineReport> {
        self.phases.iter().find(|phase| phase.producer == producer)
    }
}

/// Worker and retry settings shared by every phase of a synthesis run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    pub num_producers: usize,
    pub num_consumers: usize,
    pub queue_capacity: usize,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    /// Derived row counts rarely divide evenly, so phases default to a
    /// trailing short batch.
    pub remainder: Remainder,
    pub on_exhausted: OnExhausted,
    pub show_progress: bool,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        let defaults = PipelineConfig::new(0);
        Self {
            num_producers: defaults.num_producers,
            num_consumers: defaults.num_consumers,
            queue_capacity: defaults.queue_capacity,
            max_retries: defaults.max_retries,
            retry_delay_ms: defaults.retry_delay.as_millis() as u64,
            remainder: Remainder::PartialBatch,
            on_exhausted: OnExhausted::Park,
            show_progress: true,
        }
    }
}

impl PipelineSettings {
    /// Pipeline config for one phase.
    pub fn config(&self, num_rows: u64, batch_size: usize, seed: u64) -> PipelineConfig {
        PipelineConfig::new(num_rows)
            .with_batch_size(batch_size)
            .with_workers(self.num_producers, self.num_consumers)
            .with_queue_capacity(self.queue_capacity)
            .with_retries(self.max_retries, Duration::from_millis(self.retry_delay_ms))
            .with_remainder(self.remainder)
            .with_on_exhausted(self.on_exhausted)
            .with_seed(seed)
            .with_progress(self.show_progress)
    }
}

/// Options for a full synthesis run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisOptions {
    pub seed: u64,
    pub plan: FleetPlan,
    pub pipeline: PipelineSettings,
    pub timetable: FlightTimetable,
    pub complement: ComplementShape,
}
