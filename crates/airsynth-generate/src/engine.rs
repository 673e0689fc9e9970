use std::sync::Arc;
use std::time::Instant;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{info, warn};

use airsynth_core::{Fleet, ResourceKind, ScheduleBook};

use crate::errors::GenerationError;
use crate::faker::{FakeValues, FakerValues};
use crate::model::{ParkedBatch, PipelineReport, Sizing, SynthesisOptions, SynthesisReport};
use crate::pipeline::{PipelineError, PipelineOutcome, run_pipeline};
use crate::producers::{
    ComplementProducer, CustomerProducer, FlightProducer, airport_delay_probabilities, hash_seed,
};
use crate::reference::{ReferenceProducer, synthesize_reference};
use crate::sink::{FlightLedger, SinkFactory};

/// Result of a synthesis run.
#[derive(Debug)]
pub struct SynthesisResult {
    pub report: SynthesisReport,
    /// Parked batches from every phase, in phase order.
    pub parked: Vec<ParkedBatch>,
}

/// Runs the four synthesis phases against one sink factory.
///
/// Phases run in dependency order: reference tables, customers, flights,
/// then cabin crew and bookings for the flights that were committed.
#[derive(Clone)]
pub struct SynthesisEngine {
    options: SynthesisOptions,
    run_id: String,
    fake: Arc<dyn FakeValues>,
}

impl SynthesisEngine {
    pub fn new(options: SynthesisOptions) -> Self {
        Self {
            options,
            run_id: uuid::Uuid::new_v4().to_string(),
            fake: Arc::new(FakerValues),
        }
    }

    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = run_id.into();
        self
    }

    pub fn with_fake(mut self, fake: Arc<dyn FakeValues>) -> Self {
        self.fake = fake;
        self
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn options(&self) -> &SynthesisOptions {
        &self.options
    }

    pub fn run<F: SinkFactory>(&self, sinks: &F) -> Result<SynthesisResult, GenerationError> {
        let start = Instant::now();
        let options = &self.options;
        let plan = &options.plan;
        plan.validate()?;
        let sizing = plan.sizing();
        let seed = options.seed;
        let settings = &options.pipeline;

        info!(
            run_id = %self.run_id,
            seed,
            aircraft = plan.num_aircraft,
            airports = plan.num_airports,
            batch_size = plan.batch_size,
            "synthesis started"
        );
        log_distribution(&sizing);

        let mut report = SynthesisReport::new(self.run_id.clone(), seed, sizing);
        let mut parked = Vec::new();

        let reference =
            synthesize_reference(plan, hash_seed(seed, "reference"), self.fake.as_ref())?;
        let reference_producer = ReferenceProducer::new(&reference);
        let outcome = run_phase(
            "reference",
            run_pipeline(
                &settings.config(reference_producer.table_count(), 1, hash_seed(seed, "reference")),
                &reference_producer,
                sinks,
            ),
        )?;
        report.reference_rows = outcome.report.rows_written.clone();
        collect(&mut report, &mut parked, outcome);

        let customers = CustomerProducer::new().with_fake(Arc::clone(&self.fake));
        let outcome = run_phase(
            "customers",
            run_pipeline(
                &settings.config(sizing.customers, plan.batch_size, hash_seed(seed, "customers")),
                &customers,
                sinks,
            ),
        )?;
        collect(&mut report, &mut parked, outcome);

        let airport_ids = reference.airport_ids();
        let mut rng = ChaCha8Rng::seed_from_u64(hash_seed(seed, "fleet"));
        let fleet = Fleet::new(
            reference
                .airplane_ids()
                .into_iter()
                .map(|id| (id, airport_ids[rng.random_range(0..airport_ids.len())]))
                .collect::<Vec<_>>(),
        )?;
        let delay_probabilities = airport_delay_probabilities(&mut rng, &airport_ids);
        let pilots = ScheduleBook::new(ResourceKind::Pilot, reference.pilot_ids())?;
        let flights = FlightProducer::new(
            options.timetable.clone(),
            airport_ids,
            delay_probabilities,
            Arc::new(fleet),
            Arc::new(pilots),
        )?
        .with_fake(Arc::clone(&self.fake));
        let ledger = FlightLedger::new(sinks, options.timetable.turnaround());
        let outcome = run_phase(
            "flights",
            run_pipeline(
                &settings.config(sizing.annual_flights, plan.batch_size, hash_seed(seed, "flights")),
                &flights,
                &ledger,
            ),
        )?;
        collect(&mut report, &mut parked, outcome);

        let slots = ledger.complement_slots();
        info!(
            run_id = %self.run_id,
            committed_flights = ledger.len(),
            complement_flights = slots.len(),
            "flight ledger closed"
        );
        let crew = ScheduleBook::new(ResourceKind::CabinCrew, reference.cabin_crew_ids())?;
        let passengers = ScheduleBook::with_range(ResourceKind::Passenger, sizing.customers)?;
        let slot_count = slots.len() as u64;
        let complement = ComplementProducer::new(slots, Arc::new(crew), Arc::new(passengers))?
            .with_shape(options.complement);
        let outcome = run_phase(
            "flight_complement",
            run_pipeline(
                &settings.config(
                    slot_count,
                    plan.complement_batch_size(),
                    hash_seed(seed, "flight_complement"),
                ),
                &complement,
                sinks,
            ),
        )?;
        collect(&mut report, &mut parked, outcome);

        report.duration_ms = start.elapsed().as_millis() as u64;
        if report.parked_total > 0 {
            warn!(
                run_id = %self.run_id,
                parked = report.parked_total,
                "synthesis finished with parked batches"
            );
        }
        info!(
            run_id = %self.run_id,
            phases = report.phases.len(),
            parked = report.parked_total,
            duration_ms = report.duration_ms,
            "synthesis completed"
        );

        Ok(SynthesisResult { report, parked })
    }
}

fn run_phase(
    phase: &'static str,
    result: Result<PipelineOutcome, PipelineError>,
) -> Result<PipelineOutcome, GenerationError> {
    result.map_err(|source| GenerationError::Phase { phase, source })
}

fn collect(report: &mut SynthesisReport, parked: &mut Vec<ParkedBatch>, outcome: PipelineOutcome) {
    log_phase(&outcome.report);
    parked.extend(outcome.parked);
    report.record_phase(outcome.report);
}

fn log_phase(phase: &PipelineReport) {
    for (table, rows) in &phase.rows_written {
        info!(phase = %phase.producer, table = %table, rows, "rows written");
    }
    let stats = &phase.stats;
    let shortfall = stats.slots_skipped
        + stats.unassigned_pilots
        + stats.unassigned_crew
        + stats.unassigned_passengers;
    if shortfall > 0 {
        info!(
            phase = %phase.producer,
            slots_skipped = stats.slots_skipped,
            cancelled = stats.cancelled,
            unassigned_pilots = stats.unassigned_pilots,
            unassigned_crew = stats.unassigned_crew,
            unassigned_passengers = stats.unassigned_passengers,
            "allocation shortfall"
        );
    }
}

fn log_distribution(sizing: &Sizing) {
    for (table, rows) in [
        ("pilots", sizing.pilots),
        ("cabin_crew", sizing.cabin_crew),
        ("flights", sizing.annual_flights),
        ("flight_bookings", sizing.annual_passengers),
        ("airports", sizing.airports),
        ("airplanes", sizing.aircraft),
        ("customers", sizing.customers),
    ] {
        info!(table, estimated_rows = rows, "distribution estimate");
    }
}
