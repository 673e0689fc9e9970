use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::TimeDelta;
use parking_lot::Mutex;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use airsynth_core::{Fleet, Flight, FlightStatus, Interval, ResourceKind, ScheduleBook};
use airsynth_generate::producers::{
    ComplementProducer, FlightProducer, FlightTimetable, batch_seed,
};
use airsynth_generate::{
    Batch, BatchProducer, BatchSink, BatchSpec, FlightLedger, PipelineConfig, SinkError,
    SinkFactory, TableRows, run_pipeline,
};

fn timetable() -> FlightTimetable {
    FlightTimetable {
        cancellation_probability: 0.0,
        ferry_probability: 0.0,
        ..FlightTimetable::default()
    }
}

fn flight_producer(aircraft: &[(u64, u64)], pilots: u64) -> FlightProducer {
    let airports = vec![1, 2, 3, 4];
    let delays = airports.iter().map(|airport| (*airport, 0.2)).collect();
    let fleet = Fleet::new(aircraft.iter().copied()).expect("fleet");
    let pilots = ScheduleBook::with_range(ResourceKind::Pilot, pilots).expect("pilots");
    FlightProducer::new(timetable(), airports, delays, Arc::new(fleet), Arc::new(pilots))
        .expect("producer")
}

fn flights_of(batch: &Batch) -> Vec<Flight> {
    batch
        .tables
        .iter()
        .flat_map(|table| match table {
            TableRows::Flights(rows) => rows.clone(),
            _ => Vec::new(),
        })
        .collect()
}

fn spec(rows: usize) -> BatchSpec {
    BatchSpec {
        index: 0,
        first_row: 0,
        rows,
    }
}

#[test]
fn single_aircraft_cannot_fly_overlapping_slots() {
    let producer = flight_producer(&[(1, 1)], 1);
    let mut rng = ChaCha8Rng::seed_from_u64(batch_seed(7, 0));
    let batch = producer.produce(&mut rng, spec(2)).expect("batch");
    let flights = flights_of(&batch);

    assert_eq!(flights.len(), 1);
    assert_eq!(batch.stats.slots_skipped, 1);
    let flight = &flights[0];
    assert_eq!(flight.id, 1);
    assert_eq!(flight.pilot_id, Some(1));
    assert_eq!(flight.copilot_id, None);
    assert_eq!(batch.stats.unassigned_pilots, 1);
}

#[test]
fn second_aircraft_takes_the_overlapping_slot_without_a_pilot() {
    let producer = flight_producer(&[(1, 1), (2, 2)], 1);
    let mut rng = ChaCha8Rng::seed_from_u64(batch_seed(3, 0));
    let batch = producer.produce(&mut rng, spec(2)).expect("batch");
    let flights = flights_of(&batch);

    assert_eq!(flights.len(), 2);
    assert_ne!(flights[0].airplane_id, flights[1].airplane_id);
    assert_eq!(flights[0].pilot_id, Some(1));
    assert_eq!(flights[1].pilot_id, None);
    assert_eq!(flights[1].copilot_id, None);
    assert_eq!(batch.stats.unassigned_pilots, 3);
}

#[test]
fn same_batch_coordinates_reproduce_the_same_flights() {
    let make = || flight_producer(&[(1, 1), (2, 2), (3, 3)], 6);
    let spec = BatchSpec {
        index: 4,
        first_row: 40,
        rows: 10,
    };
    let first = make()
        .produce(&mut ChaCha8Rng::seed_from_u64(batch_seed(99, 4)), spec)
        .expect("batch");
    let second = make()
        .produce(&mut ChaCha8Rng::seed_from_u64(batch_seed(99, 4)), spec)
        .expect("batch");
    assert_eq!(first, second);
    assert!(flights_of(&first).iter().all(|flight| flight.id > 40 && flight.id <= 50));
}

#[derive(Clone, Default)]
struct Collect(Arc<Mutex<Vec<Batch>>>);

impl SinkFactory for Collect {
    type Sink = Collect;

    fn open(&self) -> Result<Self::Sink, SinkError> {
        Ok(self.clone())
    }
}

impl BatchSink for Collect {
    fn write_batch(&mut self, batch: &Batch) -> Result<(), SinkError> {
        self.0.lock().push(batch.clone());
        Ok(())
    }
}

fn assert_disjoint(label: &str, mut blocks: Vec<Interval>) {
    blocks.sort();
    for pair in blocks.windows(2) {
        assert!(
            !pair[0].overlaps(&pair[1]),
            "{label} double-booked: {:?} and {:?}",
            pair[0],
            pair[1]
        );
    }
}

#[test]
fn concurrent_producers_never_double_book() {
    let producer = flight_producer(&[(1, 1), (2, 2), (3, 3), (4, 1)], 5);
    let sink = Collect::default();
    let turnaround = producer.timetable().turnaround();
    let ledger = FlightLedger::new(sink.clone(), turnaround);
    let config = PipelineConfig::new(240)
        .with_batch_size(20)
        .with_workers(6, 3)
        .with_retries(1, Duration::ZERO)
        .with_seed(5);
    let outcome = run_pipeline(&config, &producer, &ledger).expect("flights");
    assert_eq!(outcome.report.batches_committed, 12);

    let flights: Vec<Flight> = sink.0.lock().iter().flat_map(flights_of).collect();
    assert_eq!(ledger.len(), flights.len());

    let mut aircraft_blocks: HashMap<u64, Vec<Interval>> = HashMap::new();
    let mut pilot_blocks: HashMap<u64, Vec<Interval>> = HashMap::new();
    for flight in &flights {
        assert_ne!(flight.departure_airport_id, flight.arrival_airport_id);
        let arrival = flight.arrival_time.expect("no cancellations configured");
        let block = Interval::new(flight.departure_time, arrival + turnaround).expect("block");
        aircraft_blocks.entry(flight.airplane_id).or_default().push(block);
        for pilot in [flight.pilot_id, flight.copilot_id].into_iter().flatten() {
            pilot_blocks.entry(pilot).or_default().push(block);
        }
        if let (Some(pilot), Some(copilot)) = (flight.pilot_id, flight.copilot_id) {
            assert_ne!(pilot, copilot);
        }
        let expected = if flight.delay_minutes == 0 {
            FlightStatus::Scheduled
        } else {
            FlightStatus::Delayed
        };
        assert_eq!(flight.status, expected);
    }
    for (id, blocks) in aircraft_blocks {
        assert_disjoint(&format!("aircraft {id}"), blocks);
    }
    for (id, blocks) in pilot_blocks {
        assert_disjoint(&format!("pilot {id}"), blocks);
    }
}

#[test]
fn complement_over_ledger_books_each_person_once_per_window() {
    let producer = flight_producer(&[(1, 1), (2, 2), (3, 3)], 6);
    let ledger = FlightLedger::new(Collect::default(), TimeDelta::minutes(30));
    let config = PipelineConfig::new(30)
        .with_batch_size(10)
        .with_workers(2, 2)
        .with_retries(1, Duration::ZERO)
        .with_seed(8);
    run_pipeline(&config, &producer, &ledger).expect("flights");
    let slots = ledger.complement_slots();
    assert!(!slots.is_empty());

    let crew = ScheduleBook::with_range(ResourceKind::CabinCrew, 12).expect("crew");
    let passengers = ScheduleBook::with_range(ResourceKind::Passenger, 400).expect("pax");
    let complement = ComplementProducer::new(slots.clone(), Arc::new(crew), Arc::new(passengers))
        .expect("complement producer");
    let sink = Collect::default();
    let config = PipelineConfig::new(slots.len() as u64)
        .with_batch_size(4)
        .with_remainder(airsynth_generate::Remainder::PartialBatch)
        .with_workers(3, 2)
        .with_retries(1, Duration::ZERO)
        .with_seed(8);
    let outcome = run_pipeline(&config, &complement, &sink).expect("complement");
    assert_eq!(outcome.report.stats.slots_requested, slots.len() as u64);

    let windows: HashMap<u64, Interval> = slots
        .iter()
        .map(|slot| {
            (
                slot.flight_id,
                Interval::new(slot.departure, slot.block_end).expect("window"),
            )
        })
        .collect();
    let mut crew_blocks: HashMap<u64, Vec<Interval>> = HashMap::new();
    let mut passenger_blocks: HashMap<u64, Vec<Interval>> = HashMap::new();
    for batch in sink.0.lock().iter() {
        for table in &batch.tables {
            match table {
                TableRows::FlightCabinCrew(links) => {
                    for link in links {
                        crew_blocks
                            .entry(link.cabin_crew_id)
                            .or_default()
                            .push(windows[&link.flight_id]);
                    }
                }
                TableRows::FlightBookings(bookings) => {
                    for booking in bookings {
                        passenger_blocks
                            .entry(booking.customer_id)
                            .or_default()
                            .push(windows[&booking.flight_id]);
                    }
                }
                _ => {}
            }
        }
    }
    assert!(!crew_blocks.is_empty());
    for (id, blocks) in crew_blocks {
        assert_disjoint(&format!("crew {id}"), blocks);
    }
    for (id, blocks) in passenger_blocks {
        assert_disjoint(&format!("passenger {id}"), blocks);
    }
}
