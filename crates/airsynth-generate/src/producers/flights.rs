use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use rand::Rng;
use rand::seq::index;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use airsynth_core::{Fleet, Flight, FlightStatus, Interval, ResourceId, ScheduleBook};

use crate::allocator::{Allocator, SampleRange};
use crate::errors::GenerationError;
use crate::faker::{FakeValues, FakerValues};
use crate::model::{Batch, BatchSpec, BatchStats, TableRows};
use crate::producers::BatchProducer;

/// Timing and probability knobs for flight synthesis.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FlightTimetable {
    /// Day zero; batch `n` starts its slots on `epoch + n days`.
    pub epoch: NaiveDateTime,
    pub slot_interval_minutes: i64,
    pub flight_duration_minutes: i64,
    pub turnaround_minutes: i64,
    pub min_delay_minutes: i64,
    pub max_delay_minutes: i64,
    /// Upper bound on aircraft examined per slot.
    pub aircraft_sample: usize,
    pub cancellation_probability: f64,
    pub ferry_probability: f64,
    pub pilot_sample: SampleRange,
}

impl Default for FlightTimetable {
    fn default() -> Self {
        Self {
            epoch: NaiveDate::from_ymd_opt(2024, 1, 1)
                .and_then(|date| date.and_hms_opt(0, 0, 0))
                .unwrap_or_default(),
            slot_interval_minutes: 15,
            flight_duration_minutes: 150,
            turnaround_minutes: 30,
            min_delay_minutes: 15,
            max_delay_minutes: 120,
            aircraft_sample: 50,
            cancellation_probability: 0.02,
            ferry_probability: 0.1,
            pilot_sample: SampleRange::default(),
        }
    }
}

impl FlightTimetable {
    pub fn flight_duration(&self) -> TimeDelta {
        TimeDelta::minutes(self.flight_duration_minutes)
    }

    pub fn turnaround(&self) -> TimeDelta {
        TimeDelta::minutes(self.turnaround_minutes)
    }

    pub fn estimated_flight_hours(&self) -> f64 {
        self.flight_duration_minutes as f64 / 60.0
    }

    fn validate(&self) -> Result<(), GenerationError> {
        for (name, value) in [
            ("cancellation_probability", self.cancellation_probability),
            ("ferry_probability", self.ferry_probability),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(GenerationError::InvalidConfig(format!(
                    "{name} must be within [0, 1]"
                )));
            }
        }
        if self.flight_duration_minutes <= 0 || self.slot_interval_minutes <= 0 {
            return Err(GenerationError::InvalidConfig(
                "flight duration and slot interval must be positive".to_string(),
            ));
        }
        if self.turnaround_minutes < 0 {
            return Err(GenerationError::InvalidConfig(
                "turnaround must not be negative".to_string(),
            ));
        }
        if self.min_delay_minutes < 0 || self.min_delay_minutes > self.max_delay_minutes {
            return Err(GenerationError::InvalidConfig(
                "delay bounds must satisfy 0 <= min <= max".to_string(),
            ));
        }
        if self.aircraft_sample == 0 {
            return Err(GenerationError::InvalidConfig(
                "aircraft_sample must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Draws a congestion probability in `[0.05, 0.25)` for every airport.
pub fn airport_delay_probabilities<R: Rng + ?Sized>(
    rng: &mut R,
    airports: &[ResourceId],
) -> HashMap<ResourceId, f64> {
    airports
        .iter()
        .map(|airport| (*airport, rng.random_range(0.05..0.25)))
        .collect()
}

/// Produces flights by reserving aircraft blocks and probing for pilots.
#[derive(Clone)]
pub struct FlightProducer {
    timetable: FlightTimetable,
    airports: Vec<ResourceId>,
    airport_positions: HashMap<ResourceId, usize>,
    delay_probabilities: HashMap<ResourceId, f64>,
    fleet: Arc<Fleet>,
    pilots: Arc<ScheduleBook>,
    fake: Arc<dyn FakeValues>,
}

/// Aircraft block resolved for one slot.
struct Leg {
    airplane_id: ResourceId,
    origin: ResourceId,
    destination: ResourceId,
    departure: NaiveDateTime,
    arrival: NaiveDateTime,
    block: Interval,
    delay_minutes: i64,
}

impl FlightProducer {
    pub fn new(
        timetable: FlightTimetable,
        airports: Vec<ResourceId>,
        delay_probabilities: HashMap<ResourceId, f64>,
        fleet: Arc<Fleet>,
        pilots: Arc<ScheduleBook>,
    ) -> Result<Self, GenerationError> {
        timetable.validate()?;
        if airports.len() < 2 {
            return Err(GenerationError::InvalidConfig(
                "flights need at least two airports".to_string(),
            ));
        }
        let mut airport_positions = HashMap::with_capacity(airports.len());
        for (position, airport) in airports.iter().enumerate() {
            if airport_positions.insert(*airport, position).is_some() {
                return Err(GenerationError::InvalidConfig(format!(
                    "duplicate airport id {airport}"
                )));
            }
        }
        if let Some((airport, probability)) = delay_probabilities
            .iter()
            .find(|(_, probability)| !(0.0..=1.0).contains(*probability))
        {
            return Err(GenerationError::InvalidConfig(format!(
                "delay probability {probability} for airport {airport} is outside [0, 1]"
            )));
        }

        Ok(Self {
            timetable,
            airports,
            airport_positions,
            delay_probabilities,
            fleet,
            pilots,
            fake: Arc::new(FakerValues),
        })
    }

    pub fn with_fake(mut self, fake: Arc<dyn FakeValues>) -> Self {
        self.fake = fake;
        self
    }

    pub fn timetable(&self) -> &FlightTimetable {
        &self.timetable
    }

    fn viable_aircraft(&self) -> Result<Vec<ResourceId>, GenerationError> {
        let allowed: HashSet<ResourceId> = self.airport_positions.keys().copied().collect();
        let mut viable = Vec::new();
        for id in self.fleet.ids() {
            if allowed.contains(&self.fleet.location(*id)?) {
                viable.push(*id);
            }
        }
        Ok(viable)
    }

    fn pick_destination(&self, rng: &mut ChaCha8Rng, origin: ResourceId) -> ResourceId {
        match self.airport_positions.get(&origin) {
            Some(position) => {
                let mut idx = rng.random_range(0..self.airports.len() - 1);
                if idx >= *position {
                    idx += 1;
                }
                self.airports[idx]
            }
            None => self.airports[rng.random_range(0..self.airports.len())],
        }
    }

    fn draw_delay(&self, rng: &mut ChaCha8Rng, origin: ResourceId) -> i64 {
        let probability = self
            .delay_probabilities
            .get(&origin)
            .copied()
            .unwrap_or(0.0);
        if rng.random_bool(probability) {
            rng.random_range(self.timetable.min_delay_minutes..=self.timetable.max_delay_minutes)
        } else {
            0
        }
    }

    /// Scans a bounded sample of aircraft parked at known airports and
    /// reserves the first one whose block is free.
    ///
    /// Origin read, reservation and relocation happen under the aircraft's
    /// lock.
    fn assign_aircraft(
        &self,
        rng: &mut ChaCha8Rng,
        nominal_departure: NaiveDateTime,
    ) -> Result<Option<Leg>, GenerationError> {
        let viable = self.viable_aircraft()?;
        if viable.is_empty() {
            return Ok(None);
        }
        let amount = self.timetable.aircraft_sample.min(viable.len());

        for idx in index::sample(rng, viable.len(), amount) {
            let airplane_id = viable[idx];
            let mut aircraft = self.fleet.lock(airplane_id)?;
            let origin = aircraft.location;
            if !self.airport_positions.contains_key(&origin) {
                continue;
            }
            let destination = self.pick_destination(rng, origin);
            let delay_minutes = self.draw_delay(rng, origin);

            let departure = nominal_departure + TimeDelta::minutes(delay_minutes);
            let arrival = departure + self.timetable.flight_duration();
            let block = Interval::new(departure, arrival + self.timetable.turnaround())?;

            if aircraft.try_assign(block, destination) {
                return Ok(Some(Leg {
                    airplane_id,
                    origin,
                    destination,
                    departure,
                    arrival,
                    block,
                    delay_minutes,
                }));
            }
        }
        Ok(None)
    }
}

impl BatchProducer for FlightProducer {
    fn name(&self) -> &'static str {
        "flights"
    }

    fn produce(&self, rng: &mut ChaCha8Rng, spec: BatchSpec) -> Result<Batch, GenerationError> {
        let base_day = self.timetable.epoch + TimeDelta::days(spec.index as i64);
        let slot_interval = TimeDelta::minutes(self.timetable.slot_interval_minutes);
        let pilots = Allocator::new(&self.pilots).with_sample(self.timetable.pilot_sample);

        let mut flights = Vec::with_capacity(spec.rows);
        let mut stats = BatchStats {
            slots_requested: spec.rows as u64,
            ..BatchStats::default()
        };

        for slot in 0..spec.rows {
            let nominal_departure = base_day + slot_interval * slot as i32;
            let Some(leg) = self.assign_aircraft(rng, nominal_departure)? else {
                stats.slots_skipped += 1;
                continue;
            };

            let id = spec.first_row + slot as u64 + 1;
            let flight_number = self.fake.flight_number(rng);
            let is_ferry_flight = rng.random_bool(self.timetable.ferry_probability);

            if rng.random_bool(self.timetable.cancellation_probability) {
                stats.cancelled += 1;
                flights.push(Flight {
                    id,
                    flight_number,
                    departure_airport_id: leg.origin,
                    arrival_airport_id: leg.destination,
                    departure_time: leg.departure,
                    arrival_time: None,
                    delay_minutes: leg.delay_minutes,
                    status: FlightStatus::Cancelled,
                    pilot_id: None,
                    copilot_id: None,
                    airplane_id: leg.airplane_id,
                    is_ferry_flight: false,
                    estimated_flight_hours: self.timetable.estimated_flight_hours(),
                });
                continue;
            }

            let pilot_id = pilots.pick_from_pool(rng, leg.block)?;
            let copilot_id = pilots.pick_from_pool(rng, leg.block)?;
            stats.unassigned_pilots +=
                u64::from(pilot_id.is_none()) + u64::from(copilot_id.is_none());

            flights.push(Flight {
                id,
                flight_number,
                departure_airport_id: leg.origin,
                arrival_airport_id: leg.destination,
                departure_time: leg.departure,
                arrival_time: Some(leg.arrival),
                delay_minutes: leg.delay_minutes,
                status: if leg.delay_minutes == 0 {
                    FlightStatus::Scheduled
                } else {
                    FlightStatus::Delayed
                },
                pilot_id,
                copilot_id,
                airplane_id: leg.airplane_id,
                is_ferry_flight,
                estimated_flight_hours: self.timetable.estimated_flight_hours(),
            });
        }

        debug!(
            batch = spec.index,
            flights = flights.len(),
            skipped = stats.slots_skipped,
            "flight batch produced"
        );
        Ok(Batch::new(spec.index, vec![TableRows::Flights(flights)]).with_stats(stats))
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;

    use airsynth_core::ResourceKind;

    use super::*;

    fn producer(aircraft: u64, pilots: u64) -> FlightProducer {
        producer_with(FlightTimetable::default(), aircraft, pilots)
    }

    fn producer_with(timetable: FlightTimetable, aircraft: u64, pilots: u64) -> FlightProducer {
        let airports = vec![1, 2, 3];
        let fleet = Fleet::new((1..=aircraft).map(|id| (id, 1))).expect("fleet");
        let pilots = ScheduleBook::with_range(ResourceKind::Pilot, pilots).expect("pilots");
        let delays = airports.iter().map(|airport| (*airport, 0.0)).collect();
        FlightProducer::new(
            timetable,
            airports,
            delays,
            Arc::new(fleet),
            Arc::new(pilots),
        )
        .expect("producer")
    }

    #[test]
    fn destination_never_equals_origin() {
        let producer = producer(1, 2);
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        for _ in 0..200 {
            assert_ne!(producer.pick_destination(&mut rng, 2), 2);
        }
    }

    #[test]
    fn rejects_single_airport() {
        let fleet = Fleet::new([(1, 1)]).expect("fleet");
        let pilots = ScheduleBook::with_range(ResourceKind::Pilot, 1).expect("pilots");
        let result = FlightProducer::new(
            FlightTimetable::default(),
            vec![1],
            HashMap::new(),
            Arc::new(fleet),
            Arc::new(pilots),
        );
        assert!(matches!(result, Err(GenerationError::InvalidConfig(_))));
    }

    #[test]
    fn rejects_out_of_range_probability() {
        let timetable = FlightTimetable {
            ferry_probability: 1.5,
            ..FlightTimetable::default()
        };
        assert!(timetable.validate().is_err());
    }

    #[test]
    fn aircraft_moves_to_flight_destination() {
        let producer = producer(1, 4);
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let spec = BatchSpec {
            index: 0,
            first_row: 0,
            rows: 1,
        };
        let batch = producer.produce(&mut rng, spec).expect("batch");
        let TableRows::Flights(flights) = &batch.tables[0] else {
            panic!("expected flights table");
        };
        let flight = &flights[0];
        assert_eq!(flight.departure_airport_id, 1);
        assert_eq!(
            producer.fleet.location(1).expect("location"),
            flight.arrival_airport_id
        );
    }

    #[test]
    fn cancelled_flights_keep_the_aircraft_but_release_the_pilots() {
        let timetable = FlightTimetable {
            cancellation_probability: 1.0,
            ferry_probability: 1.0,
            ..FlightTimetable::default()
        };
        let producer = producer_with(timetable, 2, 4);
        let mut rng = ChaCha8Rng::seed_from_u64(21);
        let spec = BatchSpec {
            index: 0,
            first_row: 0,
            rows: 2,
        };

        let batch = producer.produce(&mut rng, spec).expect("batch");
        let TableRows::Flights(flights) = &batch.tables[0] else {
            panic!("expected flights table");
        };
        assert!(!flights.is_empty());
        assert_eq!(batch.stats.cancelled, flights.len() as u64);
        for flight in flights {
            assert_eq!(flight.status, FlightStatus::Cancelled);
            assert_eq!(flight.arrival_time, None);
            assert_eq!(flight.pilot_id, None);
            assert_eq!(flight.copilot_id, None);
            assert!(!flight.is_ferry_flight);

            let aircraft = producer.fleet.snapshot(flight.airplane_id).expect("aircraft");
            assert!(
                aircraft
                    .schedule
                    .intervals()
                    .iter()
                    .any(|block| block.start == flight.departure_time)
            );
        }
        assert_eq!(producer.pilots.reservations(), 0);
        assert_eq!(batch.stats.unassigned_pilots, 0);
    }
}
