use std::sync::Arc;

use chrono::NaiveDateTime;
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use airsynth_core::{FlightBooking, FlightCabinCrew, Interval, ResourceId, ScheduleBook};

use crate::allocator::{Allocator, SampleRange};
use crate::errors::GenerationError;
use crate::model::{Batch, BatchSpec, BatchStats, TableRows};
use crate::producers::BatchProducer;

/// A committed flight that needs cabin crew and passengers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlightSlot {
    pub flight_id: ResourceId,
    pub departure: NaiveDateTime,
    /// End of the aircraft block (arrival plus turnaround).
    pub block_end: NaiveDateTime,
}

/// Per-flight head counts.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ComplementShape {
    pub crew_per_flight: SampleRange,
    pub passengers_per_flight: SampleRange,
    pub crew_sample: SampleRange,
}

impl Default for ComplementShape {
    fn default() -> Self {
        Self {
            crew_per_flight: SampleRange::new(2, 4),
            passengers_per_flight: SampleRange::new(120, 160),
            crew_sample: SampleRange::default(),
        }
    }
}

/// Staffs and books a fixed slice of committed flights per batch.
///
/// Batch `spec` covers `flights[first_row .. first_row + rows]`.
#[derive(Clone)]
pub struct ComplementProducer {
    flights: Arc<[FlightSlot]>,
    crew: Arc<ScheduleBook>,
    passengers: Arc<ScheduleBook>,
    max_customer_id: u64,
    shape: ComplementShape,
}

impl ComplementProducer {
    /// Passengers are probed by uniform customer id, so `passengers` must be
    /// the dense book over `1..=passengers.len()`.
    pub fn new(
        flights: impl Into<Arc<[FlightSlot]>>,
        crew: Arc<ScheduleBook>,
        passengers: Arc<ScheduleBook>,
    ) -> Result<Self, GenerationError> {
        let max_customer_id = passengers.len() as u64;
        if let Some(id) = passengers
            .ids()
            .iter()
            .find(|id| !(1..=max_customer_id).contains(*id))
        {
            return Err(GenerationError::InvalidConfig(format!(
                "passenger id {id} is outside the dense range 1..={max_customer_id}"
            )));
        }
        Ok(Self {
            flights: flights.into(),
            crew,
            passengers,
            max_customer_id,
            shape: ComplementShape::default(),
        })
    }

    pub fn with_shape(mut self, shape: ComplementShape) -> Self {
        self.shape = shape;
        self
    }

    pub fn flights(&self) -> &[FlightSlot] {
        &self.flights
    }
}

impl BatchProducer for ComplementProducer {
    fn name(&self) -> &'static str {
        "flight_complement"
    }

    fn produce(&self, rng: &mut ChaCha8Rng, spec: BatchSpec) -> Result<Batch, GenerationError> {
        let start = (spec.first_row as usize).min(self.flights.len());
        let end = start.saturating_add(spec.rows).min(self.flights.len());
        let slice = &self.flights[start..end];

        let crew = Allocator::new(&self.crew).with_sample(self.shape.crew_sample);
        let passengers = Allocator::new(&self.passengers);

        let mut crew_links = Vec::new();
        let mut bookings = Vec::new();
        let mut stats = BatchStats {
            slots_requested: slice.len() as u64,
            ..BatchStats::default()
        };

        for slot in slice {
            let block = Interval::new(slot.departure, slot.block_end)?;

            let crew_wanted = rng.random_range(
                self.shape.crew_per_flight.min()..=self.shape.crew_per_flight.max(),
            );
            for _ in 0..crew_wanted {
                match crew.pick_from_pool(rng, block)? {
                    Some(cabin_crew_id) => crew_links.push(FlightCabinCrew {
                        flight_id: slot.flight_id,
                        cabin_crew_id,
                    }),
                    None => stats.unassigned_crew += 1,
                }
            }

            let seats_wanted = rng.random_range(
                self.shape.passengers_per_flight.min()..=self.shape.passengers_per_flight.max(),
            );
            let mut seat = 0_u32;
            for _ in 0..seats_wanted {
                match passengers.pick_uniform(rng, self.max_customer_id, block)? {
                    Some(customer_id) => {
                        seat += 1;
                        bookings.push(FlightBooking {
                            flight_id: slot.flight_id,
                            customer_id,
                            seat_number: seat.to_string(),
                        });
                    }
                    None => stats.unassigned_passengers += 1,
                }
            }
        }

        Ok(Batch::new(
            spec.index,
            vec![
                TableRows::FlightCabinCrew(crew_links),
                TableRows::FlightBookings(bookings),
            ],
        )
        .with_stats(stats))
    }
}
