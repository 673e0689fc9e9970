//! Fleet sizing and the reference tables every later phase draws from.

use std::collections::HashSet;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use airsynth_core::{Airplane, Airport, CabinCrewMember, Pilot, ResourceId};

use crate::errors::GenerationError;
use crate::faker::FakeValues;
use crate::model::{Batch, BatchSpec, Sizing, TableRows};
use crate::producers::BatchProducer;

pub const AIRCRAFT_MODELS: [&str; 5] = [
    "Airbus A320neo",
    "Boeing 737 MAX 8",
    "Airbus A321neo",
    "Boeing 787-9",
    "Airbus A350-900",
];

const MAX_AIRPORT_CODES: u64 = 26 * 26 * 26;
const MAX_REGISTRATIONS: u64 = 10_000;

/// Operating assumptions the dataset is sized from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetPlan {
    pub num_aircraft: u64,
    pub flights_per_aircraft_per_day: u64,
    pub days: u64,
    pub pax_per_flight: u64,
    pub num_airports: u64,
    /// Share of annual passengers that are distinct customers.
    pub unique_customer_ratio: f64,
    pub batch_size: usize,
    pub pilot_hours_per_flight: f64,
    pub max_pilot_hours: f64,
    pub crew_per_flight: u64,
    pub max_crew_hours: f64,
}

impl Default for FleetPlan {
    fn default() -> Self {
        Self {
            num_aircraft: 40,
            flights_per_aircraft_per_day: 5,
            days: 365,
            pax_per_flight: 150,
            num_airports: 100,
            unique_customer_ratio: 0.25,
            batch_size: 4000,
            pilot_hours_per_flight: 2.5,
            max_pilot_hours: 900.0,
            crew_per_flight: 4,
            max_crew_hours: 1000.0,
        }
    }
}

impl FleetPlan {
    pub fn validate(&self) -> Result<(), GenerationError> {
        let positive = [
            ("num_aircraft", self.num_aircraft > 0),
            (
                "flights_per_aircraft_per_day",
                self.flights_per_aircraft_per_day > 0,
            ),
            ("days", self.days > 0),
            ("pax_per_flight", self.pax_per_flight > 0),
            ("batch_size", self.batch_size > 0),
            ("crew_per_flight", self.crew_per_flight > 0),
            ("pilot_hours_per_flight", self.pilot_hours_per_flight > 0.0),
            ("max_pilot_hours", self.max_pilot_hours > 0.0),
            ("max_crew_hours", self.max_crew_hours > 0.0),
        ];
        if let Some((name, _)) = positive.iter().find(|(_, ok)| !*ok) {
            return Err(GenerationError::InvalidConfig(format!(
                "plan.{name} must be positive"
            )));
        }
        if !(self.unique_customer_ratio > 0.0 && self.unique_customer_ratio <= 1.0) {
            return Err(GenerationError::InvalidConfig(
                "plan.unique_customer_ratio must be within (0, 1]".to_string(),
            ));
        }
        if !(2..=MAX_AIRPORT_CODES).contains(&self.num_airports) {
            return Err(GenerationError::InvalidConfig(format!(
                "plan.num_airports must be within 2..={MAX_AIRPORT_CODES}"
            )));
        }
        if self.num_aircraft > MAX_REGISTRATIONS {
            return Err(GenerationError::InvalidConfig(format!(
                "plan.num_aircraft must not exceed {MAX_REGISTRATIONS}"
            )));
        }
        Ok(())
    }

    /// Derives annual volumes and staff counts from the plan.
    pub fn sizing(&self) -> Sizing {
        let annual_flights = self.num_aircraft * self.flights_per_aircraft_per_day * self.days;
        let annual_passengers = annual_flights * self.pax_per_flight;
        let flight_hours = annual_flights as f64 * self.pilot_hours_per_flight;
        Sizing {
            annual_flights,
            annual_passengers,
            pilots: (flight_hours / self.max_pilot_hours).ceil() as u64,
            cabin_crew: (flight_hours * self.crew_per_flight as f64 / self.max_crew_hours).ceil()
                as u64,
            airports: self.num_airports,
            aircraft: self.num_aircraft,
            customers: (annual_passengers as f64 * self.unique_customer_ratio).ceil() as u64,
        }
    }

    /// Complement batches carry whole flights, so the row budget is divided
    /// by the passenger load.
    pub fn complement_batch_size(&self) -> usize {
        let pax = usize::try_from(self.pax_per_flight).unwrap_or(usize::MAX);
        (self.batch_size / pax.max(1)).max(1)
    }
}

/// Pilots, cabin crew, airports and airplanes for one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReferenceData {
    pub pilots: Vec<Pilot>,
    pub cabin_crew: Vec<CabinCrewMember>,
    pub airports: Vec<Airport>,
    pub airplanes: Vec<Airplane>,
}

impl ReferenceData {
    pub fn pilot_ids(&self) -> Vec<ResourceId> {
        self.pilots.iter().map(|pilot| pilot.id).collect()
    }

    pub fn cabin_crew_ids(&self) -> Vec<ResourceId> {
        self.cabin_crew.iter().map(|member| member.id).collect()
    }

    pub fn airport_ids(&self) -> Vec<ResourceId> {
        self.airports.iter().map(|airport| airport.id).collect()
    }

    pub fn airplane_ids(&self) -> Vec<ResourceId> {
        self.airplanes.iter().map(|airplane| airplane.id).collect()
    }

    /// One table per entry, parents first.
    pub fn tables(&self) -> Vec<TableRows> {
        vec![
            TableRows::Pilots(self.pilots.clone()),
            TableRows::CabinCrew(self.cabin_crew.clone()),
            TableRows::Airports(self.airports.clone()),
            TableRows::Airplanes(self.airplanes.clone()),
        ]
    }
}

/// Builds the reference tables deterministically from `seed`.
pub fn synthesize_reference(
    plan: &FleetPlan,
    seed: u64,
    fake: &dyn FakeValues,
) -> Result<ReferenceData, GenerationError> {
    plan.validate()?;
    let sizing = plan.sizing();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);

    let pilots = (1..=sizing.pilots)
        .map(|id| Pilot {
            id,
            name: fake.full_name(&mut rng),
            license_number: fake.document_id(&mut rng),
        })
        .collect();

    let cabin_crew = (1..=sizing.cabin_crew)
        .map(|id| CabinCrewMember {
            id,
            name: fake.full_name(&mut rng),
            employee_id: fake.document_id(&mut rng),
        })
        .collect();

    let mut codes = HashSet::new();
    let mut airports = Vec::with_capacity(sizing.airports as usize);
    for id in 1..=sizing.airports {
        let code = loop {
            let candidate = fake.airport_code(&mut rng);
            if codes.insert(candidate.clone()) {
                break candidate;
            }
        };
        airports.push(Airport {
            id,
            code,
            name: format!("{} International", fake.city(&mut rng)),
            city: fake.city(&mut rng),
            country: fake.country(&mut rng),
        });
    }

    let mut registrations = HashSet::new();
    let mut airplanes = Vec::with_capacity(sizing.aircraft as usize);
    for id in 1..=sizing.aircraft {
        let registration_number = loop {
            let candidate = fake.registration(&mut rng);
            if registrations.insert(candidate.clone()) {
                break candidate;
            }
        };
        let fuel: f64 = rng.random_range(2.5..=6.0);
        airplanes.push(Airplane {
            id,
            model: AIRCRAFT_MODELS[rng.random_range(0..AIRCRAFT_MODELS.len())].to_string(),
            registration_number,
            fuel_consumption_per_hour: (fuel * 100.0).round() / 100.0,
            maintenance_days: rng.random_range(10..=30),
        });
    }

    Ok(ReferenceData {
        pilots,
        cabin_crew,
        airports,
        airplanes,
    })
}

/// Emits one reference table per batch, so batch `i` is table `i`.
pub struct ReferenceProducer {
    tables: Vec<TableRows>,
}

impl ReferenceProducer {
    pub fn new(reference: &ReferenceData) -> Self {
        Self {
            tables: reference.tables(),
        }
    }

    pub fn table_count(&self) -> u64 {
        self.tables.len() as u64
    }
}

impl BatchProducer for ReferenceProducer {
    fn name(&self) -> &'static str {
        "reference"
    }

    fn produce(&self, _rng: &mut ChaCha8Rng, spec: BatchSpec) -> Result<Batch, GenerationError> {
        let table = usize::try_from(spec.index)
            .ok()
            .and_then(|index| self.tables.get(index))
            .ok_or_else(|| {
                GenerationError::InvalidConfig(format!("no reference table at {}", spec.index))
            })?;
        Ok(Batch::new(spec.index, vec![table.clone()]))
    }
}
