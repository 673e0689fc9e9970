use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::pool::ResourceId;

/// Operational state of a flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlightStatus {
    Scheduled,
    Delayed,
    Cancelled,
}

impl FlightStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            FlightStatus::Scheduled => "scheduled",
            FlightStatus::Delayed => "delayed",
            FlightStatus::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub id: ResourceId,
    pub full_name: String,
    pub email: String,
    pub frequent_flyer: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pilot {
    pub id: ResourceId,
    pub name: String,
    pub license_number: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CabinCrewMember {
    pub id: ResourceId,
    pub name: String,
    pub employee_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Airport {
    pub id: ResourceId,
    /// Three-letter code, unique across the generated set.
    pub code: String,
    pub name: String,
    pub city: String,
    pub country: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Airplane {
    pub id: ResourceId,
    pub model: String,
    pub registration_number: String,
    pub fuel_consumption_per_hour: f64,
    pub maintenance_days: u32,
}

/// A single flight leg.
///
/// Cancelled flights carry no arrival time and no crew.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flight {
    pub id: ResourceId,
    pub flight_number: String,
    pub departure_airport_id: ResourceId,
    pub arrival_airport_id: ResourceId,
    pub departure_time: NaiveDateTime,
    pub arrival_time: Option<NaiveDateTime>,
    pub delay_minutes: i64,
    pub status: FlightStatus,
    pub pilot_id: Option<ResourceId>,
    pub copilot_id: Option<ResourceId>,
    pub airplane_id: ResourceId,
    pub is_ferry_flight: bool,
    pub estimated_flight_hours: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlightCabinCrew {
    pub flight_id: ResourceId,
    pub cabin_crew_id: ResourceId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlightBooking {
    pub flight_id: ResourceId,
    pub customer_id: ResourceId,
    pub seat_number: String,
}
