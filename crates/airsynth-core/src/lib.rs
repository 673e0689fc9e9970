//! Core contracts for airsynth.
//!
//! This crate defines the interval scheduler, the shared resource books that
//! workers reserve time against, and the airline entities every producer and
//! sink agrees on.

pub mod entities;
pub mod error;
pub mod interval;
pub mod pool;
pub mod schedule;

pub use entities::{
    Airplane, Airport, CabinCrewMember, Customer, Flight, FlightBooking, FlightCabinCrew,
    FlightStatus, Pilot,
};
pub use error::{Error, Result};
pub use interval::Interval;
pub use pool::{AircraftState, Fleet, ResourceId, ResourceKind, ScheduleBook};
pub use schedule::ResourceSchedule;
