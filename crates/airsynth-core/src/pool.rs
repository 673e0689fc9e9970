use std::collections::HashMap;
use std::fmt;

use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::interval::Interval;
use crate::schedule::ResourceSchedule;

/// Identity of a resource within its pool (database-style, 1-based).
pub type ResourceId = u64;

/// Kind of resource a pool holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Aircraft,
    Pilot,
    CabinCrew,
    Passenger,
}

impl ResourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::Aircraft => "aircraft",
            ResourceKind::Pilot => "pilot",
            ResourceKind::CabinCrew => "cabin_crew",
            ResourceKind::Passenger => "passenger",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shared schedules for a fixed pool of interchangeable resources.
///
/// Membership is fixed at construction, so the map itself is immutable and
/// the book can be shared by reference across threads. Each identity has its
/// own lock; a reservation is a check-and-set under that lock.
#[derive(Debug)]
pub struct ScheduleBook {
    kind: ResourceKind,
    ids: Vec<ResourceId>,
    schedules: HashMap<ResourceId, Mutex<ResourceSchedule>>,
}

impl ScheduleBook {
    pub fn new(kind: ResourceKind, ids: impl IntoIterator<Item = ResourceId>) -> Result<Self> {
        let mut ordered = Vec::new();
        let mut schedules = HashMap::new();
        for id in ids {
            if schedules
                .insert(id, Mutex::new(ResourceSchedule::new()))
                .is_none()
            {
                ordered.push(id);
            }
        }
        if ordered.is_empty() {
            return Err(Error::EmptyPool(kind));
        }
        Ok(Self {
            kind,
            ids: ordered,
            schedules,
        })
    }

    /// Book over the dense identity range `1..=max_id`.
    pub fn with_range(kind: ResourceKind, max_id: ResourceId) -> Result<Self> {
        Self::new(kind, 1..=max_id)
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// Identities in construction order.
    pub fn ids(&self) -> &[ResourceId] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn contains(&self, id: ResourceId) -> bool {
        self.schedules.contains_key(&id)
    }

    pub fn is_available(&self, id: ResourceId, interval: &Interval) -> Result<bool> {
        Ok(self.slot(id)?.lock().is_available(interval))
    }

    /// Atomically reserves `interval` for `id` if it is free.
    pub fn try_reserve(&self, id: ResourceId, interval: Interval) -> Result<bool> {
        Ok(self.slot(id)?.lock().try_reserve(interval))
    }

    /// Copy of one identity's schedule.
    pub fn snapshot(&self, id: ResourceId) -> Result<ResourceSchedule> {
        Ok(self.slot(id)?.lock().clone())
    }

    /// Total reservations across the pool.
    pub fn reservations(&self) -> usize {
        self.schedules.values().map(|slot| slot.lock().len()).sum()
    }

    fn slot(&self, id: ResourceId) -> Result<&Mutex<ResourceSchedule>> {
        self.schedules.get(&id).ok_or(Error::UnknownResource {
            kind: self.kind,
            id,
        })
    }
}

/// Schedule and current position of one aircraft.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AircraftState {
    pub schedule: ResourceSchedule,
    pub location: ResourceId,
}

impl AircraftState {
    /// Reserves `interval` and moves the aircraft to `destination` when the
    /// window is free.
    pub fn try_assign(&mut self, interval: Interval, destination: ResourceId) -> bool {
        if !self.schedule.try_reserve(interval) {
            return false;
        }
        self.location = destination;
        true
    }
}

/// Shared aircraft pool with per-aircraft schedule and location.
///
/// Location and schedule sit under the same lock so a producer can read the
/// origin, reserve the block and relocate the aircraft as one step.
#[derive(Debug)]
pub struct Fleet {
    ids: Vec<ResourceId>,
    aircraft: HashMap<ResourceId, Mutex<AircraftState>>,
}

impl Fleet {
    /// Builds a fleet from `(aircraft id, starting airport id)` pairs.
    pub fn new(locations: impl IntoIterator<Item = (ResourceId, ResourceId)>) -> Result<Self> {
        let mut ids = Vec::new();
        let mut aircraft = HashMap::new();
        for (id, location) in locations {
            let state = AircraftState {
                schedule: ResourceSchedule::new(),
                location,
            };
            if aircraft.insert(id, Mutex::new(state)).is_none() {
                ids.push(id);
            }
        }
        if ids.is_empty() {
            return Err(Error::EmptyPool(ResourceKind::Aircraft));
        }
        Ok(Self { ids, aircraft })
    }

    pub fn ids(&self) -> &[ResourceId] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn location(&self, id: ResourceId) -> Result<ResourceId> {
        Ok(self.slot(id)?.lock().location)
    }

    /// Exclusive access to one aircraft for a combined read-reserve-relocate.
    pub fn lock(&self, id: ResourceId) -> Result<MutexGuard<'_, AircraftState>> {
        Ok(self.slot(id)?.lock())
    }

    pub fn snapshot(&self, id: ResourceId) -> Result<AircraftState> {
        Ok(self.slot(id)?.lock().clone())
    }

    fn slot(&self, id: ResourceId) -> Result<&Mutex<AircraftState>> {
        self.aircraft.get(&id).ok_or(Error::UnknownResource {
            kind: ResourceKind::Aircraft,
            id,
        })
    }
}
