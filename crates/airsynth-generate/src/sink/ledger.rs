use std::sync::Arc;

use chrono::{NaiveDateTime, TimeDelta};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use airsynth_core::{FlightStatus, ResourceId};

use crate::model::{Batch, TableRows};
use crate::producers::FlightSlot;
use crate::sink::{BatchSink, SinkError, SinkFactory};

/// A flight that reached the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub flight_id: ResourceId,
    pub departure: NaiveDateTime,
    /// Arrival plus turnaround; `None` for cancelled flights.
    pub block_end: Option<NaiveDateTime>,
    pub status: FlightStatus,
    pub is_ferry_flight: bool,
}

/// Sink wrapper that remembers which flights were committed.
///
/// Only successful writes are recorded, so a batch that is retried and
/// eventually parked leaves no trace here.
pub struct FlightLedger<F> {
    inner: F,
    turnaround: TimeDelta,
    entries: Arc<Mutex<Vec<LedgerEntry>>>,
}

impl<F: SinkFactory> FlightLedger<F> {
    pub fn new(inner: F, turnaround: TimeDelta) -> Self {
        Self {
            inner,
            turnaround,
            entries: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Committed flights, sorted by id.
    pub fn entries(&self) -> Vec<LedgerEntry> {
        let mut entries = self.entries.lock().clone();
        entries.sort_by_key(|entry| entry.flight_id);
        entries
    }

    /// Flights that need cabin crew and passengers: neither cancelled nor
    /// ferry legs. Sorted by id so complement batches are stable.
    pub fn complement_slots(&self) -> Vec<FlightSlot> {
        self.entries()
            .into_iter()
            .filter(|entry| entry.status != FlightStatus::Cancelled && !entry.is_ferry_flight)
            .filter_map(|entry| {
                entry.block_end.map(|block_end| FlightSlot {
                    flight_id: entry.flight_id,
                    departure: entry.departure,
                    block_end,
                })
            })
            .collect()
    }

    pub fn into_inner(self) -> F {
        self.inner
    }
}

impl<F: SinkFactory> SinkFactory for FlightLedger<F> {
    type Sink = LedgerSink<F::Sink>;

    fn open(&self) -> Result<Self::Sink, SinkError> {
        Ok(LedgerSink {
            inner: self.inner.open()?,
            turnaround: self.turnaround,
            entries: Arc::clone(&self.entries),
        })
    }
}

pub struct LedgerSink<S> {
    inner: S,
    turnaround: TimeDelta,
    entries: Arc<Mutex<Vec<LedgerEntry>>>,
}

impl<S: BatchSink> BatchSink for LedgerSink<S> {
    fn write_batch(&mut self, batch: &Batch) -> Result<(), SinkError> {
        self.inner.write_batch(batch)?;

        let committed = batch.tables.iter().filter_map(|table| match table {
            TableRows::Flights(flights) => Some(flights),
            _ => None,
        });
        let mut entries = self.entries.lock();
        for flight in committed.flatten() {
            entries.push(LedgerEntry {
                flight_id: flight.id,
                departure: flight.departure_time,
                block_end: flight.arrival_time.map(|arrival| arrival + self.turnaround),
                status: flight.status,
                is_ferry_flight: flight.is_ferry_flight,
            });
        }
        Ok(())
    }
}
