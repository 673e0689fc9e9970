//! Sink adapters: where committed batches go.
//!
//! The pipeline opens one session per consumer worker through a
//! [`SinkFactory`] and hands it whole batches. A write either commits every
//! table in the batch or reports an error; the pipeline decides whether to
//! retry, park or abort.

mod csv;
mod ledger;

pub use self::csv::{CsvSink, CsvSinkFactory};
pub use self::ledger::{FlightLedger, LedgerEntry, LedgerSink};

use thiserror::Error;

use crate::model::Batch;

/// Errors reported by sink sessions.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("csv error: {0}")]
    Csv(#[from] ::csv::Error),
    #[error("backend error: {0}")]
    Backend(String),
    #[error("batch rejected: {0}")]
    Rejected(String),
}

/// Opens write sessions; shared by reference across consumer threads.
pub trait SinkFactory: Sync {
    type Sink: BatchSink;

    fn open(&self) -> Result<Self::Sink, SinkError>;
}

/// One consumer's write session.
pub trait BatchSink {
    /// Writes every table of `batch`, in order, as one unit.
    fn write_batch(&mut self, batch: &Batch) -> Result<(), SinkError>;
}

impl<F: SinkFactory> SinkFactory for &F {
    type Sink = F::Sink;

    fn open(&self) -> Result<Self::Sink, SinkError> {
        (**self).open()
    }
}
