use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::warn;

use crate::model::{Batch, TableRows};
use crate::sink::{BatchSink, SinkError, SinkFactory};

/// Writes each table to `<dir>/<table>.csv`.
///
/// Every session shares one file per table, so the header is emitted once
/// and concurrent batches never interleave rows inside a table. A batch is
/// encoded in memory before any file is touched, and a failed append is
/// truncated back, so a batch lands in full or not at all.
#[derive(Clone)]
pub struct CsvSinkFactory {
    shared: Arc<CsvShared>,
}

struct CsvShared {
    dir: PathBuf,
    tables: Mutex<HashMap<&'static str, Arc<Mutex<TableFile>>>>,
}

impl CsvSinkFactory {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, SinkError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            shared: Arc::new(CsvShared {
                dir,
                tables: Mutex::new(HashMap::new()),
            }),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.shared.dir
    }

    /// Bytes written so far, per table file.
    pub fn bytes_written(&self) -> HashMap<&'static str, u64> {
        self.shared
            .tables
            .lock()
            .iter()
            .map(|(table, file)| (*table, file.lock().len))
            .collect()
    }
}

impl CsvShared {
    fn file(&self, table: &'static str) -> Result<Arc<Mutex<TableFile>>, SinkError> {
        let mut tables = self.tables.lock();
        if let Some(file) = tables.get(table) {
            return Ok(Arc::clone(file));
        }
        let file = File::create(self.dir.join(format!("{table}.csv")))?;
        let file = Arc::new(Mutex::new(TableFile { file, len: 0 }));
        tables.insert(table, Arc::clone(&file));
        Ok(file)
    }
}

impl SinkFactory for CsvSinkFactory {
    type Sink = CsvSink;

    fn open(&self) -> Result<Self::Sink, SinkError> {
        Ok(CsvSink {
            shared: Arc::clone(&self.shared),
        })
    }
}

/// Session handed to one consumer.
pub struct CsvSink {
    shared: Arc<CsvShared>,
}

impl BatchSink for CsvSink {
    fn write_batch(&mut self, batch: &Batch) -> Result<(), SinkError> {
        // Keyed by table name: files are locked in a fixed order.
        let mut pending: BTreeMap<&'static str, Encoded> = BTreeMap::new();
        for table in &batch.tables {
            if table.is_empty() {
                continue;
            }
            let encoded = match table {
                TableRows::Customers(rows) => Encoded::rows(rows)?,
                TableRows::Pilots(rows) => Encoded::rows(rows)?,
                TableRows::CabinCrew(rows) => Encoded::rows(rows)?,
                TableRows::Airports(rows) => Encoded::rows(rows)?,
                TableRows::Airplanes(rows) => Encoded::rows(rows)?,
                TableRows::Flights(rows) => Encoded::rows(rows)?,
                TableRows::FlightCabinCrew(rows) => Encoded::rows(rows)?,
                TableRows::FlightBookings(rows) => Encoded::rows(rows)?,
            };
            match pending.get_mut(table.table_name()) {
                Some(existing) => existing.body.extend_from_slice(&encoded.body),
                None => {
                    pending.insert(table.table_name(), encoded);
                }
            }
        }

        let files = pending
            .keys()
            .map(|table| self.shared.file(*table))
            .collect::<Result<Vec<_>, _>>()?;
        let mut guards: Vec<_> = files.iter().map(|file| file.lock()).collect();
        let starts: Vec<u64> = guards.iter().map(|guard| guard.len).collect();

        for (index, encoded) in pending.values().enumerate() {
            if let Err(err) = guards[index].append(encoded) {
                for (guard, start) in guards[..=index].iter_mut().zip(&starts) {
                    if let Err(rollback) = guard.truncate(*start) {
                        warn!(error = %rollback, "failed to roll back csv append");
                    }
                }
                return Err(err.into());
            }
        }
        Ok(())
    }
}

/// One table's rows serialized ahead of the append.
struct Encoded {
    header: Vec<u8>,
    body: Vec<u8>,
}

impl Encoded {
    fn rows<T: Serialize>(rows: &[T]) -> Result<Self, SinkError> {
        let mut writer = ::csv::Writer::from_writer(Vec::new());
        for row in rows {
            writer.serialize(row)?;
        }
        let mut header = writer
            .into_inner()
            .map_err(|err| SinkError::Io(err.into_error()))?;
        // Column names never contain a newline, so the header is the first line.
        let split = header
            .iter()
            .position(|byte| *byte == b'\n')
            .map_or(header.len(), |pos| pos + 1);
        let body = header.split_off(split);
        Ok(Self { header, body })
    }
}

struct TableFile {
    file: File,
    len: u64,
}

impl TableFile {
    fn append(&mut self, encoded: &Encoded) -> std::io::Result<()> {
        if self.len == 0 {
            self.file.write_all(&encoded.header)?;
            self.len = encoded.header.len() as u64;
        }
        self.file.write_all(&encoded.body)?;
        self.file.flush()?;
        self.len += encoded.body.len() as u64;
        Ok(())
    }

    fn truncate(&mut self, len: u64) -> std::io::Result<()> {
        self.file.set_len(len)?;
        self.file.seek(SeekFrom::Start(len))?;
        self.len = len;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use airsynth_core::{Customer, FlightBooking, FlightCabinCrew};

    use super::*;

    fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("airsynth_csv_{}", uuid::Uuid::new_v4()))
    }

    fn customer(id: u64) -> Customer {
        Customer {
            id,
            full_name: format!("Customer {id}"),
            email: format!("c{id}@example.com"),
            frequent_flyer: id % 2 == 0,
        }
    }

    #[test]
    fn header_is_written_once_across_sessions() {
        let dir = temp_dir();
        let factory = CsvSinkFactory::new(&dir).expect("factory");

        let mut first = factory.open().expect("session");
        let mut second = factory.open().expect("session");
        first
            .write_batch(&Batch::new(0, vec![TableRows::Customers(vec![customer(1)])]))
            .expect("write");
        second
            .write_batch(&Batch::new(
                1,
                vec![TableRows::Customers(vec![customer(2), customer(3)])],
            ))
            .expect("write");

        let contents = fs::read_to_string(dir.join("customers.csv")).expect("read csv");
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines[0], "id,full_name,email,frequent_flyer");
        assert_eq!(lines.len(), 4);
        assert_eq!(
            contents.matches("full_name").count(),
            1,
            "header repeated: {contents}"
        );
        assert_eq!(
            factory.bytes_written().get("customers").copied(),
            Some(contents.len() as u64)
        );

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn empty_tables_create_no_file() {
        let dir = temp_dir();
        let factory = CsvSinkFactory::new(&dir).expect("factory");
        let mut sink = factory.open().expect("session");
        let batch = Batch::new(
            0,
            vec![
                TableRows::FlightCabinCrew(Vec::new()),
                TableRows::FlightBookings(vec![FlightBooking {
                    flight_id: 4,
                    customer_id: 9,
                    seat_number: "1".to_string(),
                }]),
            ],
        );
        sink.write_batch(&batch).expect("write");

        assert!(!dir.join("flight_cabin_crew.csv").exists());
        let bookings = fs::read_to_string(dir.join("flight_bookings.csv")).expect("read csv");
        assert!(bookings.contains("4,9,1"));

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn failed_table_leaves_earlier_tables_untouched() {
        let dir = temp_dir();
        let factory = CsvSinkFactory::new(&dir).expect("factory");
        fs::create_dir_all(dir.join("flight_bookings.csv")).expect("blocking dir");

        let mut sink = factory.open().expect("session");
        let batch = Batch::new(
            0,
            vec![
                TableRows::FlightCabinCrew(vec![FlightCabinCrew {
                    flight_id: 1,
                    cabin_crew_id: 7,
                }]),
                TableRows::FlightBookings(vec![FlightBooking {
                    flight_id: 1,
                    customer_id: 9,
                    seat_number: "1".to_string(),
                }]),
            ],
        );
        for _ in 0..3 {
            assert!(sink.write_batch(&batch).is_err());
        }

        let crew = fs::read_to_string(dir.join("flight_cabin_crew.csv")).unwrap_or_default();
        assert_eq!(crew.matches("1,7").count(), 0, "partial batch on disk: {crew}");
        assert_eq!(
            factory
                .bytes_written()
                .get("flight_cabin_crew")
                .copied()
                .unwrap_or(0),
            0
        );

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn rolled_back_file_still_gets_its_header() {
        let dir = temp_dir();
        let factory = CsvSinkFactory::new(&dir).expect("factory");
        let mut sink = factory.open().expect("session");

        let shared = factory.shared.file("customers").expect("file");
        let encoded = Encoded::rows(&[customer(1)]).expect("encode");
        {
            let mut file = shared.lock();
            file.append(&encoded).expect("append");
            file.truncate(0).expect("truncate");
        }
        sink.write_batch(&Batch::new(
            0,
            vec![TableRows::Customers(vec![customer(2)])],
        ))
            .expect("write");

        let contents = fs::read_to_string(dir.join("customers.csv")).expect("read csv");
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(
            lines,
            vec![
                "id,full_name,email,frequent_flyer",
                "2,Customer 2,c2@example.com,true"
            ]
        );

        let _ = fs::remove_dir_all(dir);
    }
}
