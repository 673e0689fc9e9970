//! Postgres sink: one transaction of multi-row inserts per batch.

use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::query_builder::Separated;
use sqlx::{Postgres, QueryBuilder};
use tokio::runtime::Handle;
use tracing::debug;

use airsynth_core::{
    Airplane, Airport, CabinCrewMember, Customer, Flight, FlightBooking, FlightCabinCrew, Pilot,
};
use airsynth_generate::{Batch, BatchSink, SinkError, SinkFactory, TableRows};

/// Postgres caps a statement at 65535 bind parameters.
const MAX_BIND_PARAMS: usize = 65_535;

/// Enum type of `flights.status`; text binds need an explicit cast.
const FLIGHT_STATUS_TYPE: &str = "flight_status";

/// Opens Postgres sessions that share one connection pool.
///
/// Consumers are plain threads, so each write blocks on `runtime` until the
/// transaction commits.
pub struct PgSinkFactory {
    pool: PgPool,
    runtime: Handle,
    schema: Arc<str>,
}

impl PgSinkFactory {
    pub async fn connect(
        url: &str,
        max_connections: u32,
        schema: &str,
    ) -> Result<Self, sqlx::Error> {
        if !is_identifier(schema) {
            return Err(sqlx::Error::Configuration(
                format!("invalid schema name: {schema}").into(),
            ));
        }
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .connect(url)
            .await?;
        Ok(Self {
            pool,
            runtime: Handle::current(),
            schema: Arc::from(schema),
        })
    }
}

impl SinkFactory for PgSinkFactory {
    type Sink = PgSink;

    fn open(&self) -> Result<Self::Sink, SinkError> {
        Ok(PgSink {
            pool: self.pool.clone(),
            runtime: self.runtime.clone(),
            schema: Arc::clone(&self.schema),
        })
    }
}

pub struct PgSink {
    pool: PgPool,
    runtime: Handle,
    schema: Arc<str>,
}

impl BatchSink for PgSink {
    fn write_batch(&mut self, batch: &Batch) -> Result<(), SinkError> {
        self.runtime
            .block_on(write_tables(&self.pool, &self.schema, batch))
            .map_err(|err| SinkError::Backend(err.to_string()))
    }
}

async fn write_tables(pool: &PgPool, schema: &str, batch: &Batch) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;
    for table in &batch.tables {
        match table {
            TableRows::Customers(rows) => insert_rows(&mut tx, schema, rows).await?,
            TableRows::Pilots(rows) => insert_rows(&mut tx, schema, rows).await?,
            TableRows::CabinCrew(rows) => insert_rows(&mut tx, schema, rows).await?,
            TableRows::Airports(rows) => insert_rows(&mut tx, schema, rows).await?,
            TableRows::Airplanes(rows) => insert_rows(&mut tx, schema, rows).await?,
            TableRows::Flights(rows) => insert_rows(&mut tx, schema, rows).await?,
            TableRows::FlightCabinCrew(rows) => insert_rows(&mut tx, schema, rows).await?,
            TableRows::FlightBookings(rows) => insert_rows(&mut tx, schema, rows).await?,
        }
    }
    tx.commit().await?;
    debug!(batch = batch.index, rows = batch.rows(), "batch inserted");
    Ok(())
}

async fn insert_rows<R: InsertRow>(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    schema: &str,
    rows: &[R],
) -> Result<(), sqlx::Error> {
    for chunk in rows.chunks(rows_per_statement(R::COLUMNS.len())) {
        let mut builder = QueryBuilder::<Postgres>::new(insert_prefix(schema, R::TABLE, R::COLUMNS));
        builder.push_values(chunk, |mut values, row| row.bind_row(&mut values, schema));
        builder.build().execute(&mut **tx).await?;
    }
    Ok(())
}

fn insert_prefix(schema: &str, table: &str, columns: &[&str]) -> String {
    format!("INSERT INTO {schema}.{table} ({}) ", columns.join(", "))
}

fn rows_per_statement(columns: usize) -> usize {
    (MAX_BIND_PARAMS / columns.max(1)).max(1)
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(first) if first.is_ascii_alphabetic() || first == '_')
        && chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
}

/// Ids are generated well inside `i64`; Postgres has no unsigned types.
fn id(value: u64) -> i64 {
    value as i64
}

/// Maps an entity onto its table's columns.
trait InsertRow {
    const TABLE: &'static str;
    const COLUMNS: &'static [&'static str];

    /// `schema` qualifies any user-defined column types.
    fn bind_row<'args>(
        &self,
        row: &mut Separated<'_, 'args, Postgres, &'static str>,
        schema: &str,
    );
}

impl InsertRow for Customer {
    const TABLE: &'static str = "customers";
    const COLUMNS: &'static [&'static str] = &["id", "full_name", "email", "frequent_flyer"];

    fn bind_row<'args>(
        &self,
        row: &mut Separated<'_, 'args, Postgres, &'static str>,
        _schema: &str,
    ) {
        row.push_bind(id(self.id))
            .push_bind(self.full_name.clone())
            .push_bind(self.email.clone())
            .push_bind(self.frequent_flyer);
    }
}

impl InsertRow for Pilot {
    const TABLE: &'static str = "pilots";
    const COLUMNS: &'static [&'static str] = &["id", "name", "license_number"];

    fn bind_row<'args>(
        &self,
        row: &mut Separated<'_, 'args, Postgres, &'static str>,
        _schema: &str,
    ) {
        row.push_bind(id(self.id))
            .push_bind(self.name.clone())
            .push_bind(self.license_number.clone());
    }
}

impl InsertRow for CabinCrewMember {
    const TABLE: &'static str = "cabin_crew";
    const COLUMNS: &'static [&'static str] = &["id", "name", "employee_id"];

    fn bind_row<'args>(
        &self,
        row: &mut Separated<'_, 'args, Postgres, &'static str>,
        _schema: &str,
    ) {
        row.push_bind(id(self.id))
            .push_bind(self.name.clone())
            .push_bind(self.employee_id.clone());
    }
}

impl InsertRow for Airport {
    const TABLE: &'static str = "airports";
    const COLUMNS: &'static [&'static str] = &["id", "code", "name", "city", "country"];

    fn bind_row<'args>(
        &self,
        row: &mut Separated<'_, 'args, Postgres, &'static str>,
        _schema: &str,
    ) {
        row.push_bind(id(self.id))
            .push_bind(self.code.clone())
            .push_bind(self.name.clone())
            .push_bind(self.city.clone())
            .push_bind(self.country.clone());
    }
}

impl InsertRow for Airplane {
    const TABLE: &'static str = "airplanes";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "model",
        "registration_number",
        "fuel_consumption_per_hour",
        "maintenance_days",
    ];

    fn bind_row<'args>(
        &self,
        row: &mut Separated<'_, 'args, Postgres, &'static str>,
        _schema: &str,
    ) {
        row.push_bind(id(self.id))
            .push_bind(self.model.clone())
            .push_bind(self.registration_number.clone())
            .push_bind(self.fuel_consumption_per_hour)
            .push_bind(self.maintenance_days as i32);
    }
}

impl InsertRow for Flight {
    const TABLE: &'static str = "flights";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "flight_number",
        "departure_airport_id",
        "arrival_airport_id",
        "departure_time",
        "arrival_time",
        "delay_minutes",
        "status",
        "pilot_id",
        "copilot_id",
        "airplane_id",
        "is_ferry_flight",
        "estimated_flight_hours",
    ];

    fn bind_row<'args>(
        &self,
        row: &mut Separated<'_, 'args, Postgres, &'static str>,
        schema: &str,
    ) {
        row.push_bind(id(self.id))
            .push_bind(self.flight_number.clone())
            .push_bind(id(self.departure_airport_id))
            .push_bind(id(self.arrival_airport_id))
            .push_bind(self.departure_time)
            .push_bind(self.arrival_time)
            .push_bind(self.delay_minutes)
            .push_bind(self.status.as_str())
            .push_unseparated(format_args!("::{schema}.{FLIGHT_STATUS_TYPE}"))
            .push_bind(self.pilot_id.map(id))
            .push_bind(self.copilot_id.map(id))
            .push_bind(id(self.airplane_id))
            .push_bind(self.is_ferry_flight)
            .push_bind(self.estimated_flight_hours);
    }
}

impl InsertRow for FlightCabinCrew {
    const TABLE: &'static str = "flight_cabin_crew";
    const COLUMNS: &'static [&'static str] = &["flight_id", "cabin_crew_id"];

    fn bind_row<'args>(
        &self,
        row: &mut Separated<'_, 'args, Postgres, &'static str>,
        _schema: &str,
    ) {
        row.push_bind(id(self.flight_id))
            .push_bind(id(self.cabin_crew_id));
    }
}

impl InsertRow for FlightBooking {
    const TABLE: &'static str = "flight_bookings";
    const COLUMNS: &'static [&'static str] = &["flight_id", "customer_id", "seat_number"];

    fn bind_row<'args>(
        &self,
        row: &mut Separated<'_, 'args, Postgres, &'static str>,
        _schema: &str,
    ) {
        row.push_bind(id(self.flight_id))
            .push_bind(id(self.customer_id))
            .push_bind(self.seat_number.clone());
    }
}

#[cfg(test)]
mod tests {
    use anyhow::{Context, Result};
    use chrono::{NaiveDate, NaiveDateTime};

    use airsynth_core::FlightStatus;

    use super::*;

    fn departure() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, 1)
            .and_then(|date| date.and_hms_opt(8, 0, 0))
            .expect("valid timestamp")
    }

    fn flight(id: u64, from: u64, to: u64, airplane_id: u64) -> Flight {
        Flight {
            id,
            flight_number: "AS1234".to_string(),
            departure_airport_id: from,
            arrival_airport_id: to,
            departure_time: departure(),
            arrival_time: Some(departure() + chrono::TimeDelta::hours(2)),
            delay_minutes: 0,
            status: FlightStatus::Scheduled,
            pilot_id: None,
            copilot_id: None,
            airplane_id,
            is_ferry_flight: false,
            estimated_flight_hours: 2.0,
        }
    }

    #[test]
    fn flight_status_is_cast_to_the_schema_enum() {
        let rows = [flight(1, 1, 2, 1), flight(2, 2, 1, 1)];
        let mut builder =
            QueryBuilder::<Postgres>::new(insert_prefix("airline", Flight::TABLE, Flight::COLUMNS));
        builder.push_values(&rows, |mut values, row| row.bind_row(&mut values, "airline"));

        let sql = builder.sql();
        assert!(sql.contains("$7, $8::airline.flight_status, $9"), "{sql}");
        assert!(sql.contains("$20, $21::airline.flight_status, $22"), "{sql}");
        assert_eq!(sql.matches("::airline.flight_status").count(), 2);
    }

    #[test]
    fn insert_prefix_lists_columns_in_order() {
        assert_eq!(
            insert_prefix("airline", FlightBooking::TABLE, FlightBooking::COLUMNS),
            "INSERT INTO airline.flight_bookings (flight_id, customer_id, seat_number) "
        );
    }

    #[test]
    fn statements_stay_under_the_bind_limit() {
        let per_statement = rows_per_statement(Flight::COLUMNS.len());
        assert!(per_statement * Flight::COLUMNS.len() <= MAX_BIND_PARAMS);
        assert_eq!(rows_per_statement(2), 32_767);
        assert_eq!(rows_per_statement(0), MAX_BIND_PARAMS);
    }

    #[test]
    fn schema_names_must_be_plain_identifiers() {
        assert!(is_identifier("airline"));
        assert!(is_identifier("_staging2"));
        assert!(!is_identifier("2airline"));
        assert!(!is_identifier("airline; drop table flights"));
        assert!(!is_identifier(""));
    }

    /// Needs a database with the airline tables; skipped when
    /// `TEST_DATABASE_URL` is unset.
    #[tokio::test(flavor = "multi_thread")]
    async fn writes_a_batch_in_one_transaction() -> Result<()> {
        let Ok(url) = std::env::var("TEST_DATABASE_URL") else {
            return Ok(());
        };
        let factory = PgSinkFactory::connect(&url, 2, "airline")
            .await
            .context("connecting to Postgres")?;
        let offset = u64::from(uuid::Uuid::new_v4().as_u128() as u32) + 1_000_000;
        let airport = |id: u64| Airport {
            id,
            code: format!("T{}", id % 100),
            name: format!("Test Airport {id}"),
            city: "Testville".to_string(),
            country: "Testland".to_string(),
        };
        let batch = Batch::new(
            0,
            vec![
                TableRows::Customers(vec![Customer {
                    id: offset,
                    full_name: "Test Customer".to_string(),
                    email: "test@example.com".to_string(),
                    frequent_flyer: true,
                }]),
                TableRows::Airports(vec![airport(offset), airport(offset + 1)]),
                TableRows::Airplanes(vec![Airplane {
                    id: offset,
                    model: "A320".to_string(),
                    registration_number: format!("T-{offset}"),
                    fuel_consumption_per_hour: 2_500.0,
                    maintenance_days: 10,
                }]),
                TableRows::Flights(vec![flight(offset, offset, offset + 1, offset)]),
            ],
        );
        let mut sink = factory.open()?;
        tokio::task::spawn_blocking(move || sink.write_batch(&batch)).await??;

        let customers: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM airline.customers WHERE id = $1")
                .bind(id(offset))
                .fetch_one(&factory.pool)
                .await?;
        assert_eq!(customers, 1);
        let status: String =
            sqlx::query_scalar("SELECT status::text FROM airline.flights WHERE id = $1")
                .bind(id(offset))
                .fetch_one(&factory.pool)
                .await?;
        assert_eq!(status, "scheduled");
        Ok(())
    }
}
