use std::fs;
use std::path::PathBuf;

use airsynth_generate::{
    CsvSinkFactory, FleetPlan, PipelineSettings, SynthesisEngine, SynthesisOptions,
};

fn temp_dir() -> PathBuf {
    std::env::temp_dir().join(format!("airsynth_synthesis_{}", uuid::Uuid::new_v4()))
}

fn small_options(seed: u64) -> SynthesisOptions {
    SynthesisOptions {
        seed,
        plan: FleetPlan {
            num_aircraft: 3,
            flights_per_aircraft_per_day: 2,
            days: 4,
            pax_per_flight: 10,
            num_airports: 5,
            unique_customer_ratio: 0.5,
            batch_size: 20,
            ..FleetPlan::default()
        },
        pipeline: PipelineSettings {
            num_producers: 2,
            num_consumers: 2,
            retry_delay_ms: 0,
            show_progress: false,
            ..PipelineSettings::default()
        },
        ..SynthesisOptions::default()
    }
}

fn data_lines(path: &PathBuf) -> usize {
    let contents = fs::read_to_string(path).expect("read csv");
    contents.lines().count().saturating_sub(1)
}

#[test]
fn engine_writes_every_table_in_phase_order() {
    let dir = temp_dir();
    let sinks = CsvSinkFactory::new(&dir).expect("csv sink");
    let result = SynthesisEngine::new(small_options(21))
        .with_run_id("test-run")
        .run(&sinks)
        .expect("synthesis");
    let report = &result.report;

    assert_eq!(report.run_id, "test-run");
    let phases: Vec<&str> = report.phases.iter().map(|p| p.producer.as_str()).collect();
    assert_eq!(
        phases,
        vec!["reference", "customers", "flights", "flight_complement"]
    );
    assert_eq!(report.parked_total, 0);
    assert!(result.parked.is_empty());

    let sizing = report.sizing;
    assert_eq!(sizing.annual_flights, 24);
    assert_eq!(sizing.customers, 120);
    assert_eq!(report.reference_rows.get("airports").copied(), Some(5));
    assert_eq!(report.reference_rows.get("airplanes").copied(), Some(3));

    let flights = report.phase("flights").expect("flights phase");
    assert_eq!(
        flights.rows_for("flights") + flights.stats.slots_skipped,
        sizing.annual_flights
    );

    assert_eq!(data_lines(&dir.join("customers.csv")), 120);
    assert_eq!(data_lines(&dir.join("airports.csv")), 5);
    assert_eq!(
        data_lines(&dir.join("flights.csv")) as u64,
        flights.rows_for("flights")
    );
    let complement = report.phase("flight_complement").expect("complement phase");
    if complement.rows_for("flight_bookings") > 0 {
        assert_eq!(
            data_lines(&dir.join("flight_bookings.csv")) as u64,
            complement.rows_for("flight_bookings")
        );
    }

    let _ = fs::remove_dir_all(dir);
}

#[test]
fn same_seed_yields_identical_reference_files() {
    let first = temp_dir();
    let second = temp_dir();
    for dir in [&first, &second] {
        let sinks = CsvSinkFactory::new(dir).expect("csv sink");
        SynthesisEngine::new(small_options(77))
            .run(&sinks)
            .expect("synthesis");
    }
    for table in ["pilots", "cabin_crew", "airports", "airplanes"] {
        let a = fs::read_to_string(first.join(format!("{table}.csv"))).expect("read");
        let b = fs::read_to_string(second.join(format!("{table}.csv"))).expect("read");
        assert_eq!(a, b, "{table} differs between runs");
    }

    let _ = fs::remove_dir_all(first);
    let _ = fs::remove_dir_all(second);
}
