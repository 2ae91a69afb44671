//! Full runs against the real engines on a small dataset.

use tabular_bench::adapters::duckdb_adapter::DuckDbAdapter;
use tabular_bench::adapters::sqlite_adapter::SqliteAdapter;
use tabular_bench::sink::Segment;
use tabular_bench::workloads::young_new_yorkers;
use tabular_bench::{
    generate, Backend, CaptureSink, Column, Harness, HarnessConfig, Speedup, Stage,
    BENCHMARK_AGGREGATIONS,
};

fn small_config() -> HarnessConfig {
    HarnessConfig {
        rows: 1_000,
        seed: 42,
        trials: 5,
    }
}

#[test]
fn test_sqlite_then_duckdb_run() {
    let mut sqlite = SqliteAdapter::new().unwrap();
    let mut duckdb = DuckDbAdapter::new().unwrap();
    let mut sink = CaptureSink::new();
    let mut harness = Harness::new(small_config());

    let report = harness.run(&mut sqlite, &mut duckdb, &mut sink).unwrap();

    assert_eq!(harness.stage(), &Stage::Done);
    let names: Vec<&str> = report.rows.iter().map(|r| r.backend.as_str()).collect();
    assert_eq!(names, vec!["SQLite", "DuckDB"]);
    assert!(report.rows.iter().all(|r| r.mean_secs >= 0.0));
    match report.speedup {
        Speedup::Ratio(r) => assert!(r > 0.0),
        Speedup::Unmeasurable => {}
    }
    assert_eq!(report.outputs_agree, Some(true));

    let lines = sink.lines();
    assert!(lines.contains(&"SQLite Demo"));
    assert!(lines.contains(&"DuckDB Demo"));
    assert!(lines.contains(&"Performance Comparison"));
    assert_eq!(sink.charts().len(), 1);

    let progress_ends = sink
        .segments
        .iter()
        .filter(|s| matches!(s, Segment::Progress { done: 5, total: 5, .. }))
        .count();
    assert_eq!(progress_ends, 2);
}

#[test]
fn test_engines_agree_on_same_data() {
    let data = generate(2_000, 7).unwrap();
    let mut sqlite = SqliteAdapter::new().unwrap();
    let mut duckdb = DuckDbAdapter::new().unwrap();
    let hs = sqlite.load(&data).unwrap();
    let hd = duckdb.load(&data).unwrap();

    let a = sqlite
        .group_aggregate(&hs, Column::City, &BENCHMARK_AGGREGATIONS)
        .unwrap();
    let b = duckdb
        .group_aggregate(&hd, Column::City, &BENCHMARK_AGGREGATIONS)
        .unwrap();
    assert_eq!(a.groups.len(), 5);
    assert!(a.approx_eq(&b, 1e-9));

    let expected = data
        .rows()
        .iter()
        .filter(|p| p.age < 30 && p.city.as_str() == "New York")
        .count() as u64;
    let fs = sqlite.filter(&hs, &young_new_yorkers()).unwrap();
    let fd = duckdb.filter(&hd, &young_new_yorkers()).unwrap();
    assert_eq!(fs.rows(), expected);
    assert_eq!(fd.rows(), expected);

    assert_eq!(
        sqlite.head(&hs, 5).unwrap(),
        duckdb.head(&hd, 5).unwrap()
    );
    assert_eq!(sqlite.head(&hs, 5).unwrap(), data.rows()[..5].to_vec());
}

#[test]
fn test_invalid_trials_rejected_before_loading() {
    let mut sqlite = SqliteAdapter::new().unwrap();
    let mut duckdb = DuckDbAdapter::new().unwrap();
    let mut harness = Harness::new(HarnessConfig {
        trials: 0,
        ..small_config()
    });

    assert!(harness
        .run(&mut sqlite, &mut duckdb, &mut CaptureSink::new())
        .is_err());
    assert!(matches!(harness.stage(), Stage::Aborted(_)));
}
