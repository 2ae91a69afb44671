//! Demo sequence and group-by timing, run against any [`Backend`].

use crate::sink::{emit, NullSink, OutputSink, TableView, Tone};
use crate::{
    AggOp, Aggregation, AggregationResult, Backend, BenchError, BenchResult, CmpOp, Column,
    ColumnInfo, Comparison, Handle, Person, Predicate, Summary, BENCHMARK_AGGREGATIONS,
};
use std::time::{Duration, Instant};
use tracing::{debug, info};

pub const DEFAULT_TRIALS: u32 = 5;
pub const PREVIEW_ROWS: usize = 5;

// ────────────────────────────────────────────────────────────────────────────────
// Clock
// ────────────────────────────────────────────────────────────────────────────────

/// Monotonic time source, as an offset from an arbitrary origin.
pub trait Clock {
    fn now(&self) -> Duration;
}

pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    #[inline(always)]
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

// ────────────────────────────────────────────────────────────────────────────────
// Operation runner
// ────────────────────────────────────────────────────────────────────────────────

/// People under 30 living in New York.
pub fn young_new_yorkers() -> Predicate {
    Predicate::new()
        .and(Comparison::new(Column::Age, CmpOp::Lt, 30))
        .and(Comparison::new(Column::City, CmpOp::Eq, "New York"))
}

/// Preview, schema, summary statistics, average salary by city, and a filter.
///
/// Backend errors propagate; render errors are logged and skipped.
pub fn run_demo(db: &dyn Backend, handle: &Handle, sink: &mut dyn OutputSink) -> BenchResult<()> {
    let name = db.name();
    emit("rule", sink.rule(&format!("{} Demo", name), Tone::Blue));
    info!(backend = name, rows = handle.rows(), "running demo sequence");

    let head = db.head(handle, PREVIEW_ROWS)?;
    emit("line", sink.line(&format!("\nFirst {} rows:", PREVIEW_ROWS), Tone::Note));
    emit("table", sink.table(&people_table(&head)));

    let schema = db.schema(handle)?;
    emit("line", sink.line("\nDataframe schema:", Tone::Note));
    emit("table", sink.table(&schema_table(&schema, handle.rows())));

    let summary = db.describe(handle)?;
    emit("line", sink.line("\nSummary statistics:", Tone::Note));
    emit("table", sink.table(&summary_table(&summary)));

    let by_city = db.group_aggregate(
        handle,
        Column::City,
        &[Aggregation::new(Column::Salary, AggOp::Mean)],
    )?;
    emit("line", sink.line("\nAverage salary by city:", Tone::Note));
    emit("table", sink.table(&ranked_table(&by_city, 0)));

    let predicate = young_new_yorkers();
    let young = db.filter(handle, &predicate)?;
    let preview = db.head(&young, PREVIEW_ROWS)?;
    emit("line", sink.line("\nPeople under 30 in New York:", Tone::Note));
    emit("table", sink.table(&people_table(&preview)));
    emit(
        "line",
        sink.line(
            &format!("{} of {} rows match {}", young.rows(), handle.rows(), predicate),
            Tone::Muted,
        ),
    );
    db.release(young)?;

    Ok(())
}

fn people_table(rows: &[Person]) -> TableView {
    let mut t = TableView::new(["Name", "Age", "City", "Salary"]);
    for p in rows {
        t.push_row(vec![
            p.name.clone(),
            p.age.to_string(),
            p.city.to_string(),
            p.salary.to_string(),
        ]);
    }
    t
}

fn schema_table(columns: &[ColumnInfo], rows: u64) -> TableView {
    let mut t = TableView::new(["Column", "Dtype", "Non-Null Count"])
        .with_title(format!("{} entries, {} columns", rows, columns.len()));
    for c in columns {
        t.push_row(vec![
            c.column.to_string(),
            c.dtype.clone(),
            format!("{} non-null", c.non_null),
        ]);
    }
    t
}

fn fmt_stat(v: Option<f64>) -> String {
    match v {
        Some(v) => format!("{:.2}", v),
        None => "NaN".to_string(),
    }
}

/// Statistics as rows, one column per numeric field.
fn summary_table(summary: &Summary) -> TableView {
    let mut headers = vec!["".to_string()];
    headers.extend(summary.columns.iter().map(|c| c.column.to_string()));
    let mut t = TableView::new(headers);

    t.push_row(
        std::iter::once("count".to_string())
            .chain(summary.columns.iter().map(|c| c.count.to_string()))
            .collect(),
    );
    let stats: [(&str, fn(&crate::ColumnSummary) -> Option<f64>); 7] = [
        ("mean", |c| c.mean),
        ("std", |c| c.std),
        ("min", |c| c.min),
        ("25%", |c| c.q25),
        ("50%", |c| c.q50),
        ("75%", |c| c.q75),
        ("max", |c| c.max),
    ];
    for (label, get) in stats {
        t.push_row(
            std::iter::once(label.to_string())
                .chain(summary.columns.iter().map(|c| fmt_stat(get(c))))
                .collect(),
        );
    }
    t
}

/// Groups sorted descending by the aggregate at `index`.
fn ranked_table(result: &AggregationResult, index: usize) -> TableView {
    let mut headers = vec![result.key.to_string()];
    headers.extend(result.aggregations.iter().map(|a| a.label()));
    let mut t = TableView::new(headers);
    for g in result.sorted_desc(index) {
        let mut row = vec![g.key.clone()];
        row.extend(g.values.iter().map(|v| format!("{:.2}", v)));
        t.push_row(row);
    }
    t
}

// ────────────────────────────────────────────────────────────────────────────────
// Benchmark timer
// ────────────────────────────────────────────────────────────────────────────────

/// Mean wall-clock duration of the benchmarked operation on one backend.
#[derive(Debug, Clone, PartialEq)]
pub struct TimingResult {
    pub backend: String,
    pub trials: u32,
    pub mean: Duration,
}

impl TimingResult {
    pub fn mean_secs(&self) -> f64 {
        self.mean.as_secs_f64()
    }
}

/// A timing plus the output of the last trial, kept for cross-checking.
#[derive(Debug, Clone)]
pub struct TimedRun {
    pub timing: TimingResult,
    pub output: AggregationResult,
}

/// Runs the benchmark aggregation `trials` times back to back and averages.
pub struct TrialTimer<'c> {
    trials: u32,
    clock: &'c dyn Clock,
}

impl<'c> TrialTimer<'c> {
    pub fn new(trials: u32, clock: &'c dyn Clock) -> BenchResult<Self> {
        if trials == 0 {
            return Err(BenchError::InvalidArgument(
                "trial count must be positive".into(),
            ));
        }
        Ok(Self { trials, clock })
    }

    /// Group by City with mean(Age), min/max/mean(Salary), once per trial.
    ///
    /// Trials run sequentially on the calling thread; only the backend call
    /// sits inside the timed window.
    pub fn time_group_aggregate(
        &self,
        db: &dyn Backend,
        handle: &Handle,
        sink: &mut dyn OutputSink,
    ) -> BenchResult<TimedRun> {
        let label = format!("Running {} groupby...", db.name());
        emit("progress", sink.progress(&label, 0, self.trials));

        let mut total = Duration::ZERO;
        let mut last = None;
        for trial in 1..=self.trials {
            let start = self.clock.now();
            let result = db.group_aggregate(handle, Column::City, &BENCHMARK_AGGREGATIONS)?;
            let elapsed = self.clock.now().saturating_sub(start);
            total += elapsed;
            last = Some(std::hint::black_box(result));

            debug!(
                backend = db.name(),
                trial,
                elapsed_us = elapsed.as_micros() as u64,
                "trial finished"
            );
            emit("progress", sink.progress(&label, trial, self.trials));
        }

        let output = last.ok_or_else(|| BenchError::InvalidArgument("no trials ran".into()))?;
        let timing = TimingResult {
            backend: db.name().to_string(),
            trials: self.trials,
            mean: total / self.trials,
        };
        info!(
            backend = %timing.backend,
            trials = timing.trials,
            mean_secs = timing.mean_secs(),
            "group-by timed"
        );
        Ok(TimedRun { timing, output })
    }
}

/// Time the benchmark aggregation with the monotonic clock and no progress output.
pub fn time_group_aggregate(
    db: &dyn Backend,
    handle: &Handle,
    trials: u32,
) -> BenchResult<TimingResult> {
    let clock = MonotonicClock::new();
    let timer = TrialTimer::new(trials, &clock)?;
    Ok(timer.time_group_aggregate(db, handle, &mut NullSink)?.timing)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::fixtures::{self, FailingSink, ManualClock, StubBackend};
    use crate::adapters::sqlite_adapter::SqliteAdapter;
    use crate::sink::{CaptureSink, Segment};
    use crate::Operation;
    use std::rc::Rc;

    #[test]
    fn test_timer_averages_scripted_durations() {
        let clock = Rc::new(ManualClock::default());
        let secs = [1, 2, 3, 4, 5].map(Duration::from_secs);
        let mut stub = StubBackend::new(clock.clone(), &secs);
        let h = stub.load(&fixtures::three_people()).unwrap();

        let timer = TrialTimer::new(5, &*clock).unwrap();
        let run = timer.time_group_aggregate(&stub, &h, &mut NullSink).unwrap();
        assert_eq!(run.timing.mean, Duration::from_secs(3));
        assert_eq!(run.timing.mean_secs(), 3.0);
        assert_eq!(run.timing.trials, 5);
        assert_eq!(stub.aggregate_calls(), 5);
    }

    #[test]
    fn test_zero_trials_rejected() {
        let clock = MonotonicClock::new();
        assert!(matches!(
            TrialTimer::new(0, &clock),
            Err(BenchError::InvalidArgument(_))
        ));

        let mut db = SqliteAdapter::new().unwrap();
        let h = db.load(&fixtures::three_people()).unwrap();
        assert!(matches!(
            time_group_aggregate(&db, &h, 0),
            Err(BenchError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_timer_reports_progress() {
        let clock = Rc::new(ManualClock::default());
        let mut stub = StubBackend::new(clock.clone(), &[Duration::from_millis(10); 3]);
        let h = stub.load(&fixtures::three_people()).unwrap();

        let mut sink = CaptureSink::new();
        TrialTimer::new(3, &*clock)
            .unwrap()
            .time_group_aggregate(&stub, &h, &mut sink)
            .unwrap();
        let done: Vec<u32> = sink
            .segments
            .iter()
            .filter_map(|s| match s {
                Segment::Progress { done, total: 3, .. } => Some(*done),
                _ => None,
            })
            .collect();
        assert_eq!(done, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_real_timer_returns_benchmark_output() {
        let mut db = SqliteAdapter::new().unwrap();
        let h = db.load(&fixtures::three_people()).unwrap();
        let clock = MonotonicClock::new();
        let run = TrialTimer::new(2, &clock)
            .unwrap()
            .time_group_aggregate(&db, &h, &mut NullSink)
            .unwrap();
        assert_eq!(run.timing.backend, "SQLite");
        assert_eq!(run.output.aggregations, BENCHMARK_AGGREGATIONS.to_vec());
        assert_eq!(run.output.groups.len(), 2);
    }

    #[test]
    fn test_run_demo_sequence() {
        let mut db = SqliteAdapter::new().unwrap();
        let h = db.load(&fixtures::three_people()).unwrap();
        let mut sink = CaptureSink::new();
        run_demo(&db, &h, &mut sink).unwrap();

        let lines = sink.lines();
        assert_eq!(lines[0], "SQLite Demo");
        let headings: Vec<&str> = lines
            .iter()
            .map(|l| l.trim())
            .filter(|l| l.ends_with(':'))
            .collect();
        assert_eq!(
            headings,
            vec![
                "First 5 rows:",
                "Dataframe schema:",
                "Summary statistics:",
                "Average salary by city:",
                "People under 30 in New York:",
            ]
        );

        let tables = sink.tables();
        assert_eq!(tables.len(), 5);
        assert_eq!(tables[0].rows.len(), 3);
        // average salary by city, highest first
        assert_eq!(tables[3].rows[0][0], "Tokyo");
        assert_eq!(tables[3].rows[0][1], "90000.00");
        assert_eq!(tables[3].rows[1][0], "Paris");
        // nobody in the fixture lives in New York
        assert!(tables[4].rows.is_empty());
    }

    #[test]
    fn test_run_demo_releases_filtered_table() {
        let clock = Rc::new(ManualClock::default());
        let mut stub = StubBackend::new(clock, &[]);
        let h = stub.load(&fixtures::three_people()).unwrap();
        run_demo(&stub, &h, &mut CaptureSink::new()).unwrap();
        assert_eq!(stub.released(), vec!["stub_filtered".to_string()]);
    }

    #[test]
    fn test_run_demo_propagates_backend_error() {
        let clock = Rc::new(ManualClock::default());
        let mut stub = StubBackend::new(clock, &[]).failing_on(Operation::Describe);
        let h = stub.load(&fixtures::three_people()).unwrap();
        let err = run_demo(&stub, &h, &mut CaptureSink::new()).unwrap_err();
        assert!(matches!(
            err,
            BenchError::Backend { operation: Operation::Describe, .. }
        ));
    }

    #[test]
    fn test_render_errors_are_not_fatal() {
        let mut db = SqliteAdapter::new().unwrap();
        let h = db.load(&fixtures::three_people()).unwrap();
        let mut sink = FailingSink::default();
        run_demo(&db, &h, &mut sink).unwrap();
        assert!(sink.attempts > 5);
    }
}
