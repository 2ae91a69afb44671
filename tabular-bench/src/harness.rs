//! Orchestrator: generate once, demo and time each backend, cross-check, compare.
//!
//! The run is a linear stage machine:
//!
//! ```text
//! Idle → DataGenerated → Demonstrated(A) → Timed(A)
//!      → Demonstrated(B) → Timed(B) → Compared → Done
//! ```
//!
//! Any `InvalidArgument` or backend error moves it to `Aborted` and no
//! report is produced.

use crate::data::{generate, Dataset, DEFAULT_ROWS, DEFAULT_SEED};
use crate::report::{self, Report};
use crate::sink::{emit, OutputSink, Tone};
use crate::workloads::{run_demo, Clock, MonotonicClock, TimedRun, TrialTimer, DEFAULT_TRIALS};
use crate::{Backend, BenchError, BenchResult};
use tracing::{debug, error, info, warn};

/// Relative tolerance for the cross-backend aggregate check.
pub const AGREEMENT_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarnessConfig {
    pub rows: usize,
    pub seed: u64,
    pub trials: u32,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            rows: DEFAULT_ROWS,
            seed: DEFAULT_SEED,
            trials: DEFAULT_TRIALS,
        }
    }
}

impl HarnessConfig {
    pub fn validate(&self) -> BenchResult<()> {
        if self.rows == 0 {
            return Err(BenchError::InvalidArgument("rows must be positive".into()));
        }
        if self.trials == 0 {
            return Err(BenchError::InvalidArgument("trials must be positive".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stage {
    Idle,
    DataGenerated,
    Demonstrated(String),
    Timed(String),
    Compared,
    Done,
    Aborted(String),
}

pub struct Harness {
    config: HarnessConfig,
    clock: Box<dyn Clock>,
    history: Vec<Stage>,
}

impl Harness {
    pub fn new(config: HarnessConfig) -> Self {
        Self {
            config,
            clock: Box::new(MonotonicClock::new()),
            history: vec![Stage::Idle],
        }
    }

    /// Replace the trial clock.
    pub fn with_clock(mut self, clock: Box<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn stage(&self) -> &Stage {
        self.history.last().unwrap_or(&Stage::Idle)
    }

    pub fn history(&self) -> &[Stage] {
        &self.history
    }

    fn advance(&mut self, stage: Stage) {
        debug!(?stage, "stage");
        self.history.push(stage);
    }

    /// Run the whole comparison. Backends are reported in argument order.
    pub fn run(
        &mut self,
        first: &mut dyn Backend,
        second: &mut dyn Backend,
        sink: &mut dyn OutputSink,
    ) -> BenchResult<Report> {
        match self.pipeline(first, second, sink) {
            Ok(report) => {
                self.advance(Stage::Done);
                Ok(report)
            }
            Err(e) => {
                error!(error = %e, "run aborted");
                self.advance(Stage::Aborted(e.to_string()));
                Err(e)
            }
        }
    }

    fn pipeline(
        &mut self,
        first: &mut dyn Backend,
        second: &mut dyn Backend,
        sink: &mut dyn OutputSink,
    ) -> BenchResult<Report> {
        self.config.validate()?;

        emit(
            "line",
            sink.line(
                &format!("Welcome to the {} vs {} benchmark!", first.name(), second.name()),
                Tone::Accent,
            ),
        );
        emit("line", sink.line("Generating sample data...", Tone::Plain));
        let dataset = generate(self.config.rows, self.config.seed)?;
        emit(
            "line",
            sink.line(
                &format!(
                    "Sample data generated successfully! ({} rows, seed {})",
                    dataset.len(),
                    self.config.seed
                ),
                Tone::Success,
            ),
        );
        self.advance(Stage::DataGenerated);

        let a = self.run_backend(first, &dataset, sink)?;
        let b = self.run_backend(second, &dataset, sink)?;

        let agree = a.output.approx_eq(&b.output, AGREEMENT_TOLERANCE);
        if agree {
            emit(
                "line",
                sink.line(
                    &format!(
                        "{} and {} produced matching aggregates",
                        a.timing.backend, b.timing.backend
                    ),
                    Tone::Muted,
                ),
            );
        } else {
            warn!(first = %a.timing.backend, second = %b.timing.backend, "aggregates disagree");
            emit(
                "line",
                sink.line(
                    &format!(
                        "Warning: {} and {} disagree on the aggregated values",
                        a.timing.backend, b.timing.backend
                    ),
                    Tone::Warning,
                ),
            );
        }

        let mut report = Report::from_timings(&a.timing, &b.timing);
        report.outputs_agree = Some(agree);
        report::render(&report, sink);
        self.advance(Stage::Compared);

        emit(
            "line",
            sink.line(
                &format!(
                    "\nBenchmark completed. Thank you for exploring {} and {}!",
                    a.timing.backend, b.timing.backend
                ),
                Tone::Accent,
            ),
        );
        Ok(report)
    }

    fn run_backend(
        &mut self,
        db: &mut dyn Backend,
        dataset: &Dataset,
        sink: &mut dyn OutputSink,
    ) -> BenchResult<TimedRun> {
        let name = db.name().to_string();

        let started = self.clock.now();
        let handle = db.load(dataset)?;
        info!(
            backend = %name,
            rows = handle.rows(),
            load_ms = self.clock.now().saturating_sub(started).as_millis() as u64,
            "dataset loaded"
        );

        run_demo(&*db, &handle, sink)?;
        self.advance(Stage::Demonstrated(name.clone()));

        let run = TrialTimer::new(self.config.trials, &*self.clock)?
            .time_group_aggregate(&*db, &handle, sink)?;
        emit(
            "line",
            sink.line(
                &format!(
                    "\n{} groupby operation time: {:.4} seconds",
                    name,
                    run.timing.mean_secs()
                ),
                Tone::Success,
            ),
        );
        self.advance(Stage::Timed(name));
        Ok(run)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::fixtures::{ManualClock, StubBackend};
    use crate::report::Speedup;
    use crate::sink::CaptureSink;
    use crate::Operation;
    use std::rc::Rc;
    use std::time::Duration;

    fn config(trials: u32) -> HarnessConfig {
        HarnessConfig {
            rows: 50,
            seed: 42,
            trials,
        }
    }

    fn stubs(clock: &Rc<ManualClock>, a: u64, b: u64) -> (StubBackend, StubBackend) {
        let first = StubBackend::steady(clock.clone(), Duration::from_millis(a)).named("Slow");
        let second = StubBackend::steady(clock.clone(), Duration::from_millis(b)).named("Fast");
        (first, second)
    }

    #[test]
    fn test_full_pipeline_stages() {
        let clock = Rc::new(ManualClock::default());
        let (mut a, mut b) = stubs(&clock, 20, 10);
        let mut harness = Harness::new(config(5)).with_clock(Box::new(clock.clone()));
        let mut sink = CaptureSink::new();

        let report = harness.run(&mut a, &mut b, &mut sink).unwrap();
        assert_eq!(report.speedup, Speedup::Ratio(2.0));
        assert_eq!(report.faster(), Some("Fast"));
        assert_eq!(report.outputs_agree, Some(true));
        assert_eq!(
            harness.history(),
            &[
                Stage::Idle,
                Stage::DataGenerated,
                Stage::Demonstrated("Slow".into()),
                Stage::Timed("Slow".into()),
                Stage::Demonstrated("Fast".into()),
                Stage::Timed("Fast".into()),
                Stage::Compared,
                Stage::Done,
            ]
        );
        assert!(sink
            .lines()
            .iter()
            .any(|l| l.contains("Slow groupby operation time: 0.0200 seconds")));
    }

    #[test]
    fn test_backend_error_aborts() {
        let clock = Rc::new(ManualClock::default());
        let (mut a, b) = stubs(&clock, 20, 10);
        let mut b = b.failing_on(Operation::Filter);
        let mut harness = Harness::new(config(5)).with_clock(Box::new(clock.clone()));
        let mut sink = CaptureSink::new();

        let err = harness.run(&mut a, &mut b, &mut sink).unwrap_err();
        assert!(matches!(err, BenchError::Backend { operation: Operation::Filter, .. }));
        assert!(matches!(harness.stage(), Stage::Aborted(_)));
        assert!(!harness.history().contains(&Stage::Compared));
        assert!(harness.history().contains(&Stage::Timed("Slow".into())));
        assert!(sink.charts().is_empty());
    }

    #[test]
    fn test_invalid_config_aborts_before_work() {
        let clock = Rc::new(ManualClock::default());
        let (mut a, mut b) = stubs(&clock, 1, 1);
        let mut harness = Harness::new(config(0)).with_clock(Box::new(clock.clone()));

        let err = harness.run(&mut a, &mut b, &mut CaptureSink::new()).unwrap_err();
        assert!(matches!(err, BenchError::InvalidArgument(_)));
        assert_eq!(a.aggregate_calls(), 0);
        assert_eq!(harness.history().len(), 2);
    }

    #[test]
    fn test_zero_duration_is_unmeasurable() {
        let clock = Rc::new(ManualClock::default());
        let (mut a, mut b) = stubs(&clock, 5, 0);
        let mut harness = Harness::new(config(5)).with_clock(Box::new(clock.clone()));
        let mut sink = CaptureSink::new();

        let report = harness.run(&mut a, &mut b, &mut sink).unwrap();
        assert_eq!(report.speedup, Speedup::Unmeasurable);
        assert_eq!(harness.stage(), &Stage::Done);
        assert!(sink.lines().iter().any(|l| l.contains("N/A")));
    }

    #[test]
    fn test_default_config() {
        let c = HarnessConfig::default();
        assert_eq!((c.rows, c.seed, c.trials), (100_000, 42, 5));
        assert!(c.validate().is_ok());
        assert!(HarnessConfig { rows: 0, ..c }.validate().is_err());
    }
}
