//! Head-to-head comparison of two timings: table, verdict line and bar chart.

use crate::sink::{emit, BarChart, OutputSink, TableView, Tone};
use crate::workloads::TimingResult;
use serde::Serialize;

pub const OPERATION_TITLE: &str = "Groupby Operation Performance";

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Speedup {
    /// First backend's mean time divided by the second's.
    Ratio(f64),
    /// A timing was zero or otherwise unusable as a ratio operand.
    Unmeasurable,
}

impl Speedup {
    pub fn ratio(self) -> Option<f64> {
        match self {
            Speedup::Ratio(r) => Some(r),
            Speedup::Unmeasurable => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportRow {
    pub backend: String,
    pub mean_secs: f64,
}

/// Rows stay in benchmark order, never sorted by speed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub operation: String,
    pub rows: Vec<ReportRow>,
    pub speedup: Speedup,
    /// Whether both backends produced the same aggregates; unset when not checked.
    pub outputs_agree: Option<bool>,
}

fn usable(t: f64) -> bool {
    t.is_finite() && t > 0.0
}

/// `speedup = time_a / time_b`; zero, negative or non-finite times give
/// [`Speedup::Unmeasurable`].
pub fn compare(name_a: &str, time_a: f64, name_b: &str, time_b: f64) -> Report {
    let speedup = if usable(time_a) && usable(time_b) {
        Speedup::Ratio(time_a / time_b)
    } else {
        tracing::warn!(time_a, time_b, "timing unusable for a ratio");
        Speedup::Unmeasurable
    };
    Report {
        operation: OPERATION_TITLE.to_string(),
        rows: vec![
            ReportRow {
                backend: name_a.to_string(),
                mean_secs: time_a,
            },
            ReportRow {
                backend: name_b.to_string(),
                mean_secs: time_b,
            },
        ],
        speedup,
        outputs_agree: None,
    }
}

impl Report {
    pub fn from_timings(a: &TimingResult, b: &TimingResult) -> Self {
        compare(&a.backend, a.mean_secs(), &b.backend, b.mean_secs())
    }

    /// Name of the faster backend, if a ratio exists and is not a tie.
    pub fn faster(&self) -> Option<&str> {
        let r = self.speedup.ratio()?;
        if r > 1.0 {
            Some(&self.rows[1].backend)
        } else if r < 1.0 {
            Some(&self.rows[0].backend)
        } else {
            None
        }
    }

    pub fn verdict(&self) -> String {
        let (a, b) = (&self.rows[0].backend, &self.rows[1].backend);
        match self.speedup {
            Speedup::Ratio(r) if r > 1.0 => {
                format!("{} is {:.2}x faster than {} for this operation", b, r, a)
            }
            Speedup::Ratio(r) if r < 1.0 => {
                format!("{} is {:.2}x faster than {} for this operation", a, 1.0 / r, b)
            }
            Speedup::Ratio(_) => format!("{} and {} performed identically", a, b),
            Speedup::Unmeasurable => {
                "Speedup: N/A (a timing was below clock resolution)".to_string()
            }
        }
    }

    pub fn speedup_label(&self) -> String {
        match self.speedup {
            Speedup::Ratio(r) => format!("{:.2}x", r),
            Speedup::Unmeasurable => "N/A".to_string(),
        }
    }
}

/// Section rule, timing table, verdict and bar chart; each segment best-effort.
pub fn render(report: &Report, sink: &mut dyn OutputSink) {
    emit("rule", sink.rule("Performance Comparison", Tone::Magenta));

    let mut table = TableView::new(["Library", "Time (seconds)"]).with_title(&report.operation);
    for row in &report.rows {
        table.push_row(vec![row.backend.clone(), format!("{:.4}", row.mean_secs)]);
    }
    emit("table", sink.table(&table));

    let tone = match report.speedup {
        Speedup::Ratio(_) => Tone::Success,
        Speedup::Unmeasurable => Tone::Warning,
    };
    emit("verdict", sink.line(&format!("\n{}", report.verdict()), tone));

    emit(
        "chart",
        sink.bar_chart(&BarChart {
            title: report.operation.clone(),
            x_label: "Time (seconds)".to_string(),
            bars: report
                .rows
                .iter()
                .map(|r| (r.backend.clone(), r.mean_secs))
                .collect(),
        }),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::CaptureSink;
    use std::time::Duration;

    #[test]
    fn test_speedup_second_faster() {
        let r = compare("SQLite", 2.0, "DuckDB", 1.0);
        assert_eq!(r.speedup, Speedup::Ratio(2.0));
        assert_eq!(r.faster(), Some("DuckDB"));
        assert_eq!(r.verdict(), "DuckDB is 2.00x faster than SQLite for this operation");
    }

    #[test]
    fn test_speedup_first_faster() {
        let r = compare("SQLite", 1.0, "DuckDB", 4.0);
        assert_eq!(r.speedup, Speedup::Ratio(0.25));
        assert_eq!(r.faster(), Some("SQLite"));
        assert_eq!(r.verdict(), "SQLite is 4.00x faster than DuckDB for this operation");
    }

    #[test]
    fn test_tie() {
        let r = compare("A", 1.5, "B", 1.5);
        assert_eq!(r.faster(), None);
        assert_eq!(r.verdict(), "A and B performed identically");
    }

    #[test]
    fn test_zero_time_is_unmeasurable() {
        let r = compare("SQLite", 2.0, "DuckDB", 0.0);
        assert_eq!(r.speedup, Speedup::Unmeasurable);
        assert_eq!(r.speedup_label(), "N/A");
        assert_eq!(r.faster(), None);

        assert_eq!(compare("a", 0.0, "b", 1.0).speedup, Speedup::Unmeasurable);
        assert_eq!(compare("a", f64::NAN, "b", 1.0).speedup, Speedup::Unmeasurable);
    }

    #[test]
    fn test_rows_keep_benchmark_order() {
        let r = compare("Slow", 9.0, "Fast", 1.0);
        let names: Vec<&str> = r.rows.iter().map(|r| r.backend.as_str()).collect();
        assert_eq!(names, vec!["Slow", "Fast"]);
    }

    #[test]
    fn test_from_timings() {
        let a = TimingResult {
            backend: "SQLite".into(),
            trials: 5,
            mean: Duration::from_millis(30),
        };
        let b = TimingResult {
            backend: "DuckDB".into(),
            trials: 5,
            mean: Duration::from_millis(10),
        };
        let r = Report::from_timings(&a, &b);
        let ratio = r.speedup.ratio().unwrap();
        assert!((ratio - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_render_segments() {
        let r = compare("SQLite", 0.125, "DuckDB", 0.01);
        let mut sink = CaptureSink::new();
        render(&r, &mut sink);

        let tables = sink.tables();
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].rows[0], vec!["SQLite".to_string(), "0.1250".to_string()]);
        assert_eq!(tables[0].rows[1], vec!["DuckDB".to_string(), "0.0100".to_string()]);

        let lines = sink.lines();
        assert_eq!(lines[0], "Performance Comparison");
        assert!(lines[1].contains("DuckDB is 12.50x faster than SQLite"));

        let charts = sink.charts();
        assert_eq!(charts.len(), 1);
        assert_eq!(charts[0].bars[0].0, "SQLite");
        assert_eq!(charts[0].bars[1].1, 0.01);
    }

    #[test]
    fn test_report_json() {
        let json = serde_json::to_value(compare("a", 1.0, "b", 0.0)).unwrap();
        assert_eq!(json["speedup"]["kind"], "unmeasurable");
        assert_eq!(json["rows"][0]["backend"], "a");

        let json = serde_json::to_value(compare("a", 3.0, "b", 1.5)).unwrap();
        assert_eq!(json["speedup"]["value"], 2.0);
    }
}
