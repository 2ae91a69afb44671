//! Output sinks: where the harness sends text, tables, charts and progress.
//!
//! Rendering failures never abort a run. Callers route every sink call
//! through [`emit`], which logs the failure and moves on.

use colored::{ColoredString, Colorize};
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Cell, Table};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};

pub type RenderResult = std::result::Result<(), RenderError>;

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("write failed: {0}")]
    Io(#[from] io::Error),
    #[error("progress template: {0}")]
    Template(String),
}

/// Visual weight of a line or rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Plain,
    Muted,
    Note,
    Success,
    Accent,
    Warning,
    Blue,
    Magenta,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct TableView {
    pub title: Option<String>,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl TableView {
    pub fn new<S: Into<String>>(headers: impl IntoIterator<Item = S>) -> Self {
        Self {
            title: None,
            headers: headers.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn push_row(&mut self, row: Vec<String>) {
        self.rows.push(row);
    }
}

/// Horizontal bar chart: one labelled bar per value.
#[derive(Debug, Clone, PartialEq)]
pub struct BarChart {
    pub title: String,
    pub x_label: String,
    pub bars: Vec<(String, f64)>,
}

pub trait OutputSink {
    fn rule(&mut self, title: &str, tone: Tone) -> RenderResult;

    fn line(&mut self, text: &str, tone: Tone) -> RenderResult;

    fn table(&mut self, table: &TableView) -> RenderResult;

    fn bar_chart(&mut self, chart: &BarChart) -> RenderResult;

    /// Trial progress; `done == total` closes the indicator.
    fn progress(&mut self, _label: &str, _done: u32, _total: u32) -> RenderResult {
        Ok(())
    }
}

/// Log a failed render and carry on.
pub fn emit(segment: &str, result: RenderResult) {
    if let Err(e) = result {
        tracing::warn!(segment, error = %e, "render failed, skipping segment");
    }
}

// ────────────────────────────────────────────────────────────────────────────────
// Terminal sink
// ────────────────────────────────────────────────────────────────────────────────

const RULE_WIDTH: usize = 72;
const CHART_WIDTH: usize = 50;

pub struct TerminalSink {
    out: Box<dyn Write>,
    progress: Option<ProgressBar>,
}

impl TerminalSink {
    pub fn new(out: Box<dyn Write>) -> Self {
        Self {
            out,
            progress: None,
        }
    }

    pub fn stdout() -> Self {
        Self::new(Box::new(io::stdout()))
    }
}

fn paint(text: &str, tone: Tone) -> ColoredString {
    match tone {
        Tone::Plain => text.normal(),
        Tone::Muted => text.dimmed(),
        Tone::Note => text.yellow(),
        Tone::Success => text.green().bold(),
        Tone::Accent => text.cyan().bold(),
        Tone::Warning => text.red().bold(),
        Tone::Blue => text.blue().bold(),
        Tone::Magenta => text.magenta().bold(),
    }
}

/// A bar of `width` cells scaled against `max`, with eighth-block precision.
pub fn render_bar(value: f64, max: f64, width: usize) -> String {
    const PARTIALS: [char; 8] = [' ', '▏', '▎', '▍', '▌', '▋', '▊', '▉'];
    if !(max > 0.0) || !(value > 0.0) {
        return String::new();
    }
    let eighths = ((value / max).min(1.0) * (width * 8) as f64).round() as usize;
    let mut bar = "█".repeat(eighths / 8);
    if eighths % 8 > 0 {
        bar.push(PARTIALS[eighths % 8]);
    }
    bar
}

impl OutputSink for TerminalSink {
    fn rule(&mut self, title: &str, tone: Tone) -> RenderResult {
        let label = format!(" {} ", title);
        let side = RULE_WIDTH.saturating_sub(label.chars().count()) / 2;
        let bar = "━".repeat(side);
        writeln!(self.out, "\n{}", paint(&format!("{}{}{}", bar, label, bar), tone))?;
        Ok(())
    }

    fn line(&mut self, text: &str, tone: Tone) -> RenderResult {
        writeln!(self.out, "{}", paint(text, tone))?;
        Ok(())
    }

    fn table(&mut self, view: &TableView) -> RenderResult {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .apply_modifier(UTF8_ROUND_CORNERS);
        table.set_header(view.headers.iter().map(|h| Cell::new(h)).collect::<Vec<_>>());
        for row in &view.rows {
            table.add_row(row.iter().map(|c| Cell::new(c)).collect::<Vec<_>>());
        }

        if let Some(title) = &view.title {
            writeln!(self.out, "{}", title.as_str().italic())?;
        }
        writeln!(self.out, "{table}")?;
        Ok(())
    }

    fn bar_chart(&mut self, chart: &BarChart) -> RenderResult {
        let max = chart.bars.iter().map(|(_, v)| *v).fold(0.0f64, f64::max);
        let label_width = chart
            .bars
            .iter()
            .map(|(l, _)| l.chars().count())
            .max()
            .unwrap_or(0);

        writeln!(self.out, "\n{}", chart.title.as_str().bold())?;
        for (label, value) in &chart.bars {
            writeln!(
                self.out,
                "{:>w$} │{:<cw$} {:.4}",
                label,
                render_bar(*value, max, CHART_WIDTH).cyan(),
                value,
                w = label_width,
                cw = CHART_WIDTH + 1
            )?;
        }
        writeln!(
            self.out,
            "{:>w$}  {}",
            "",
            chart.x_label.as_str().dimmed(),
            w = label_width
        )?;
        Ok(())
    }

    fn progress(&mut self, label: &str, done: u32, total: u32) -> RenderResult {
        if self.progress.is_none() {
            let pb = ProgressBar::new(u64::from(total));
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} {msg} [{bar:40.cyan/blue}] {pos}/{len}")
                    .map_err(|e| RenderError::Template(e.to_string()))?
                    .progress_chars("#>-"),
            );
            pb.set_message(label.to_string());
            self.progress = Some(pb);
        }
        if let Some(pb) = &self.progress {
            pb.set_position(u64::from(done));
        }
        if done >= total {
            if let Some(pb) = self.progress.take() {
                pb.finish();
            }
        }
        Ok(())
    }
}

/// Discards everything.
pub struct NullSink;

impl OutputSink for NullSink {
    fn rule(&mut self, _title: &str, _tone: Tone) -> RenderResult {
        Ok(())
    }

    fn line(&mut self, _text: &str, _tone: Tone) -> RenderResult {
        Ok(())
    }

    fn table(&mut self, _table: &TableView) -> RenderResult {
        Ok(())
    }

    fn bar_chart(&mut self, _chart: &BarChart) -> RenderResult {
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────────
// Capture sink
// ────────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    Rule(String),
    Line(String, Tone),
    Table(TableView),
    Chart(BarChart),
    Progress { label: String, done: u32, total: u32 },
}

/// Records every segment instead of drawing it.
#[derive(Debug, Default)]
pub struct CaptureSink {
    pub segments: Vec<Segment>,
}

impl CaptureSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rules and lines, one per entry.
    pub fn lines(&self) -> Vec<&str> {
        self.segments
            .iter()
            .filter_map(|s| match s {
                Segment::Rule(t) | Segment::Line(t, _) => Some(t.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn tables(&self) -> Vec<&TableView> {
        self.segments
            .iter()
            .filter_map(|s| match s {
                Segment::Table(t) => Some(t),
                _ => None,
            })
            .collect()
    }

    pub fn charts(&self) -> Vec<&BarChart> {
        self.segments
            .iter()
            .filter_map(|s| match s {
                Segment::Chart(c) => Some(c),
                _ => None,
            })
            .collect()
    }
}

impl OutputSink for CaptureSink {
    fn rule(&mut self, title: &str, _tone: Tone) -> RenderResult {
        self.segments.push(Segment::Rule(title.to_string()));
        Ok(())
    }

    fn line(&mut self, text: &str, tone: Tone) -> RenderResult {
        self.segments.push(Segment::Line(text.to_string(), tone));
        Ok(())
    }

    fn table(&mut self, table: &TableView) -> RenderResult {
        self.segments.push(Segment::Table(table.clone()));
        Ok(())
    }

    fn bar_chart(&mut self, chart: &BarChart) -> RenderResult {
        self.segments.push(Segment::Chart(chart.clone()));
        Ok(())
    }

    fn progress(&mut self, label: &str, done: u32, total: u32) -> RenderResult {
        self.segments.push(Segment::Progress {
            label: label.to_string(),
            done,
            total,
        });
        Ok(())
    }
}
