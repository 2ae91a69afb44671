//! Shared types, traits and errors for tabular-bench.
//!
//! Two embedded SQL engines are driven through the same [`Backend`] trait,
//! fed the same deterministic [`data::Dataset`], and timed on the same
//! grouped aggregation.

pub mod adapters;
pub mod data;
pub mod harness;
pub mod report;
pub mod sink;
pub mod workloads;

pub use data::{generate, City, Dataset, Person, DEFAULT_ROWS, DEFAULT_SEED};
pub use harness::{Harness, HarnessConfig, Stage};
pub use report::{compare, Report, Speedup};
pub use sink::{CaptureSink, OutputSink, RenderError, TerminalSink};
pub use workloads::{
    run_demo, time_group_aggregate, Clock, MonotonicClock, TimingResult, TrialTimer,
    DEFAULT_TRIALS,
};

use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

// ────────────────────────────────────────────────────────────────────────────────
// Error type
// ────────────────────────────────────────────────────────────────────────────────

pub type BenchResult<T> = std::result::Result<T, BenchError>;

#[derive(Debug, thiserror::Error)]
pub enum BenchError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("{backend} {operation} failed: {message}")]
    Backend {
        backend: String,
        operation: Operation,
        message: String,
    },
}

impl BenchError {
    pub fn backend(backend: &str, operation: Operation, err: impl fmt::Display) -> Self {
        BenchError::Backend {
            backend: backend.to_string(),
            operation,
            message: err.to_string(),
        }
    }
}

/// Backend operation named in [`BenchError::Backend`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Open,
    Load,
    Head,
    Schema,
    Describe,
    GroupAggregate,
    Filter,
    Release,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Operation::Open => "open",
            Operation::Load => "load",
            Operation::Head => "head",
            Operation::Schema => "schema",
            Operation::Describe => "describe",
            Operation::GroupAggregate => "group_aggregate",
            Operation::Filter => "filter",
            Operation::Release => "release",
        };
        f.write_str(s)
    }
}

// ────────────────────────────────────────────────────────────────────────────────
// Query model
// ────────────────────────────────────────────────────────────────────────────────

/// Columns of the fixed people schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Column {
    Name,
    Age,
    City,
    Salary,
}

impl Column {
    pub const ALL: [Column; 4] = [Column::Name, Column::Age, Column::City, Column::Salary];
    pub const NUMERIC: [Column; 2] = [Column::Age, Column::Salary];

    pub fn as_str(self) -> &'static str {
        match self {
            Column::Name => "Name",
            Column::Age => "Age",
            Column::City => "City",
            Column::Salary => "Salary",
        }
    }

    pub fn is_numeric(self) -> bool {
        matches!(self, Column::Age | Column::Salary)
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AggOp {
    Mean,
    Min,
    Max,
}

impl AggOp {
    pub fn as_str(self) -> &'static str {
        match self {
            AggOp::Mean => "mean",
            AggOp::Min => "min",
            AggOp::Max => "max",
        }
    }
}

/// One `(column, op)` pair of a grouped aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Aggregation {
    pub column: Column,
    pub op: AggOp,
}

impl Aggregation {
    pub const fn new(column: Column, op: AggOp) -> Self {
        Self { column, op }
    }

    /// Display label, e.g. `Salary_mean`.
    pub fn label(&self) -> String {
        format!("{}_{}", self.column, self.op.as_str())
    }
}

/// The aggregation timed by the benchmark: mean age and min/max/mean salary per city.
pub const BENCHMARK_AGGREGATIONS: [Aggregation; 4] = [
    Aggregation::new(Column::Age, AggOp::Mean),
    Aggregation::new(Column::Salary, AggOp::Min),
    Aggregation::new(Column::Salary, AggOp::Max),
    Aggregation::new(Column::Salary, AggOp::Mean),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl CmpOp {
    pub fn as_sql(self) -> &'static str {
        match self {
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
            CmpOp::Eq => "=",
            CmpOp::Ne => "<>",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Literal {
    Int(i64),
    Text(String),
}

impl From<i64> for Literal {
    fn from(v: i64) -> Self {
        Literal::Int(v)
    }
}

impl From<i32> for Literal {
    fn from(v: i32) -> Self {
        Literal::Int(i64::from(v))
    }
}

impl From<&str> for Literal {
    fn from(v: &str) -> Self {
        Literal::Text(v.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comparison {
    pub column: Column,
    pub op: CmpOp,
    pub value: Literal,
}

impl Comparison {
    pub fn new(column: Column, op: CmpOp, value: impl Into<Literal>) -> Self {
        Self {
            column,
            op,
            value: value.into(),
        }
    }
}

/// Conjunction of simple comparisons. The empty predicate matches every row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Predicate {
    pub clauses: Vec<Comparison>,
}

impl Predicate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn and(mut self, clause: Comparison) -> Self {
        self.clauses.push(clause);
        self
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.clauses.is_empty() {
            return f.write_str("true");
        }
        for (i, c) in self.clauses.iter().enumerate() {
            if i > 0 {
                f.write_str(" AND ")?;
            }
            match &c.value {
                Literal::Int(v) => write!(f, "{} {} {}", c.column, c.op.as_sql(), v)?,
                Literal::Text(v) => write!(f, "{} {} \"{}\"", c.column, c.op.as_sql(), v)?,
            }
        }
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────────
// Query results
// ────────────────────────────────────────────────────────────────────────────────

/// Opaque reference to a table loaded inside one backend instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handle {
    owner: u64,
    table: String,
    rows: u64,
}

impl Handle {
    pub(crate) fn new(owner: u64, table: impl Into<String>, rows: u64) -> Self {
        Self {
            owner,
            table: table.into(),
            rows,
        }
    }

    pub(crate) fn table(&self) -> &str {
        &self.table
    }

    /// Number of rows behind the handle.
    pub fn rows(&self) -> u64 {
        self.rows
    }

    /// Rejects handles minted by another adapter instance.
    pub(crate) fn check_owner(&self, owner: u64, backend: &str, op: Operation) -> BenchResult<()> {
        if self.owner == owner {
            Ok(())
        } else {
            Err(BenchError::backend(
                backend,
                op,
                format!("handle `{}` belongs to another backend instance", self.table),
            ))
        }
    }
}

static NEXT_INSTANCE_ID: AtomicU64 = AtomicU64::new(1);

/// Unique id for each adapter instance, stamped into the handles it creates.
pub(crate) fn next_instance_id() -> u64 {
    NEXT_INSTANCE_ID.fetch_add(1, Ordering::Relaxed)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnInfo {
    pub column: Column,
    pub dtype: String,
    pub non_null: u64,
}

/// Describe-style statistics for one numeric column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnSummary {
    pub column: Column,
    pub count: u64,
    pub mean: Option<f64>,
    pub std: Option<f64>,
    pub min: Option<f64>,
    pub q25: Option<f64>,
    pub q50: Option<f64>,
    pub q75: Option<f64>,
    pub max: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub columns: Vec<ColumnSummary>,
}

impl Summary {
    pub fn column(&self, column: Column) -> Option<&ColumnSummary> {
        self.columns.iter().find(|c| c.column == column)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Group {
    pub key: String,
    pub values: Vec<f64>,
}

/// Output of a grouped aggregation. Group order is whatever the engine produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregationResult {
    pub key: Column,
    pub aggregations: Vec<Aggregation>,
    pub groups: Vec<Group>,
}

impl AggregationResult {
    pub fn get(&self, key: &str) -> Option<&[f64]> {
        self.groups
            .iter()
            .find(|g| g.key == key)
            .map(|g| g.values.as_slice())
    }

    /// Groups sorted descending by the aggregate at `index`.
    pub fn sorted_desc(&self, index: usize) -> Vec<&Group> {
        let mut groups: Vec<&Group> = self.groups.iter().collect();
        groups.sort_by(|a, b| {
            let av = a.values.get(index).copied().unwrap_or(f64::NEG_INFINITY);
            let bv = b.values.get(index).copied().unwrap_or(f64::NEG_INFINITY);
            bv.total_cmp(&av)
        });
        groups
    }

    /// Same aggregations, same group keys, every value within `rel_tol`.
    pub fn approx_eq(&self, other: &AggregationResult, rel_tol: f64) -> bool {
        if self.key != other.key
            || self.aggregations != other.aggregations
            || self.groups.len() != other.groups.len()
        {
            return false;
        }
        self.groups.iter().all(|g| match other.get(&g.key) {
            Some(values) => {
                values.len() == g.values.len()
                    && g.values.iter().zip(values).all(|(a, b)| {
                        let scale = a.abs().max(b.abs()).max(1.0);
                        (a - b).abs() <= rel_tol * scale
                    })
            }
            None => false,
        })
    }
}

// ────────────────────────────────────────────────────────────────────────────────
// Backend trait: every adapter implements this
// ────────────────────────────────────────────────────────────────────────────────

/// Uniform operation set over a tabular computation engine.
///
/// Everything except `load` is a read-only query against a [`Handle`];
/// `filter` materializes its result and returns a fresh handle, which the
/// caller hands back through `release` once done with it.
pub trait Backend {
    fn name(&self) -> &str;

    fn load(&mut self, dataset: &Dataset) -> BenchResult<Handle>;

    /// First `n` rows in original order.
    fn head(&self, handle: &Handle, n: usize) -> BenchResult<Vec<Person>>;

    fn schema(&self, handle: &Handle) -> BenchResult<Vec<ColumnInfo>>;

    fn describe(&self, handle: &Handle) -> BenchResult<Summary>;

    fn group_aggregate(
        &self,
        handle: &Handle,
        key: Column,
        aggregations: &[Aggregation],
    ) -> BenchResult<AggregationResult>;

    fn filter(&self, handle: &Handle, predicate: &Predicate) -> BenchResult<Handle>;

    /// Drop the table behind `handle`, typically one returned by `filter`.
    fn release(&self, handle: Handle) -> BenchResult<()>;
}
