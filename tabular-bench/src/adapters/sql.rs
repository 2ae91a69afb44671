//! SQL text shared by the SQL-engine adapters.
//!
//! Every table carries a hidden `rid` column holding the original row index,
//! so `head` can order by it instead of trusting engine scan order.

use crate::{
    AggOp, Aggregation, BenchError, BenchResult, Column, Literal, Operation, Predicate,
};

pub const ROW_ID: &str = "rid";

pub fn ident(column: Column) -> String {
    format!("\"{}\"", column.as_str())
}

/// `'it''s'` style quoting for text literals.
pub fn quote_text(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

pub fn head_query(table: &str, n: usize) -> String {
    format!(
        "SELECT \"Name\", \"Age\", \"City\", \"Salary\" FROM {} ORDER BY {} LIMIT {}",
        table, ROW_ID, n
    )
}

pub fn count_query(table: &str) -> String {
    format!("SELECT COUNT(*) FROM {}", table)
}

pub fn non_null_query(table: &str) -> String {
    let cols: Vec<String> = Column::ALL
        .iter()
        .map(|c| format!("COUNT({})", ident(*c)))
        .collect();
    format!("SELECT {} FROM {}", cols.join(", "), table)
}

/// `SELECT key, agg... FROM table GROUP BY key`, every aggregate cast to DOUBLE.
pub fn aggregate_query(
    backend: &str,
    table: &str,
    key: Column,
    aggregations: &[Aggregation],
) -> BenchResult<String> {
    if aggregations.is_empty() {
        return Err(BenchError::backend(
            backend,
            Operation::GroupAggregate,
            "no aggregations requested",
        ));
    }
    if key.is_numeric() {
        return Err(BenchError::backend(
            backend,
            Operation::GroupAggregate,
            format!("cannot group by numeric column {}", key),
        ));
    }

    let mut select = vec![ident(key)];
    for agg in aggregations {
        if !agg.column.is_numeric() {
            return Err(BenchError::backend(
                backend,
                Operation::GroupAggregate,
                format!("unsupported aggregation {} on text column", agg.label()),
            ));
        }
        let func = match agg.op {
            AggOp::Mean => "AVG",
            AggOp::Min => "MIN",
            AggOp::Max => "MAX",
        };
        select.push(format!("CAST({}({}) AS DOUBLE)", func, ident(agg.column)));
    }

    Ok(format!(
        "SELECT {} FROM {} GROUP BY {}",
        select.join(", "),
        table,
        ident(key)
    ))
}

/// Render a conjunction to a WHERE body, rejecting literals of the wrong type.
pub fn where_clause(backend: &str, predicate: &Predicate) -> BenchResult<String> {
    if predicate.clauses.is_empty() {
        return Ok("1 = 1".to_string());
    }

    let mut parts = Vec::with_capacity(predicate.clauses.len());
    for c in &predicate.clauses {
        let value = match (&c.value, c.column.is_numeric()) {
            (Literal::Int(v), true) => v.to_string(),
            (Literal::Text(v), false) => quote_text(v),
            (Literal::Int(v), false) => {
                return Err(BenchError::backend(
                    backend,
                    Operation::Filter,
                    format!("malformed predicate: {} compared with integer {}", c.column, v),
                ))
            }
            (Literal::Text(v), true) => {
                return Err(BenchError::backend(
                    backend,
                    Operation::Filter,
                    format!("malformed predicate: {} compared with text '{}'", c.column, v),
                ))
            }
        };
        parts.push(format!("{} {} {}", ident(c.column), c.op.as_sql(), value));
    }
    Ok(parts.join(" AND "))
}

pub fn filter_ddl(
    backend: &str,
    target: &str,
    source: &str,
    predicate: &Predicate,
) -> BenchResult<String> {
    Ok(format!(
        "CREATE TABLE {} AS SELECT * FROM {} WHERE {} ORDER BY {}",
        target,
        source,
        where_clause(backend, predicate)?,
        ROW_ID
    ))
}

pub fn drop_query(table: &str) -> String {
    format!("DROP TABLE IF EXISTS {}", table)
}

/// Linear-interpolated quantile over an ascending slice.
pub fn interpolate(sorted_pair: (f64, f64), frac: f64) -> f64 {
    let (lo, hi) = sorted_pair;
    lo + (hi - lo) * frac
}

/// Zero-based position of quantile `q` among `n` values, split into
/// `(floor index, fractional part)`.
pub fn quantile_position(n: u64, q: f64) -> (u64, f64) {
    let pos = q * (n.saturating_sub(1)) as f64;
    let lo = pos.floor();
    (lo as u64, pos - lo)
}
