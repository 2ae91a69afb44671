//! SQLite adapter (via rusqlite).
//!
//! Configuration: in-memory database, MEMORY temp store, 64 MB page cache.
//! Row-oriented storage; quantiles are computed with ORDER BY/OFFSET probes
//! since SQLite has no percentile aggregate.

use super::sql;
use crate::data::{City, Dataset, Person};
use crate::{
    next_instance_id, Aggregation, AggregationResult, Backend, BenchError, BenchResult,
    Column, ColumnInfo, ColumnSummary, Group, Handle, Operation, Predicate, Summary,
};
use rusqlite::{params, Connection};
use std::cell::Cell;

const NAME: &str = "SQLite";

fn err(op: Operation) -> impl Fn(rusqlite::Error) -> BenchError {
    move |e| BenchError::backend(NAME, op, e)
}

pub struct SqliteAdapter {
    conn: Connection,
    id: u64,
    tables: Cell<u32>,
}

impl SqliteAdapter {
    pub fn new() -> BenchResult<Self> {
        let conn = Connection::open_in_memory().map_err(err(Operation::Open))?;

        conn.execute_batch(
            "PRAGMA temp_store = MEMORY;
             PRAGMA cache_size = -64000;",
        )
        .map_err(err(Operation::Open))?;

        Ok(Self {
            conn,
            id: next_instance_id(),
            tables: Cell::new(0),
        })
    }

    fn next_table(&self, prefix: &str) -> String {
        let n = self.tables.get() + 1;
        self.tables.set(n);
        format!("{}_{}", prefix, n)
    }

    fn count_rows(&self, table: &str, op: Operation) -> BenchResult<u64> {
        let count: i64 = self
            .conn
            .query_row(&sql::count_query(table), [], |row| row.get(0))
            .map_err(err(op))?;
        Ok(count as u64)
    }

    fn quantile(&self, table: &str, column: Column, n: u64, q: f64) -> BenchResult<Option<f64>> {
        if n == 0 {
            return Ok(None);
        }
        let (lo, frac) = sql::quantile_position(n, q);
        let query = format!(
            "SELECT {col} FROM {table} ORDER BY {col} LIMIT 2 OFFSET ?1",
            col = sql::ident(column),
            table = table
        );
        let mut stmt = self.conn.prepare_cached(&query).map_err(err(Operation::Describe))?;
        let rows = stmt
            .query_map(params![lo as i64], |row| row.get::<_, f64>(0))
            .map_err(err(Operation::Describe))?;
        let mut probe = Vec::with_capacity(2);
        for r in rows {
            probe.push(r.map_err(err(Operation::Describe))?);
        }
        Ok(match probe.as_slice() {
            [lo_v, hi_v, ..] => Some(sql::interpolate((*lo_v, *hi_v), frac)),
            [only] => Some(*only),
            [] => None,
        })
    }

    fn summarize(&self, table: &str, column: Column) -> BenchResult<ColumnSummary> {
        let col = sql::ident(column);
        let (count, mean, min, max): (i64, Option<f64>, Option<f64>, Option<f64>) = self
            .conn
            .query_row(
                &format!(
                    "SELECT COUNT({c}), AVG({c}), MIN({c}), MAX({c}) FROM {t}",
                    c = col,
                    t = table
                ),
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .map_err(err(Operation::Describe))?;
        let count = count as u64;

        // Two-pass sample standard deviation.
        let std = match mean {
            Some(m) if count >= 2 => {
                let ss: f64 = self
                    .conn
                    .query_row(
                        &format!(
                            "SELECT SUM(({c} - ?1) * ({c} - ?1)) FROM {t}",
                            c = col,
                            t = table
                        ),
                        params![m],
                        |row| row.get(0),
                    )
                    .map_err(err(Operation::Describe))?;
                Some((ss / (count - 1) as f64).sqrt())
            }
            _ => None,
        };

        Ok(ColumnSummary {
            column,
            count,
            mean,
            std,
            min,
            q25: self.quantile(table, column, count, 0.25)?,
            q50: self.quantile(table, column, count, 0.50)?,
            q75: self.quantile(table, column, count, 0.75)?,
            max,
        })
    }
}

impl Backend for SqliteAdapter {
    fn name(&self) -> &str {
        NAME
    }

    fn load(&mut self, dataset: &Dataset) -> BenchResult<Handle> {
        let table = self.next_table("people");
        self.conn
            .execute_batch(&format!(
                "CREATE TABLE {} (
                    rid      INTEGER PRIMARY KEY,
                    \"Name\"   TEXT    NOT NULL,
                    \"Age\"    INTEGER NOT NULL,
                    \"City\"   TEXT    NOT NULL,
                    \"Salary\" INTEGER NOT NULL
                );",
                table
            ))
            .map_err(err(Operation::Load))?;

        let tx = self.conn.transaction().map_err(err(Operation::Load))?;
        {
            let mut stmt = tx
                .prepare_cached(&format!(
                    "INSERT INTO {} (rid, \"Name\", \"Age\", \"City\", \"Salary\")
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    table
                ))
                .map_err(err(Operation::Load))?;
            for (i, p) in dataset.rows().iter().enumerate() {
                stmt.execute(params![i as i64, p.name, p.age, p.city.as_str(), p.salary])
                    .map_err(err(Operation::Load))?;
            }
        }
        tx.commit().map_err(err(Operation::Load))?;

        Ok(Handle::new(self.id, table, dataset.len() as u64))
    }

    fn head(&self, handle: &Handle, n: usize) -> BenchResult<Vec<Person>> {
        handle.check_owner(self.id, NAME, Operation::Head)?;
        let mut stmt = self
            .conn
            .prepare(&sql::head_query(handle.table(), n))
            .map_err(err(Operation::Head))?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)?,
                ))
            })
            .map_err(err(Operation::Head))?;

        let mut people = Vec::with_capacity(n);
        for r in rows {
            let (name, age, city, salary) = r.map_err(err(Operation::Head))?;
            let city: City = city
                .parse()
                .map_err(|e: String| BenchError::backend(NAME, Operation::Head, e))?;
            people.push(Person { name, age, city, salary });
        }
        Ok(people)
    }

    fn schema(&self, handle: &Handle) -> BenchResult<Vec<ColumnInfo>> {
        handle.check_owner(self.id, NAME, Operation::Schema)?;
        let mut stmt = self
            .conn
            .prepare(&format!("PRAGMA table_info({})", handle.table()))
            .map_err(err(Operation::Schema))?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(1)?, row.get::<_, String>(2)?)))
            .map_err(err(Operation::Schema))?;
        let mut declared = Vec::new();
        for r in rows {
            declared.push(r.map_err(err(Operation::Schema))?);
        }

        let non_null: [i64; 4] = self
            .conn
            .query_row(&sql::non_null_query(handle.table()), [], |row| {
                Ok([row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?])
            })
            .map_err(err(Operation::Schema))?;

        Column::ALL
            .iter()
            .zip(non_null)
            .map(|(col, count)| {
                let dtype = declared
                    .iter()
                    .find(|(name, _)| name == col.as_str())
                    .map(|(_, ty)| ty.clone())
                    .ok_or_else(|| {
                        BenchError::backend(
                            NAME,
                            Operation::Schema,
                            format!("missing column {}", col),
                        )
                    })?;
                Ok(ColumnInfo {
                    column: *col,
                    dtype,
                    non_null: count as u64,
                })
            })
            .collect()
    }

    fn describe(&self, handle: &Handle) -> BenchResult<Summary> {
        handle.check_owner(self.id, NAME, Operation::Describe)?;
        let columns = Column::NUMERIC
            .iter()
            .map(|c| self.summarize(handle.table(), *c))
            .collect::<BenchResult<Vec<_>>>()?;
        Ok(Summary { columns })
    }

    fn group_aggregate(
        &self,
        handle: &Handle,
        key: Column,
        aggregations: &[Aggregation],
    ) -> BenchResult<AggregationResult> {
        handle.check_owner(self.id, NAME, Operation::GroupAggregate)?;
        let query = sql::aggregate_query(NAME, handle.table(), key, aggregations)?;
        let mut stmt = self
            .conn
            .prepare_cached(&query)
            .map_err(err(Operation::GroupAggregate))?;
        let width = aggregations.len();
        let rows = stmt
            .query_map([], |row| {
                let key: String = row.get(0)?;
                let mut values = Vec::with_capacity(width);
                for i in 1..=width {
                    values.push(row.get::<_, f64>(i)?);
                }
                Ok(Group { key, values })
            })
            .map_err(err(Operation::GroupAggregate))?;

        let mut groups = Vec::new();
        for r in rows {
            groups.push(r.map_err(err(Operation::GroupAggregate))?);
        }
        Ok(AggregationResult {
            key,
            aggregations: aggregations.to_vec(),
            groups,
        })
    }

    fn filter(&self, handle: &Handle, predicate: &Predicate) -> BenchResult<Handle> {
        handle.check_owner(self.id, NAME, Operation::Filter)?;
        let target = self.next_table("filtered");
        let ddl = sql::filter_ddl(NAME, &target, handle.table(), predicate)?;
        self.conn.execute_batch(&ddl).map_err(err(Operation::Filter))?;
        let rows = self.count_rows(&target, Operation::Filter)?;
        Ok(Handle::new(self.id, target, rows))
    }

    fn release(&self, handle: Handle) -> BenchResult<()> {
        handle.check_owner(self.id, NAME, Operation::Release)?;
        self.conn
            .execute_batch(&sql::drop_query(handle.table()))
            .map_err(err(Operation::Release))
    }
}
