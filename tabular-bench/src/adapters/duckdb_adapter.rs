//! DuckDB adapter.
//!
//! Configuration: in-memory database, 4 threads. Columnar, vectorised
//! execution; rows are bulk-loaded through the appender API.

use super::sql;
use crate::data::{City, Dataset, Person};
use crate::{
    next_instance_id, Aggregation, AggregationResult, Backend, BenchError, BenchResult,
    Column, ColumnInfo, ColumnSummary, Group, Handle, Operation, Predicate, Summary,
};
use duckdb::{params, Connection};
use std::cell::Cell;

const NAME: &str = "DuckDB";

fn err(op: Operation) -> impl Fn(duckdb::Error) -> BenchError {
    move |e| BenchError::backend(NAME, op, e)
}

pub struct DuckDbAdapter {
    conn: Connection,
    id: u64,
    tables: Cell<u32>,
}

impl DuckDbAdapter {
    pub fn new() -> BenchResult<Self> {
        let conn = Connection::open_in_memory().map_err(err(Operation::Open))?;

        conn.execute_batch("SET threads = 4;")
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

    fn summarize(&self, table: &str, column: Column) -> BenchResult<ColumnSummary> {
        let query = format!(
            "SELECT COUNT({c}),
                    CAST(AVG({c}) AS DOUBLE),
                    CAST(STDDEV_SAMP({c}) AS DOUBLE),
                    CAST(MIN({c}) AS DOUBLE),
                    CAST(quantile_cont({c}, 0.25) AS DOUBLE),
                    CAST(quantile_cont({c}, 0.50) AS DOUBLE),
                    CAST(quantile_cont({c}, 0.75) AS DOUBLE),
                    CAST(MAX({c}) AS DOUBLE)
             FROM {t}",
            c = sql::ident(column),
            t = table
        );
        let mut stmt = self.conn.prepare(&query).map_err(err(Operation::Describe))?;
        let mut rows = stmt.query([]).map_err(err(Operation::Describe))?;
        let row = rows
            .next()
            .map_err(err(Operation::Describe))?
            .ok_or_else(|| BenchError::backend(NAME, Operation::Describe, "no result"))?;

        let count: i64 = row.get(0).map_err(err(Operation::Describe))?;
        let stat = |i: usize| -> BenchResult<Option<f64>> {
            row.get::<_, Option<f64>>(i).map_err(err(Operation::Describe))
        };
        Ok(ColumnSummary {
            column,
            count: count as u64,
            mean: stat(1)?,
            std: stat(2)?,
            min: stat(3)?,
            q25: stat(4)?,
            q50: stat(5)?,
            q75: stat(6)?,
            max: stat(7)?,
        })
    }
}

impl Backend for DuckDbAdapter {
    fn name(&self) -> &str {
        NAME
    }

    fn load(&mut self, dataset: &Dataset) -> BenchResult<Handle> {
        let table = self.next_table("people");
        self.conn
            .execute_batch(&format!(
                "CREATE TABLE {} (
                    rid      BIGINT  NOT NULL,
                    \"Name\"   VARCHAR NOT NULL,
                    \"Age\"    BIGINT  NOT NULL,
                    \"City\"   VARCHAR NOT NULL,
                    \"Salary\" BIGINT  NOT NULL
                );",
                table
            ))
            .map_err(err(Operation::Load))?;

        {
            let mut app = self.conn.appender(&table).map_err(err(Operation::Load))?;
            for (i, p) in dataset.rows().iter().enumerate() {
                app.append_row(params![i as i64, p.name, p.age, p.city.as_str(), p.salary])
                    .map_err(err(Operation::Load))?;
            }
            app.flush().map_err(err(Operation::Load))?;
        }

        Ok(Handle::new(self.id, table, dataset.len() as u64))
    }

    fn head(&self, handle: &Handle, n: usize) -> BenchResult<Vec<Person>> {
        handle.check_owner(self.id, NAME, Operation::Head)?;
        let mut stmt = self
            .conn
            .prepare(&sql::head_query(handle.table(), n))
            .map_err(err(Operation::Head))?;
        let mut rows = stmt.query([]).map_err(err(Operation::Head))?;

        let mut people = Vec::with_capacity(n);
        while let Some(row) = rows.next().map_err(err(Operation::Head))? {
            let name: String = row.get(0).map_err(err(Operation::Head))?;
            let age: i64 = row.get(1).map_err(err(Operation::Head))?;
            let city: String = row.get(2).map_err(err(Operation::Head))?;
            let salary: i64 = row.get(3).map_err(err(Operation::Head))?;
            let city: City = city
                .parse()
                .map_err(|e: String| BenchError::backend(NAME, Operation::Head, e))?;
            people.push(Person { name, age, city, salary });
        }
        Ok(people)
    }

    fn schema(&self, handle: &Handle) -> BenchResult<Vec<ColumnInfo>> {
        handle.check_owner(self.id, NAME, Operation::Schema)?;
        let mut declared = Vec::new();
        {
            let mut stmt = self
                .conn
                .prepare(
                    "SELECT column_name, data_type FROM information_schema.columns
                     WHERE table_name = ? ORDER BY ordinal_position",
                )
                .map_err(err(Operation::Schema))?;
            let mut rows = stmt
                .query(params![handle.table()])
                .map_err(err(Operation::Schema))?;
            while let Some(row) = rows.next().map_err(err(Operation::Schema))? {
                let name: String = row.get(0).map_err(err(Operation::Schema))?;
                let ty: String = row.get(1).map_err(err(Operation::Schema))?;
                declared.push((name, ty));
            }
        }

        let mut stmt = self
            .conn
            .prepare(&sql::non_null_query(handle.table()))
            .map_err(err(Operation::Schema))?;
        let mut rows = stmt.query([]).map_err(err(Operation::Schema))?;
        let row = rows
            .next()
            .map_err(err(Operation::Schema))?
            .ok_or_else(|| BenchError::backend(NAME, Operation::Schema, "no result"))?;

        let mut out = Vec::with_capacity(Column::ALL.len());
        for (i, col) in Column::ALL.iter().enumerate() {
            let dtype = declared
                .iter()
                .find(|(name, _)| name == col.as_str())
                .map(|(_, ty)| ty.clone())
                .ok_or_else(|| {
                    BenchError::backend(NAME, Operation::Schema, format!("missing column {}", col))
                })?;
            let non_null: i64 = row.get(i).map_err(err(Operation::Schema))?;
            out.push(ColumnInfo {
                column: *col,
                dtype,
                non_null: non_null as u64,
            });
        }
        Ok(out)
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
        let mut rows = stmt.query([]).map_err(err(Operation::GroupAggregate))?;

        let mut groups = Vec::new();
        while let Some(row) = rows.next().map_err(err(Operation::GroupAggregate))? {
            let key: String = row.get(0).map_err(err(Operation::GroupAggregate))?;
            let mut values = Vec::with_capacity(aggregations.len());
            for i in 1..=aggregations.len() {
                values.push(row.get::<_, f64>(i).map_err(err(Operation::GroupAggregate))?);
            }
            groups.push(Group { key, values });
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

        let mut stmt = self
            .conn
            .prepare(&sql::count_query(&target))
            .map_err(err(Operation::Filter))?;
        let mut rows = stmt.query([]).map_err(err(Operation::Filter))?;
        let count: i64 = match rows.next().map_err(err(Operation::Filter))? {
            Some(row) => row.get(0).map_err(err(Operation::Filter))?,
            None => 0,
        };
        Ok(Handle::new(self.id, target, count as u64))
    }

    fn release(&self, handle: Handle) -> BenchResult<()> {
        handle.check_owner(self.id, NAME, Operation::Release)?;
        self.conn
            .execute_batch(&sql::drop_query(handle.table()))
            .map_err(err(Operation::Release))
    }
}
