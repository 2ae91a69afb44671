//! Backend adapter modules.

pub mod duckdb_adapter;
pub mod sql;
pub mod sqlite_adapter;
