//! Live schema introspection.
//!
//! [`inspect_columns`] reads a table's columns from `pg_catalog`;
//! [`SchemaCache`] optionally memoizes the result per table.

mod cache;
mod inspect;

pub use cache::{SchemaCache, SchemaLoad};
pub use inspect::{ColumnMap, ColumnType, inspect_columns, table_fingerprint};
