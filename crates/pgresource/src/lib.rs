//! # pgresource
//!
//! Generic list / get / create / update / delete over PostgreSQL tables.
//!
//! ## Features
//!
//! - **Schema-driven**: column names and types come from the live catalog, not from Rust types
//! - **Allow-listed identifiers**: only registered tables and existing columns reach SQL text
//! - **Bound values**: every value travels as a parameter, cast to the column's declared type
//! - **Safe defaults**: filtered UPDATE and DELETE require at least one filter
//! - **Transaction-friendly**: pass a transaction anywhere a `GenericClient` is expected
//!
//! ## Usage
//!
//! ```ignore
//! use pgresource::{EngineConfig, ListQuery, ResourceBinding, ResourceRegistry, SchemaCache};
//! use std::{sync::Arc, time::Duration};
//!
//! let schema = Arc::new(SchemaCache::new(Duration::from_secs(30)));
//! let mut registry = ResourceRegistry::new(EngineConfig::default(), schema);
//! let prompts = registry.mount(
//!     ResourceBinding::new("prompts", "prompts")?.with_search_columns(["title", "body"]),
//! )?;
//!
//! let query = ListQuery::from_query_string("search=cat&order=title.asc&limit=10")?;
//! let rows = prompts.list(&client, &query).await?;
//! ```

pub mod client;
pub mod coerce;
pub mod engine;
pub mod error;
pub mod filter;
pub mod ident;
pub mod param;
pub mod predicate;
pub mod registry;
pub mod schema;
pub mod statement;

pub use client::GenericClient;
pub use engine::{
    CreateInput, CreateOutcome, DeleteOutcome, EngineConfig, ResourceEngine, UpdateManyOutcome,
    UpdateOutcome,
};
pub use error::{ResourceError, ResourceResult};
pub use filter::{Filter, FilterOp, FilterValue, ListQuery, OrderSpec, SortDirection};
pub use ident::Ident;
pub use registry::{ResourceBinding, ResourceRegistry};
pub use schema::{ColumnMap, ColumnType, SchemaCache, SchemaLoad};
pub use statement::Row;

#[cfg(feature = "pool")]
pub mod pool;

#[cfg(feature = "pool")]
pub use pool::{PoolSettings, create_pool, create_pool_with_settings};
