//! The resource engine: list / get / create / update / delete over one table.
//!
//! Every operation resolves the table's [`ColumnMap`] once, builds a single
//! statement from it and runs that statement. Nothing spans more than one
//! statement except the list fallback, which re-runs the query without its
//! sort when the default sort column has disappeared.
//!
//! # Example
//!
//! ```ignore
//! let binding = ResourceBinding::new("prompts", "prompts")?;
//! let engine = ResourceEngine::new(binding, EngineConfig::default(), Arc::default());
//!
//! let query = ListQuery::from_query_string("status=neq.archived&order=title.asc&limit=20")?;
//! let rows = engine.list(&client, &query).await?;
//! ```

use crate::client::GenericClient;
use crate::error::{ResourceError, ResourceResult};
use crate::filter::{Filter, ListQuery, OrderSpec, SortDirection};
use crate::ident::Ident;
use crate::predicate::{SearchSpec, WhereClause, resolve_column};
use crate::registry::ResourceBinding;
use crate::schema::{ColumnMap, SchemaCache, SchemaLoad};
use crate::statement::{self, OrderBy, Page, ROW_COLUMN, Row, Statement, Upsert};
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

/// Longest SQL text written to the statement log.
const MAX_LOGGED_SQL: usize = 200;

/// Engine-wide settings shared by every mounted resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Injected into `owner_column` when a created row omits it.
    pub default_owner_id: Option<Uuid>,
    pub owner_column: String,
    /// Never written by updates or upserts.
    pub created_at_column: String,
    /// Set to `now()` on every update when the table has it.
    pub updated_at_column: String,
    /// Upper bound (and default) for `limit` on list requests.
    pub max_limit: Option<i64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_owner_id: None,
            owner_column: "user_id".to_string(),
            created_at_column: "created_at".to_string(),
            updated_at_column: "updated_at".to_string(),
            max_limit: None,
        }
    }
}

impl EngineConfig {
    pub fn with_default_owner(mut self, owner: Uuid) -> Self {
        self.default_owner_id = Some(owner);
        self
    }

    pub fn with_max_limit(mut self, max_limit: i64) -> Self {
        self.max_limit = Some(max_limit);
        self
    }

    fn effective_limit(&self, requested: Option<i64>) -> Option<i64> {
        match (requested, self.max_limit) {
            (Some(n), Some(max)) => Some(n.min(max)),
            (None, Some(max)) => Some(max),
            (requested, None) => requested,
        }
    }
}

/// Body of a create request.
#[derive(Debug, Clone, PartialEq)]
pub enum CreateInput {
    One(Row),
    Many(Vec<Row>),
}

impl CreateInput {
    /// Accept a JSON object or an array of JSON objects.
    pub fn from_json(body: Value) -> ResourceResult<Self> {
        match body {
            Value::Object(row) => Ok(CreateInput::One(row)),
            Value::Array(items) => items
                .into_iter()
                .enumerate()
                .map(|(i, item)| match item {
                    Value::Object(row) => Ok(row),
                    _ => Err(ResourceError::validation(format!(
                        "element {i} of the request body is not an object"
                    ))),
                })
                .collect::<ResourceResult<Vec<_>>>()
                .map(CreateInput::Many),
            _ => Err(ResourceError::validation(
                "request body must be an object or an array of objects",
            )),
        }
    }

    fn into_rows(self) -> Vec<Row> {
        match self {
            CreateInput::One(row) => vec![row],
            CreateInput::Many(rows) => rows,
        }
    }
}

/// Result of [`ResourceEngine::create`].
#[derive(Debug, Clone, PartialEq)]
pub enum CreateOutcome {
    /// Single-row input. `None` when an upsert resolved to `DO NOTHING`.
    One(Option<Value>),
    Many(Vec<Value>),
}

/// Result of [`ResourceEngine::update_by_id`].
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOutcome {
    Updated(Value),
    /// Nothing left to write after dropping immutable columns.
    NoChanges,
    NotFound,
}

/// Result of [`ResourceEngine::update_where`].
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateManyOutcome {
    Updated(Vec<Value>),
    NoChanges,
}

/// Result of the delete operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// Number of rows removed (may be zero for filtered deletes).
    Deleted(u64),
    /// Id-scoped delete matched nothing.
    NotFound,
}

/// Generic CRUD over one [`ResourceBinding`].
#[derive(Debug)]
pub struct ResourceEngine {
    binding: ResourceBinding,
    config: EngineConfig,
    schema: Arc<SchemaCache>,
}

impl ResourceEngine {
    pub fn new(binding: ResourceBinding, config: EngineConfig, schema: Arc<SchemaCache>) -> Self {
        Self {
            binding,
            config,
            schema,
        }
    }

    pub fn binding(&self) -> &ResourceBinding {
        &self.binding
    }

    pub fn name(&self) -> &str {
        &self.binding.name
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Read the table's columns, surfacing catalog errors.
    pub async fn describe<C: GenericClient>(&self, conn: &C) -> ResourceResult<Arc<ColumnMap>> {
        let (columns, load) = self.schema.load(conn, &self.binding.table).await?;
        if load != SchemaLoad::Uncached {
            tracing::debug!(resource = %self.binding.name, ?load, "resolved columns");
        }
        Ok(columns)
    }

    /// List rows matching `query`.
    pub async fn list<C: GenericClient>(&self, conn: &C, query: &ListQuery) -> ResourceResult<Vec<Value>> {
        let columns = self.columns(conn).await;
        let search = self.search_spec(query.search.as_deref());
        let order = self.resolve_order(&columns, query.order.as_ref())?;
        let page = Page {
            limit: self.config.effective_limit(query.limit),
            offset: query.offset,
        };

        let build = |order: Option<&OrderBy>| -> ResourceResult<Statement> {
            let filter = WhereClause::build(&columns, &query.filters, search.as_ref(), 0)?;
            Ok(statement::select(&self.binding.table, filter, order, page))
        };

        let stmt = build(order.as_ref())?;
        match self.fetch(conn, "list", &stmt).await {
            Err(err) if order.is_some() && err.is_undefined_column(&self.config.created_at_column) => {
                tracing::warn!(
                    resource = %self.binding.name,
                    error = %err,
                    "sort column missing; retrying list without ORDER BY"
                );
                let stmt = build(None)?;
                self.fetch(conn, "list.retry", &stmt).await
            }
            other => other,
        }
    }

    /// Fetch one row by primary key.
    pub async fn get<C: GenericClient>(&self, conn: &C, id: &str) -> ResourceResult<Option<Value>> {
        let columns = self.columns(conn).await;
        let filter = WhereClause::build(&columns, &[self.key_filter(id)], None, 0)?;
        let stmt = statement::select(&self.binding.table, filter, None, Page::default());
        let rows = self.fetch(conn, "get", &stmt).await?;
        Ok(rows.into_iter().next())
    }

    /// Insert one or many rows, upserting on `on_conflict` when given.
    pub async fn create<C: GenericClient>(
        &self,
        conn: &C,
        input: CreateInput,
        on_conflict: Option<&[String]>,
    ) -> ResourceResult<CreateOutcome> {
        let single = matches!(input, CreateInput::One(_));
        let mut rows = input.into_rows();
        if rows.is_empty() {
            return Ok(CreateOutcome::Many(Vec::new()));
        }

        let columns = self.columns(conn).await;
        self.inject_owner(&columns, &mut rows);

        let upsert = match on_conflict {
            Some(conflict) => {
                let inserted = statement::batch_columns(&rows)?;
                Some(Upsert::plan(&columns, &inserted, conflict, &self.immutable_columns())?)
            }
            None => None,
        };

        let stmt = statement::insert(&self.binding.table, &columns, &rows, upsert.as_ref())?;
        let created = self.fetch(conn, "create", &stmt).await?;

        Ok(if single {
            CreateOutcome::One(created.into_iter().next())
        } else {
            CreateOutcome::Many(created)
        })
    }

    /// Apply a partial update to the row with primary key `id`.
    pub async fn update_by_id<C: GenericClient>(
        &self,
        conn: &C,
        id: &str,
        patch: Row,
    ) -> ResourceResult<UpdateOutcome> {
        let filters = [self.key_filter(id)];
        let Some(rows) = self.apply_update(conn, "update", &filters, patch).await? else {
            return Ok(UpdateOutcome::NoChanges);
        };
        Ok(match rows.into_iter().next() {
            Some(row) => UpdateOutcome::Updated(row),
            None => UpdateOutcome::NotFound,
        })
    }

    /// Apply a partial update to every row matching `filters`.
    ///
    /// At least one filter is required; the request is rejected before any
    /// database call otherwise.
    pub async fn update_where<C: GenericClient>(
        &self,
        conn: &C,
        filters: &[Filter],
        patch: Row,
    ) -> ResourceResult<UpdateManyOutcome> {
        require_filters(filters, "update")?;
        Ok(match self.apply_update(conn, "update_where", filters, patch).await? {
            Some(rows) => UpdateManyOutcome::Updated(rows),
            None => UpdateManyOutcome::NoChanges,
        })
    }

    /// Delete the row with primary key `id`.
    pub async fn delete_by_id<C: GenericClient>(&self, conn: &C, id: &str) -> ResourceResult<DeleteOutcome> {
        let deleted = self.apply_delete(conn, "delete", &[self.key_filter(id)]).await?;
        Ok(if deleted == 0 {
            DeleteOutcome::NotFound
        } else {
            DeleteOutcome::Deleted(deleted)
        })
    }

    /// Delete every row matching `filters`.
    ///
    /// At least one filter is required; the request is rejected before any
    /// database call otherwise.
    pub async fn delete_where<C: GenericClient>(
        &self,
        conn: &C,
        filters: &[Filter],
    ) -> ResourceResult<DeleteOutcome> {
        require_filters(filters, "delete")?;
        let deleted = self.apply_delete(conn, "delete_where", filters).await?;
        Ok(DeleteOutcome::Deleted(deleted))
    }

    /// Shared body of the update operations; `None` means the patch was empty.
    async fn apply_update<C: GenericClient>(
        &self,
        conn: &C,
        op: &str,
        filters: &[Filter],
        mut patch: Row,
    ) -> ResourceResult<Option<Vec<Value>>> {
        for column in self.immutable_columns() {
            patch.remove(column);
        }
        if patch.is_empty() {
            return Ok(None);
        }

        let columns = self.columns(conn).await;
        let touch = if columns.contains(&self.config.updated_at_column) {
            patch.remove(&self.config.updated_at_column);
            Some(Ident::column(&self.config.updated_at_column)?)
        } else {
            None
        };

        let stmt = statement::update(&self.binding.table, &columns, &patch, touch.as_ref(), filters)?;
        self.fetch(conn, op, &stmt).await.map(Some)
    }

    async fn apply_delete<C: GenericClient>(&self, conn: &C, op: &str, filters: &[Filter]) -> ResourceResult<u64> {
        let columns = self.columns(conn).await;
        let filter = WhereClause::build(&columns, filters, None, 0)?;
        let stmt = statement::delete(&self.binding.table, filter);
        self.execute(conn, op, &stmt).await
    }

    /// Column map for building a statement; an unreadable catalog yields an empty map.
    async fn columns<C: GenericClient>(&self, conn: &C) -> Arc<ColumnMap> {
        match self.describe(conn).await {
            Ok(columns) => columns,
            Err(err) => {
                tracing::warn!(
                    resource = %self.binding.name,
                    error = %err,
                    "schema lookup failed; continuing without column types"
                );
                Arc::default()
            }
        }
    }

    fn resolve_order(&self, columns: &ColumnMap, explicit: Option<&OrderSpec>) -> ResourceResult<Option<OrderBy>> {
        if let Some(order) = explicit {
            let (column, _) = resolve_column(columns, &order.column)?;
            return Ok(Some(OrderBy {
                column,
                direction: order.direction,
            }));
        }
        if columns.contains(&self.config.created_at_column) {
            return Ok(Some(OrderBy {
                column: Ident::column(&self.config.created_at_column)?,
                direction: SortDirection::Desc,
            }));
        }
        Ok(None)
    }

    fn search_spec(&self, needle: Option<&str>) -> Option<SearchSpec> {
        let needle = needle?;
        if self.binding.search_columns.is_empty() {
            tracing::debug!(resource = %self.binding.name, "search ignored: no search columns configured");
            return None;
        }
        Some(SearchSpec::new(self.binding.search_columns.clone(), needle))
    }

    fn inject_owner(&self, columns: &ColumnMap, rows: &mut [Row]) {
        let Some(owner) = self.config.default_owner_id else {
            return;
        };
        if !columns.contains(&self.config.owner_column) {
            return;
        }
        for row in rows {
            row.entry(self.config.owner_column.as_str())
                .or_insert_with(|| Value::String(owner.to_string()));
        }
    }

    fn immutable_columns(&self) -> [&str; 2] {
        [
            self.binding.primary_key.as_str(),
            self.config.created_at_column.as_str(),
        ]
    }

    fn key_filter(&self, id: &str) -> Filter {
        Filter::eq(self.binding.primary_key.clone(), id)
    }

    async fn fetch<C: GenericClient>(&self, conn: &C, op: &str, stmt: &Statement) -> ResourceResult<Vec<Value>> {
        let tag = self.log_statement(op, stmt);
        let rows = conn
            .query(&stmt.sql, &stmt.params.as_refs())
            .await
            .inspect_err(|err| self.on_error(&tag, err))?;

        rows.iter()
            .map(|row| {
                row.try_get::<_, Value>(ROW_COLUMN)
                    .map_err(|e| ResourceError::decode(ROW_COLUMN, e.to_string()))
            })
            .collect()
    }

    async fn execute<C: GenericClient>(&self, conn: &C, op: &str, stmt: &Statement) -> ResourceResult<u64> {
        let tag = self.log_statement(op, stmt);
        conn.execute(&stmt.sql, &stmt.params.as_refs())
            .await
            .inspect_err(|err| self.on_error(&tag, err))
    }

    fn on_error(&self, tag: &str, err: &ResourceError) {
        tracing::debug!(target: "pgresource.sql", tag = %tag, error = %err, "statement failed");
        if err.is_schema_drift() {
            self.schema.invalidate(&self.binding.table);
        }
    }

    fn log_statement(&self, op: &str, stmt: &Statement) -> String {
        let tag = format!("{}.{op}", self.binding.name);
        tracing::debug!(
            target: "pgresource.sql",
            tag = %tag,
            param_count = stmt.params.len(),
            sql = %truncate_sql(&stmt.sql, MAX_LOGGED_SQL),
        );
        tag
    }
}

/// Reject a filtered `op` that carries no filters.
///
/// Needs no connection, so callers can run it before acquiring one.
pub fn require_filters(filters: &[Filter], op: &str) -> ResourceResult<()> {
    if filters.is_empty() {
        return Err(ResourceError::validation(format!(
            "refusing to {op} without filters: at least one filter is required"
        )));
    }
    Ok(())
}

fn truncate_sql(sql: &str, max_bytes: usize) -> String {
    if sql.len() <= max_bytes {
        return sql.to_string();
    }
    let mut end = max_bytes;
    while end > 0 && !sql.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &sql[..end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio_postgres::Row as PgRow;
    use tokio_postgres::types::ToSql;

    /// A client that fails the test if the engine reaches the database.
    struct Unreachable;

    impl GenericClient for Unreachable {
        async fn query(&self, sql: &str, _: &[&(dyn ToSql + Sync)]) -> ResourceResult<Vec<PgRow>> {
            panic!("unexpected query: {sql}");
        }

        async fn execute(&self, sql: &str, _: &[&(dyn ToSql + Sync)]) -> ResourceResult<u64> {
            panic!("unexpected execute: {sql}");
        }
    }

    /// Records every statement and answers with no rows.
    #[derive(Default)]
    struct Recording(std::sync::Mutex<Vec<String>>);

    impl Recording {
        fn statements(&self) -> Vec<String> {
            self.0.lock().unwrap().clone()
        }
    }

    impl GenericClient for Recording {
        async fn query(&self, sql: &str, _: &[&(dyn ToSql + Sync)]) -> ResourceResult<Vec<PgRow>> {
            self.0.lock().unwrap().push(sql.to_string());
            Ok(Vec::new())
        }

        async fn execute(&self, sql: &str, _: &[&(dyn ToSql + Sync)]) -> ResourceResult<u64> {
            self.0.lock().unwrap().push(sql.to_string());
            Ok(0)
        }
    }

    fn engine() -> ResourceEngine {
        let binding = ResourceBinding::new("items", "items").unwrap();
        ResourceEngine::new(binding, EngineConfig::default(), Arc::default())
    }

    fn row(value: Value) -> Row {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[tokio::test]
    async fn filtered_writes_require_filters() {
        let engine = engine();
        let err = engine
            .update_where(&Unreachable, &[], row(json!({"name": "c"})))
            .await
            .unwrap_err();
        assert!(err.is_validation());

        let err = engine.delete_where(&Unreachable, &[]).await.unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn empty_batch_skips_the_database() {
        let outcome = engine()
            .create(&Unreachable, CreateInput::Many(Vec::new()), None)
            .await
            .unwrap();
        assert_eq!(outcome, CreateOutcome::Many(Vec::new()));
    }

    #[tokio::test]
    async fn immutable_only_patch_is_a_no_op() {
        let engine = engine();
        let patch = row(json!({"id": "x", "created_at": "2024-01-01"}));
        let outcome = engine.update_by_id(&Unreachable, "x", patch).await.unwrap();
        assert_eq!(outcome, UpdateOutcome::NoChanges);

        let filters = [Filter::eq("name", "a")];
        let outcome = engine.update_where(&Unreachable, &filters, Row::new()).await.unwrap();
        assert_eq!(outcome, UpdateManyOutcome::NoChanges);
    }

    #[tokio::test]
    async fn list_runs_catalog_then_select_on_the_client() {
        let client = Recording::default();
        let rows = engine().list(&client, &ListQuery::default()).await.unwrap();
        assert!(rows.is_empty());

        let statements = client.statements();
        assert_eq!(statements.len(), 2);
        assert!(statements[0].contains("pg_catalog.pg_attribute"));
        assert_eq!(
            statements[1],
            "SELECT to_jsonb(__pgresource_rec) AS __pgresource_row FROM items AS __pgresource_rec"
        );
    }

    #[test]
    fn create_input_shapes() {
        assert!(matches!(
            CreateInput::from_json(json!({"a": 1})).unwrap(),
            CreateInput::One(_)
        ));
        assert!(matches!(
            CreateInput::from_json(json!([{"a": 1}, {"a": 2}])).unwrap(),
            CreateInput::Many(rows) if rows.len() == 2
        ));
        assert!(CreateInput::from_json(json!([1])).unwrap_err().is_validation());
        assert!(CreateInput::from_json(json!("x")).unwrap_err().is_validation());
    }

    #[test]
    fn owner_is_injected_only_when_missing() {
        let owner = Uuid::nil();
        let binding = ResourceBinding::new("items", "items").unwrap();
        let engine = ResourceEngine::new(
            binding,
            EngineConfig::default().with_default_owner(owner),
            Arc::default(),
        );
        let columns: ColumnMap = [("user_id", crate::schema::ColumnType::named("uuid"))]
            .into_iter()
            .collect();

        let mut rows = vec![row(json!({"name": "a"})), row(json!({"user_id": "someone"}))];
        engine.inject_owner(&columns, &mut rows);
        assert_eq!(rows[0]["user_id"], json!(owner.to_string()));
        assert_eq!(rows[1]["user_id"], json!("someone"));

        let mut rows = vec![row(json!({"name": "a"}))];
        engine.inject_owner(&ColumnMap::new(), &mut rows);
        assert!(!rows[0].contains_key("user_id"));
    }

    #[test]
    fn default_sort_uses_created_at() {
        let engine = engine();
        let with_ts: ColumnMap = [
            ("name", crate::schema::ColumnType::named("text")),
            ("created_at", crate::schema::ColumnType::named("timestamp with time zone")),
        ]
        .into_iter()
        .collect();

        let order = engine.resolve_order(&with_ts, None).unwrap().unwrap();
        assert_eq!(order.column.to_sql(), r#""created_at""#);
        assert_eq!(order.direction, SortDirection::Desc);

        let explicit = OrderSpec::new("name", SortDirection::Asc);
        let order = engine.resolve_order(&with_ts, Some(&explicit)).unwrap().unwrap();
        assert_eq!(order.column.to_sql(), r#""name""#);

        assert!(engine.resolve_order(&ColumnMap::new(), None).unwrap().is_none());
        assert!(engine
            .resolve_order(&ColumnMap::new(), Some(&explicit))
            .unwrap_err()
            .is_validation());
    }

    #[test]
    fn limit_is_capped() {
        let config = EngineConfig::default().with_max_limit(100);
        assert_eq!(config.effective_limit(Some(5)), Some(5));
        assert_eq!(config.effective_limit(Some(500)), Some(100));
        assert_eq!(config.effective_limit(None), Some(100));
        assert_eq!(EngineConfig::default().effective_limit(None), None);
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_sql("SELECT 1", 200), "SELECT 1");
        assert_eq!(truncate_sql("héllo", 2), "h...");
    }
}
