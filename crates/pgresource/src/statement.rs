//! SQL text for the engine's statements.
//!
//! Builders here are pure: they validate identifiers against a [`ColumnMap`],
//! render placeholders and collect parameters, but never touch a connection.
//! Row-returning statements wrap the table row in `to_jsonb`, so results
//! decode into `serde_json::Value` whatever the column types are.

use crate::coerce::{BoundValue, coerce};
use crate::error::{ResourceError, ResourceResult};
use crate::filter::{Filter, SortDirection};
use crate::ident::Ident;
use crate::param::ParamList;
use crate::predicate::{WhereClause, resolve_column};
use crate::schema::ColumnMap;
use serde_json::Value;

/// One insertable/updatable record: column name → value.
pub type Row = serde_json::Map<String, Value>;

/// Alias of the row variable the JSON projection reads from.
const ROW_ALIAS: &str = "__pgresource_rec";

/// Name of the JSON column in every row-returning statement.
///
/// Prefixed so that `ORDER BY` on a table column never resolves to it.
pub const ROW_COLUMN: &str = "__pgresource_row";

/// Rendered SQL plus its parameters.
#[derive(Debug, Clone, Default)]
pub struct Statement {
    pub sql: String,
    pub params: ParamList,
}

/// A validated `ORDER BY` target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub column: Ident,
    pub direction: SortDirection,
}

/// Optional `LIMIT` / `OFFSET`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Page {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// `SELECT` rows as JSON.
pub fn select(table: &Ident, filter: WhereClause, order: Option<&OrderBy>, page: Page) -> Statement {
    let mut sql = format!("SELECT to_jsonb({ROW_ALIAS}) AS {ROW_COLUMN} FROM {table} AS {ROW_ALIAS}");
    sql.push_str(&filter.keyword_sql());
    let mut params = filter.params;

    if let Some(order) = order {
        sql.push_str(&format!(
            " ORDER BY {} {}",
            order.column,
            order.direction.sql()
        ));
    }
    if let Some(limit) = page.limit {
        let idx = params.push(limit);
        sql.push_str(&format!(" LIMIT ${idx}"));
    }
    if let Some(offset) = page.offset {
        let idx = params.push(offset);
        sql.push_str(&format!(" OFFSET ${idx}"));
    }

    Statement { sql, params }
}

/// `ON CONFLICT` handling for an insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upsert {
    /// Conflict target columns.
    pub target: Vec<Ident>,
    /// Columns overwritten from `EXCLUDED`; empty means `DO NOTHING`.
    pub update: Vec<Ident>,
}

impl Upsert {
    /// Split the inserted columns into the conflict key and the columns to overwrite.
    ///
    /// Columns in the key or in `immutable` are never overwritten.
    pub fn plan(
        columns: &ColumnMap,
        inserted: &[String],
        conflict: &[String],
        immutable: &[&str],
    ) -> ResourceResult<Self> {
        if conflict.is_empty() {
            return Err(ResourceError::validation(
                "on_conflict requires at least one column",
            ));
        }
        let target = conflict
            .iter()
            .map(|name| resolve_column(columns, name).map(|(ident, _)| ident))
            .collect::<ResourceResult<Vec<_>>>()?;

        let update = inserted
            .iter()
            .filter(|name| !conflict.contains(name) && !immutable.contains(&name.as_str()))
            .map(|name| Ident::column(name))
            .collect::<ResourceResult<Vec<_>>>()?;

        Ok(Self { target, update })
    }

    fn write_sql(&self, sql: &mut String) {
        let target: Vec<String> = self.target.iter().map(Ident::to_sql).collect();
        sql.push_str(&format!(" ON CONFLICT ({})", target.join(", ")));

        if self.update.is_empty() {
            sql.push_str(" DO NOTHING");
            return;
        }
        let sets: Vec<String> = self
            .update
            .iter()
            .map(|col| format!("{col} = EXCLUDED.{col}"))
            .collect();
        sql.push_str(" DO UPDATE SET ");
        sql.push_str(&sets.join(", "));
    }
}

/// The column set shared by a batch: the first row's keys.
///
/// Any row with a different key set is rejected.
pub fn batch_columns(rows: &[Row]) -> ResourceResult<Vec<String>> {
    let Some(first) = rows.first() else {
        return Ok(Vec::new());
    };
    let names: Vec<String> = first.keys().cloned().collect();

    for (i, row) in rows.iter().enumerate().skip(1) {
        let same = row.len() == names.len() && names.iter().all(|name| row.contains_key(name));
        if !same {
            return Err(ResourceError::validation(format!(
                "row {i} has a different set of columns than the first row"
            )));
        }
    }
    Ok(names)
}

/// Multi-row `INSERT ... RETURNING *`, optionally with `ON CONFLICT`.
pub fn insert(
    table: &Ident,
    columns: &ColumnMap,
    rows: &[Row],
    upsert: Option<&Upsert>,
) -> ResourceResult<Statement> {
    let names = batch_columns(rows)?;
    let mut params = ParamList::new();
    let mut sql = format!("WITH {ROW_ALIAS} AS (INSERT INTO {table}");

    if names.is_empty() {
        if rows.len() > 1 {
            return Err(ResourceError::validation(
                "cannot insert several rows without any columns",
            ));
        }
        sql.push_str(" DEFAULT VALUES");
    } else {
        let resolved = names
            .iter()
            .map(|name| resolve_column(columns, name))
            .collect::<ResourceResult<Vec<_>>>()?;

        let idents: Vec<String> = resolved.iter().map(|(ident, _)| ident.to_sql()).collect();
        sql.push_str(&format!(" ({}) VALUES ", idents.join(", ")));

        let mut tuples = Vec::with_capacity(rows.len());
        for row in rows {
            let mut values = Vec::with_capacity(names.len());
            for (name, (_, ty)) in names.iter().zip(&resolved) {
                let raw = row.get(name).cloned().unwrap_or(Value::Null);
                let value = coerce(columns, name, raw);
                values.push(BoundValue::bind(ty, &value).push(&mut params, ty));
            }
            tuples.push(format!("({})", values.join(", ")));
        }
        sql.push_str(&tuples.join(", "));
    }

    if let Some(upsert) = upsert {
        upsert.write_sql(&mut sql);
    }
    sql.push_str(&returning_projection());

    Ok(Statement { sql, params })
}

/// `UPDATE ... SET ... WHERE ... RETURNING *`.
///
/// `touch` names a column set to `now()` on every update. SET parameters are
/// numbered first; the WHERE clause continues from where they stop.
pub fn update(
    table: &Ident,
    columns: &ColumnMap,
    patch: &Row,
    touch: Option<&Ident>,
    filters: &[Filter],
) -> ResourceResult<Statement> {
    let mut params = ParamList::new();
    let mut sets = Vec::with_capacity(patch.len() + 1);

    for (name, raw) in patch {
        let (ident, ty) = resolve_column(columns, name)?;
        let value = coerce(columns, name, raw.clone());
        let placeholder = BoundValue::bind(ty, &value).push(&mut params, ty);
        sets.push(format!("{ident} = {placeholder}"));
    }
    if let Some(touch) = touch {
        sets.push(format!("{touch} = now()"));
    }
    if sets.is_empty() {
        return Err(ResourceError::validation("update requires at least one column"));
    }

    let filter = WhereClause::build(columns, filters, None, params.len())?;
    let mut sql = format!("WITH {ROW_ALIAS} AS (UPDATE {table} SET {}", sets.join(", "));
    sql.push_str(&filter.keyword_sql());
    params.append(filter.params);
    sql.push_str(&returning_projection());

    Ok(Statement { sql, params })
}

/// `DELETE FROM ... WHERE ...`; executed for its row count.
pub fn delete(table: &Ident, filter: WhereClause) -> Statement {
    Statement {
        sql: format!("DELETE FROM {table}{}", filter.keyword_sql()),
        params: filter.params,
    }
}

fn returning_projection() -> String {
    format!(" RETURNING *) SELECT to_jsonb({ROW_ALIAS}) AS {ROW_COLUMN} FROM {ROW_ALIAS}")
}
