//! WHERE clause construction from parsed filters.

use crate::error::{ResourceError, ResourceResult};
use crate::filter::{Filter, FilterOp, FilterValue};
use crate::ident::Ident;
use crate::param::ParamList;
use crate::schema::{ColumnMap, ColumnType};

/// Free-text search over a set of candidate columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchSpec {
    pub columns: Vec<String>,
    pub needle: String,
}

impl SearchSpec {
    pub fn new(columns: Vec<String>, needle: impl Into<String>) -> Self {
        Self {
            columns,
            needle: needle.into(),
        }
    }
}

/// A built predicate: SQL text (without the `WHERE` keyword) and its parameters.
#[derive(Debug, Clone, Default)]
pub struct WhereClause {
    pub sql: String,
    pub params: ParamList,
}

impl WhereClause {
    /// Build an AND-joined predicate.
    ///
    /// Filters are emitted in the order given. Placeholders start at
    /// `$start_index + 1`, so the clause can follow a `SET` list that already
    /// used `start_index` parameters.
    ///
    /// Every filter column must exist in `columns`; search candidates that
    /// don't are skipped.
    pub fn build(
        columns: &ColumnMap,
        filters: &[Filter],
        search: Option<&SearchSpec>,
        start_index: usize,
    ) -> ResourceResult<Self> {
        let mut params = ParamList::starting_after(start_index);
        let mut fragments = Vec::with_capacity(filters.len() + 1);

        for filter in filters {
            let (ident, ty) = resolve_column(columns, &filter.column)?;
            fragments.push(filter_fragment(&ident, ty, filter, &mut params)?);
        }

        if let Some(search) = search {
            if let Some(fragment) = search_fragment(columns, search, &mut params)? {
                fragments.push(fragment);
            }
        }

        Ok(Self {
            sql: fragments.join(" AND "),
            params,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.sql.is_empty()
    }

    /// ` WHERE <sql>` or nothing.
    pub fn keyword_sql(&self) -> String {
        if self.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.sql)
        }
    }
}

/// Look up `name` in the live column map and return it as a quoted identifier.
pub(crate) fn resolve_column<'a>(
    columns: &'a ColumnMap,
    name: &str,
) -> ResourceResult<(Ident, &'a ColumnType)> {
    let ty = columns
        .get(name)
        .ok_or_else(|| ResourceError::validation(format!("unknown column '{name}'")))?;
    Ok((Ident::column(name)?, ty))
}

fn filter_fragment(
    ident: &Ident,
    ty: &ColumnType,
    filter: &Filter,
    params: &mut ParamList,
) -> ResourceResult<String> {
    let items = match (&filter.value, filter.op) {
        (FilterValue::List(items), _) => items.clone(),
        (FilterValue::Single(item), FilterOp::In) => vec![item.clone()],
        (FilterValue::Single(item), op) => {
            let idx = params.push(item.clone());
            return Ok(format!("{ident} {} ${idx}::text::{}", op.sql(), ty.declared));
        }
    };
    // A text[] literal can't carry array elements, so `in.` has no meaning here.
    if ty.is_array() {
        return Err(ResourceError::validation(format!(
            "'in' filter is not supported on array column '{}' ({})",
            filter.column, ty.declared
        )));
    }
    let idx = params.push(items);
    Ok(format!("{ident} = ANY(${idx}::text[]::{}[])", ty.declared))
}

fn search_fragment(
    columns: &ColumnMap,
    search: &SearchSpec,
    params: &mut ParamList,
) -> ResourceResult<Option<String>> {
    let pattern = format!("%{}%", search.needle);
    let mut alternatives = Vec::new();

    for name in &search.columns {
        if !columns.contains(name) {
            tracing::debug!(column = %name, "search column not in table; skipping");
            continue;
        }
        let ident = Ident::column(name)?;
        let idx = params.push(pattern.clone());
        alternatives.push(format!("{ident}::text ILIKE ${idx}"));
    }

    Ok(match alternatives.len() {
        0 => None,
        1 => alternatives.pop(),
        _ => Some(format!("({})", alternatives.join(" OR "))),
    })
}
