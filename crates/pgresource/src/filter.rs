//! Query-string filter grammar.
//!
//! Each non-reserved query parameter becomes one [`Filter`]. The operator is
//! read from a value prefix, checked in this order (first match wins):
//!
//! | prefix        | operator |
//! |---------------|----------|
//! | `neq.`        | `<>`     |
//! | `gte.`        | `>=`     |
//! | `gt.`         | `>`      |
//! | `lte.`        | `<=`     |
//! | `lt.`         | `<`      |
//! | `in.(a,b,c)`  | `= ANY`  |
//! | *(none)*      | `=`      |
//!
//! ```ignore
//! let pairs = parse_query_string("status=neq.archived&id=in.(1,2)&limit=10");
//! let filters = parse_filters(pairs);
//! ```

use crate::error::{ResourceError, ResourceResult};

/// Query parameters that never become filters.
pub const RESERVED_PARAMS: &[&str] = &["limit", "offset", "order", "search", "on_conflict"];

/// Comparison operator of a [`Filter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
}

impl FilterOp {
    /// SQL operator text for scalar comparisons.
    pub fn sql(self) -> &'static str {
        match self {
            FilterOp::Eq | FilterOp::In => "=",
            FilterOp::Neq => "<>",
            FilterOp::Gt => ">",
            FilterOp::Gte => ">=",
            FilterOp::Lt => "<",
            FilterOp::Lte => "<=",
        }
    }
}

const PREFIXES: &[(&str, FilterOp)] = &[
    ("neq.", FilterOp::Neq),
    ("gte.", FilterOp::Gte),
    ("gt.", FilterOp::Gt),
    ("lte.", FilterOp::Lte),
    ("lt.", FilterOp::Lt),
    ("in.", FilterOp::In),
];

/// Right-hand side of a [`Filter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterValue {
    Single(String),
    List(Vec<String>),
}

/// One parsed `(column, operator, value)` triple.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub column: String,
    pub op: FilterOp,
    pub value: FilterValue,
}

impl Filter {
    /// Parse a single `column=value` entry.
    pub fn parse(column: impl Into<String>, raw: &str) -> Self {
        let column = column.into();
        for &(prefix, op) in PREFIXES {
            let Some(rest) = raw.strip_prefix(prefix) else {
                continue;
            };
            let value = if op == FilterOp::In {
                FilterValue::List(split_list(rest))
            } else {
                FilterValue::Single(rest.to_string())
            };
            return Self { column, op, value };
        }
        Self {
            column,
            op: FilterOp::Eq,
            value: FilterValue::Single(raw.to_string()),
        }
    }

    pub fn eq(column: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            op: FilterOp::Eq,
            value: FilterValue::Single(value.into()),
        }
    }
}

fn split_list(rest: &str) -> Vec<String> {
    let inner = rest
        .strip_prefix('(')
        .and_then(|s| s.strip_suffix(')'))
        .unwrap_or(rest);
    inner.split(',').map(str::to_string).collect()
}

/// Turn query pairs into filters, preserving their order.
///
/// Reserved names are skipped, as are pairs whose value is `None`
/// (there is no way to express `IS NULL` through this grammar).
pub fn parse_filters<K, V>(pairs: impl IntoIterator<Item = (K, Option<V>)>) -> Vec<Filter>
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    pairs
        .into_iter()
        .filter(|(key, _)| !RESERVED_PARAMS.contains(&key.as_ref()))
        .filter_map(|(key, value)| Some(Filter::parse(key.as_ref(), value?.as_ref())))
        .collect()
}

/// Split a raw URL query string into decoded pairs.
///
/// A segment without `=` yields `None` for its value.
pub fn parse_query_string(raw: &str) -> Vec<(String, Option<String>)> {
    raw.split('&')
        .filter(|segment| !segment.is_empty())
        .map(|segment| {
            let has_value = segment.contains('=');
            let (key, value) = url::form_urlencoded::parse(segment.as_bytes())
                .next()
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .unwrap_or_default();
            (key, has_value.then_some(value))
        })
        .filter(|(key, _)| !key.is_empty())
        .collect()
}

/// Sort direction of an [`OrderSpec`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn sql(self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

/// Explicit sort from `order=<column>.<asc|desc>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderSpec {
    pub column: String,
    pub direction: SortDirection,
}

impl OrderSpec {
    pub fn new(column: impl Into<String>, direction: SortDirection) -> Self {
        Self {
            column: column.into(),
            direction,
        }
    }

    /// Parse `column`, `column.asc` or `column.desc`.
    pub fn parse(raw: &str) -> ResourceResult<Self> {
        let (column, direction) = match raw.rsplit_once('.') {
            Some((column, dir)) if dir.eq_ignore_ascii_case("asc") => (column, SortDirection::Asc),
            Some((column, dir)) if dir.eq_ignore_ascii_case("desc") => {
                (column, SortDirection::Desc)
            }
            Some((_, dir)) => {
                return Err(ResourceError::validation(format!(
                    "invalid sort direction '{dir}', expected asc or desc"
                )));
            }
            None => (raw, SortDirection::Asc),
        };
        if column.is_empty() {
            return Err(ResourceError::validation("order requires a column name"));
        }
        Ok(Self::new(column, direction))
    }
}

/// Everything a list request can carry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListQuery {
    pub filters: Vec<Filter>,
    pub search: Option<String>,
    pub order: Option<OrderSpec>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl ListQuery {
    /// Build from decoded query pairs (see [`parse_query_string`]).
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, Option<V>)>) -> ResourceResult<Self>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let pairs: Vec<(K, Option<V>)> = pairs.into_iter().collect();
        let mut query = ListQuery::default();

        for (key, value) in &pairs {
            let Some(value) = value.as_ref().map(|v| v.as_ref()) else {
                continue;
            };
            match key.as_ref() {
                "limit" => query.limit = Some(parse_count("limit", value)?),
                "offset" => query.offset = Some(parse_count("offset", value)?),
                "order" if !value.is_empty() => query.order = Some(OrderSpec::parse(value)?),
                "search" if !value.is_empty() => query.search = Some(value.to_string()),
                _ => {}
            }
        }

        query.filters = parse_filters(pairs);
        Ok(query)
    }

    /// Parse a raw URL query string.
    pub fn from_query_string(raw: &str) -> ResourceResult<Self> {
        Self::from_pairs(parse_query_string(raw))
    }
}

fn parse_count(name: &str, value: &str) -> ResourceResult<i64> {
    match value.trim().parse::<i64>() {
        Ok(n) if n >= 0 => Ok(n),
        _ => Err(ResourceError::validation(format!(
            "{name} must be a non-negative integer, got '{value}'"
        ))),
    }
}
