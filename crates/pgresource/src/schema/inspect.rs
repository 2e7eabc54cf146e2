use crate::client::GenericClient;
use crate::error::{ResourceError, ResourceResult};
use crate::ident::Ident;
use serde::Serialize;
use std::collections::BTreeMap;
use tokio_postgres::Row;

/// Declared type of one live column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnType {
    /// `pg_catalog.format_type` output, e.g. `text`, `timestamp with time zone`, `jsonb`.
    pub declared: String,
    pub ordinal: i16,
    pub not_null: bool,
    pub has_default: bool,
}

impl ColumnType {
    /// A column type with only the declared name set.
    pub fn named(declared: impl Into<String>) -> Self {
        Self {
            declared: declared.into(),
            ordinal: 0,
            not_null: false,
            has_default: false,
        }
    }

    /// The coarse JSON tag: object/array values bound to these columns are sent as JSON text.
    pub fn is_json(&self) -> bool {
        matches!(self.declared.as_str(), "jsonb" | "json")
    }

    pub fn is_array(&self) -> bool {
        self.declared.ends_with("[]")
    }
}

/// Column name → declared type for one table, as read from the catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ColumnMap {
    columns: BTreeMap<String, ColumnType>,
}

impl ColumnMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, ty: ColumnType) {
        self.columns.insert(name.into(), ty);
    }

    pub fn get(&self, name: &str) -> Option<&ColumnType> {
        self.columns.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    pub fn is_json(&self, name: &str) -> bool {
        self.get(name).is_some_and(ColumnType::is_json)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Columns in table definition order.
    pub fn in_table_order(&self) -> Vec<(&str, &ColumnType)> {
        let mut cols: Vec<_> = self
            .columns
            .iter()
            .map(|(name, ty)| (name.as_str(), ty))
            .collect();
        cols.sort_by_key(|(_, ty)| ty.ordinal);
        cols
    }
}

impl<S: Into<String>> FromIterator<(S, ColumnType)> for ColumnMap {
    fn from_iter<I: IntoIterator<Item = (S, ColumnType)>>(iter: I) -> Self {
        let mut map = ColumnMap::new();
        for (name, ty) in iter {
            map.insert(name, ty);
        }
        map
    }
}

const COLUMNS_SQL: &str = r#"
SELECT
  a.attname AS column_name,
  a.attnum AS ordinal,
  pg_catalog.format_type(a.atttypid, a.atttypmod) AS data_type,
  a.attnotnull AS not_null,
  a.atthasdef AS has_default
FROM pg_catalog.pg_attribute a
WHERE a.attrelid = to_regclass($1::text)
  AND a.attnum > 0
  AND NOT a.attisdropped
ORDER BY a.attnum
"#;

const FINGERPRINT_SQL: &str = r#"
SELECT
  md5(
    COALESCE(
      string_agg(
        concat_ws(
          '|',
          a.attnum::text,
          a.attname,
          pg_catalog.format_type(a.atttypid, a.atttypmod),
          a.attnotnull::text,
          a.atthasdef::text
        ),
        E'\n' ORDER BY a.attnum
      ),
      ''
    )
  ) AS fingerprint
FROM pg_catalog.pg_attribute a
WHERE a.attrelid = to_regclass($1::text)
  AND a.attnum > 0
  AND NOT a.attisdropped
"#;

/// Read the live column set of `table`.
///
/// A table that does not exist yields an empty map, not an error.
pub async fn inspect_columns<C: GenericClient>(
    conn: &C,
    table: &Ident,
) -> ResourceResult<ColumnMap> {
    let table_name = table.to_sql();
    let rows = conn
        .query(COLUMNS_SQL, &[&table_name])
        .await?;

    rows.iter()
        .map(column_from_row)
        .collect::<ResourceResult<ColumnMap>>()
}

/// A digest of the table's column definitions; changes whenever a column is
/// added, dropped, renamed or retyped.
pub async fn table_fingerprint<C: GenericClient>(conn: &C, table: &Ident) -> ResourceResult<String> {
    let table_name = table.to_sql();
    let rows = conn
        .query(FINGERPRINT_SQL, &[&table_name])
        .await?;
    let row = rows
        .first()
        .ok_or_else(|| ResourceError::Other("fingerprint query returned no rows".to_string()))?;
    try_get(row, "fingerprint")
}

fn column_from_row(row: &Row) -> ResourceResult<(String, ColumnType)> {
    let name: String = try_get(row, "column_name")?;
    Ok((
        name,
        ColumnType {
            declared: try_get(row, "data_type")?,
            ordinal: try_get(row, "ordinal")?,
            not_null: try_get(row, "not_null")?,
            has_default: try_get(row, "has_default")?,
        },
    ))
}

fn try_get<T>(row: &Row, column: &str) -> ResourceResult<T>
where
    T: for<'a> tokio_postgres::types::FromSql<'a>,
{
    row.try_get(column)
        .map_err(|e| ResourceError::decode(column, e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map() -> ColumnMap {
        [
            ("tags", ColumnType { ordinal: 3, ..ColumnType::named("jsonb") }),
            ("id", ColumnType { ordinal: 1, ..ColumnType::named("uuid") }),
            ("name", ColumnType { ordinal: 2, ..ColumnType::named("text") }),
            ("meta", ColumnType { ordinal: 4, ..ColumnType::named("json") }),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn json_tag_covers_json_and_jsonb() {
        let cols = map();
        assert!(cols.is_json("tags"));
        assert!(cols.is_json("meta"));
        assert!(!cols.is_json("name"));
        assert!(!cols.is_json("missing"));
    }

    #[test]
    fn table_order_follows_ordinal() {
        let cols = map();
        let names: Vec<_> = cols.in_table_order().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, ["id", "name", "tags", "meta"]);
    }
}
