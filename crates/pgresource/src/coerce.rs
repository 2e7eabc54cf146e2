//! Value coercion and binding for create/update payloads.
//!
//! Request bodies arrive as JSON. Two steps turn a JSON value into a bound
//! parameter:
//!
//! 1. [`coerce`] serializes objects and arrays headed for `json`/`jsonb`
//!    columns into JSON text and leaves every other value untouched.
//! 2. [`BoundValue::bind`] renders the (coerced) value as text and
//!    [`BoundValue::push`] emits a placeholder cast to the column's declared
//!    type, so Postgres does the final conversion (`$3::text::integer`).

use crate::param::ParamList;
use crate::schema::{ColumnMap, ColumnType};
use serde_json::Value;

/// Serialize structured values bound for JSON columns; pass everything else through.
pub fn coerce(columns: &ColumnMap, key: &str, value: Value) -> Value {
    match value {
        Value::Object(_) | Value::Array(_) if columns.is_json(key) => {
            Value::String(value.to_string())
        }
        other => other,
    }
}

/// A JSON value rendered for text-cast binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoundValue {
    Scalar(Option<String>),
    Array(Vec<Option<String>>),
}

impl BoundValue {
    /// Render `value` for a column of type `ty`.
    ///
    /// JSON arrays become Postgres arrays only when the column is array-typed;
    /// otherwise they are sent as JSON text like objects are.
    pub fn bind(ty: &ColumnType, value: &Value) -> Self {
        match value {
            Value::Array(items) if ty.is_array() => {
                BoundValue::Array(items.iter().map(render).collect())
            }
            other => BoundValue::Scalar(render(other)),
        }
    }

    /// Push the value onto `params` and return its placeholder expression.
    pub fn push(self, params: &mut ParamList, ty: &ColumnType) -> String {
        match self {
            BoundValue::Scalar(v) => {
                let idx = params.push(v);
                format!("${idx}::text::{}", ty.declared)
            }
            BoundValue::Array(v) => {
                let idx = params.push(v);
                format!("${idx}::text[]::{}", ty.declared)
            }
        }
    }
}

fn render(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn columns() -> ColumnMap {
        [
            ("tags", ColumnType::named("jsonb")),
            ("meta", ColumnType::named("json")),
            ("name", ColumnType::named("text")),
            ("labels", ColumnType::named("text[]")),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn json_columns_get_json_text() {
        let cols = columns();
        for value in [json!(["x", "y"]), json!({"a": {"b": [1, 2]}}), json!([])] {
            let coerced = coerce(&cols, "tags", value.clone());
            let Value::String(text) = coerced else {
                panic!("expected JSON text");
            };
            assert_eq!(serde_json::from_str::<Value>(&text).unwrap(), value);
        }
        assert_eq!(coerce(&cols, "meta", json!({"k": 1})), json!("{\"k\":1}"));
    }

    #[test]
    fn scalars_pass_through_json_columns() {
        let cols = columns();
        assert_eq!(coerce(&cols, "tags", json!("raw")), json!("raw"));
        assert_eq!(coerce(&cols, "tags", Value::Null), Value::Null);
        assert_eq!(coerce(&cols, "tags", json!(3)), json!(3));
    }

    #[test]
    fn other_columns_are_untouched() {
        let cols = columns();
        let value = json!({"nested": true});
        assert_eq!(coerce(&cols, "name", value.clone()), value);
        assert_eq!(coerce(&cols, "unknown", json!([1])), json!([1]));
    }

    #[test]
    fn bind_renders_text() {
        let text = ColumnType::named("text");
        assert_eq!(BoundValue::bind(&text, &Value::Null), BoundValue::Scalar(None));
        assert_eq!(
            BoundValue::bind(&text, &json!(true)),
            BoundValue::Scalar(Some("true".into()))
        );
        assert_eq!(
            BoundValue::bind(&text, &json!(1.5)),
            BoundValue::Scalar(Some("1.5".into()))
        );
        assert_eq!(
            BoundValue::bind(&text, &json!(["a"])),
            BoundValue::Scalar(Some("[\"a\"]".into()))
        );
    }

    #[test]
    fn arrays_bind_as_arrays_for_array_columns() {
        let labels = ColumnType::named("text[]");
        assert_eq!(
            BoundValue::bind(&labels, &json!(["a", null, 2])),
            BoundValue::Array(vec![Some("a".into()), None, Some("2".into())])
        );
    }

    #[test]
    fn placeholders_cast_to_declared_type() {
        let mut params = ParamList::new();
        let int = ColumnType::named("integer");
        let labels = ColumnType::named("text[]");

        let a = BoundValue::bind(&int, &json!(7)).push(&mut params, &int);
        let b = BoundValue::bind(&labels, &json!(["x"])).push(&mut params, &labels);

        assert_eq!(a, "$1::text::integer");
        assert_eq!(b, "$2::text[]::text[]");
        assert_eq!(params.len(), 2);
    }
}
