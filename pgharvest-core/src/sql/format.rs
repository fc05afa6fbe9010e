//! Conversion of field values into SQL literals.
//!
//! Formatting is total: every value produces a literal and nothing here can
//! abort script generation. Values that cannot be represented faithfully
//! degrade to `NULL` with a warning.

use super::quote::quote_literal;
use crate::models::{ColumnType, ColumnTypeMap, FieldValue, iso8601};
use serde::ser::{Error as _, Serialize, Serializer};

/// Renders `value` as a SQL literal, using `hint` to recognize array columns.
///
/// Dispatch order:
/// 1. `Null` becomes `NULL`
/// 2. text is single-quoted with quotes doubled
/// 3. booleans become `TRUE`/`FALSE`
/// 4. numbers keep the digits the source sent; NaN and infinities become `NULL`
/// 5. timestamps become quoted ISO-8601 text
/// 6. arrays in columns the catalog reports as arrays become `ARRAY[...]::<type>[]`
/// 7. other arrays and objects become `'<json>'::jsonb`, or `NULL` when they
///    cannot be written as JSON
/// 8. opaque values are quoted as text
///
/// # Example
/// ```rust
/// use pgharvest_core::models::{ColumnType, FieldValue};
/// use pgharvest_core::sql::format::format_value;
///
/// let tags = FieldValue::Array(vec!["a".into(), "b".into()]);
/// let hint = ColumnType::new("ARRAY").with_udt_name("_text");
/// assert_eq!(format_value(&tags, Some(&hint)), "ARRAY['a','b']::text[]");
/// assert_eq!(format_value(&FieldValue::Float(f64::NAN), None), "NULL");
/// ```
pub fn format_value(value: &FieldValue, hint: Option<&ColumnType>) -> String {
    match value {
        FieldValue::Null => "NULL".to_string(),
        FieldValue::Text(text) => quote_literal(text),
        FieldValue::Bool(true) => "TRUE".to_string(),
        FieldValue::Bool(false) => "FALSE".to_string(),
        FieldValue::Number(number) => number.to_string(),
        FieldValue::Float(float) if float.is_finite() => float.to_string(),
        FieldValue::Float(_) => "NULL".to_string(),
        FieldValue::Timestamp(ts) => quote_literal(&iso8601(ts)),
        FieldValue::Array(items) => match hint.filter(|column| column.is_array()) {
            Some(column) => format_array(items, column),
            None => format_json(value),
        },
        FieldValue::Object(_) => format_json(value),
        FieldValue::Opaque(text) => quote_literal(text),
    }
}

/// Formats values with column type hints for the current run.
///
/// Wraps the run's [`ColumnTypeMap`] so formatting stays a pure function of
/// the value and this context.
#[derive(Debug, Clone, Copy)]
pub struct ValueFormatter<'a> {
    column_types: &'a ColumnTypeMap,
}

impl<'a> ValueFormatter<'a> {
    /// Creates a formatter over the given column types.
    pub fn new(column_types: &'a ColumnTypeMap) -> Self {
        Self { column_types }
    }

    /// Declared type of `table.column`, when known.
    pub fn column_type(&self, table: &str, column: &str) -> Option<&'a ColumnType> {
        self.column_types.get(table)?.get(column)
    }

    /// Formats the value stored in `table.column`.
    pub fn format(&self, table: &str, column: &str, value: &FieldValue) -> String {
        format_value(value, self.column_type(table, column))
    }
}

fn format_array(items: &[FieldValue], column: &ColumnType) -> String {
    let elements: Vec<String> = items
        .iter()
        .map(|item| match element_text(item) {
            Some(text) => quote_literal(&text),
            None => "NULL".to_string(),
        })
        .collect();
    format!("ARRAY[{}]::{}", elements.join(","), column.array_cast())
}

/// Text form of one array element; `None` renders as `NULL`.
fn element_text(item: &FieldValue) -> Option<String> {
    match item {
        FieldValue::Null => None,
        FieldValue::Text(text) | FieldValue::Opaque(text) => Some(text.clone()),
        FieldValue::Bool(b) => Some(b.to_string()),
        FieldValue::Number(number) => Some(number.to_string()),
        FieldValue::Float(float) if float.is_nan() => Some("NaN".to_string()),
        FieldValue::Float(float) if float.is_infinite() => Some(
            if float.is_sign_positive() {
                "Infinity"
            } else {
                "-Infinity"
            }
            .to_string(),
        ),
        FieldValue::Float(float) => Some(float.to_string()),
        FieldValue::Timestamp(ts) => Some(iso8601(ts)),
        FieldValue::Array(_) | FieldValue::Object(_) => to_strict_json(item),
    }
}

fn format_json(value: &FieldValue) -> String {
    match to_strict_json(value) {
        Some(json) => format!("{}::jsonb", quote_literal(&json)),
        None => "NULL".to_string(),
    }
}

fn to_strict_json(value: &FieldValue) -> Option<String> {
    match serde_json::to_string(&StrictJson(value)) {
        Ok(json) => Some(json),
        Err(e) => {
            tracing::warn!(
                "Structured value cannot be written as JSON, emitting NULL: {}",
                e
            );
            None
        }
    }
}

/// JSON form accepted by `jsonb`, which has no representation for NaN or
/// infinities.
struct StrictJson<'a>(&'a FieldValue);

impl Serialize for StrictJson<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.0 {
            FieldValue::Float(float) if !float.is_finite() => Err(S::Error::custom(format!(
                "non-finite number {} has no JSON representation",
                float
            ))),
            FieldValue::Array(items) => serializer.collect_seq(items.iter().map(StrictJson)),
            FieldValue::Object(map) => {
                serializer.collect_map(map.iter().map(|(key, value)| (key, StrictJson(value))))
            }
            other => other.serialize(serializer),
        }
    }
}
