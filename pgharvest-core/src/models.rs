//! Data model shared by discovery, extraction, introspection and generation.

use chrono::{DateTime, SecondsFormat, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::HashMap;

/// The single namespace an extraction run works against unless configured otherwise.
pub const DEFAULT_SCHEMA: &str = "public";

/// Identifies one base table.
///
/// `name` is never empty; discovery drops entries that would violate this.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableDescriptor {
    pub name: String,
    pub schema: String,
}

impl TableDescriptor {
    /// Creates a descriptor in [`DEFAULT_SCHEMA`].
    pub fn new(name: impl Into<String>) -> Self {
        Self::in_schema(name, DEFAULT_SCHEMA)
    }

    /// Creates a descriptor in an explicit schema.
    pub fn in_schema(name: impl Into<String>, schema: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            schema: schema.into(),
        }
    }

    /// `schema.name`, for log output only (not quoted, never emitted as SQL).
    pub fn qualified(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }
}

impl std::fmt::Display for TableDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

/// Result of table discovery.
///
/// `degraded` is set when the authoritative path was unavailable or failed
/// and the table list may therefore be incomplete (usually empty).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Discovery {
    pub tables: Vec<TableDescriptor>,
    pub degraded: bool,
}

impl Discovery {
    /// A discovery that reached its source successfully.
    pub fn complete(tables: Vec<TableDescriptor>) -> Self {
        Self {
            tables,
            degraded: false,
        }
    }

    /// An empty, degraded discovery.
    pub fn degraded() -> Self {
        Self {
            tables: Vec::new(),
            degraded: true,
        }
    }

    /// Returns true when no tables were found.
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

/// One field of an extracted row.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Text(String),
    Bool(bool),
    /// Finite number, kept as the digits the source sent
    Number(serde_json::Number),
    /// Floating point value that may be NaN or infinite
    Float(f64),
    Timestamp(DateTime<Utc>),
    Array(Vec<FieldValue>),
    Object(IndexMap<String, FieldValue>),
    /// Value of an unrecognized kind, known only by its textual form
    Opaque(String),
}

impl From<serde_json::Value> for FieldValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => Self::Number(n),
            serde_json::Value::String(s) => Self::Text(s),
            serde_json::Value::Array(items) => {
                Self::Array(items.into_iter().map(Self::from).collect())
            }
            serde_json::Value::Object(map) => Self::Object(
                map.into_iter()
                    .map(|(key, value)| (key, Self::from(value)))
                    .collect(),
            ),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Number(value.into())
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(value: DateTime<Utc>) -> Self {
        Self::Timestamp(value)
    }
}

// Lenient form used by the structured snapshot: non-finite floats become
// `null`. The SQL renderer has its own strict form.
impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_unit(),
            Self::Text(s) | Self::Opaque(s) => serializer.serialize_str(s),
            Self::Bool(b) => serializer.serialize_bool(*b),
            Self::Number(n) => n.serialize(serializer),
            Self::Float(f) if f.is_finite() => serializer.serialize_f64(*f),
            Self::Float(_) => serializer.serialize_unit(),
            Self::Timestamp(ts) => serializer.serialize_str(&iso8601(ts)),
            Self::Array(items) => serializer.collect_seq(items),
            Self::Object(map) => serializer.collect_map(map),
        }
    }
}

/// ISO-8601 rendering with millisecond precision and a `Z` suffix.
pub fn iso8601(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Column name to value, in the column order the source returned.
pub type ExtractedRow = IndexMap<String, FieldValue>;

/// Table name to its rows, in discovery order.
pub type TableDataset = IndexMap<String, Vec<ExtractedRow>>;

/// Converts one JSON object returned by the data API into a row.
pub fn row_from_json(object: IndexMap<String, serde_json::Value>) -> ExtractedRow {
    object
        .into_iter()
        .map(|(column, value)| (column, FieldValue::from(value)))
        .collect()
}

/// Declared type of a column as reported by the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnType {
    /// `information_schema.columns.data_type`, e.g. `integer`, `ARRAY`, `USER-DEFINED`
    pub data_type: String,
    /// Underlying type name, e.g. `_text` for `text[]`
    pub udt_name: Option<String>,
}

impl ColumnType {
    /// Creates a column type without an underlying type name.
    pub fn new(data_type: impl Into<String>) -> Self {
        Self {
            data_type: data_type.into(),
            udt_name: None,
        }
    }

    /// Sets the underlying type name.
    pub fn with_udt_name(mut self, udt_name: impl Into<String>) -> Self {
        self.udt_name = Some(udt_name.into());
        self
    }

    /// Returns true when the catalog reports an array-category type.
    pub fn is_array(&self) -> bool {
        self.data_type.eq_ignore_ascii_case("ARRAY")
    }

    /// Array type to annotate array literals with, e.g. `text[]`.
    ///
    /// Postgres names array types after their element with a leading
    /// underscore. Unknown element types fall back to `text[]`.
    pub fn array_cast(&self) -> String {
        match self
            .udt_name
            .as_deref()
            .and_then(|udt| udt.strip_prefix('_'))
        {
            Some(element) if !element.is_empty() => {
                format!("{}[]", crate::sql::quote::quote_type_name(element))
            }
            _ => "text[]".to_string(),
        }
    }
}

/// Column types of one table, by column name.
pub type TableColumnTypes = HashMap<String, ColumnType>;

/// Table name to its column types. Populated once per run, read-only afterwards.
pub type ColumnTypeMap = HashMap<String, TableColumnTypes>;

/// An enum type with its labels in declared sort order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumType {
    pub name: String,
    pub labels: Vec<String>,
}

/// Column metadata used to synthesize `CREATE TABLE`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDefinition {
    pub name: String,
    pub data_type: String,
    pub udt_schema: Option<String>,
    pub udt_name: Option<String>,
    pub character_maximum_length: Option<i32>,
    pub is_nullable: bool,
    pub column_default: Option<String>,
}

impl ColumnDefinition {
    /// Creates a nullable column with no default.
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            udt_schema: None,
            udt_name: None,
            character_maximum_length: None,
            is_nullable: true,
            column_default: None,
        }
    }
}

/// A table together with its columns in ordinal order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDefinition {
    pub table: TableDescriptor,
    pub columns: Vec<ColumnDefinition>,
}

/// An index as declared in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDefinition {
    pub name: String,
    pub table: String,
    /// Full `CREATE INDEX` statement without trailing semicolon
    pub definition: String,
}

/// Everything the introspector reads from the catalog in one pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaSnapshot {
    pub enums: Vec<EnumType>,
    pub tables: Vec<TableDefinition>,
    pub indexes: Vec<IndexDefinition>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_table_descriptor_defaults_to_public() {
        let table = TableDescriptor::new("users");
        assert_eq!(table.schema, "public");
        assert_eq!(table.qualified(), "public.users");
    }

    #[test]
    fn test_field_value_from_json_keeps_structure() {
        let value = serde_json::json!({"a": [1, "x", null], "b": true});
        let field = FieldValue::from(value);

        let FieldValue::Object(map) = field else {
            panic!("expected object");
        };
        assert_eq!(
            map.get("a"),
            Some(&FieldValue::Array(vec![
                FieldValue::from(1_i64),
                FieldValue::from("x"),
                FieldValue::Null,
            ]))
        );
        assert_eq!(map.get("b"), Some(&FieldValue::Bool(true)));
    }

    #[test]
    fn test_nested_object_keeps_key_order() {
        let value: serde_json::Value =
            serde_json::from_str(r#"{"z":1,"a":{"y":true,"b":null}}"#).unwrap();

        let FieldValue::Object(map) = FieldValue::from(value) else {
            panic!("expected object");
        };
        let keys: Vec<&str> = map.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["z", "a"]);

        let Some(FieldValue::Object(inner)) = map.get("a") else {
            panic!("expected nested object");
        };
        let keys: Vec<&str> = inner.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["y", "b"]);
    }

    #[test]
    fn test_row_from_json_preserves_column_order() {
        let mut object = IndexMap::new();
        object.insert("zeta".to_string(), serde_json::json!(1));
        object.insert("alpha".to_string(), serde_json::json!(2));

        let row = row_from_json(object);
        let columns: Vec<&str> = row.keys().map(String::as_str).collect();
        assert_eq!(columns, vec!["zeta", "alpha"]);
    }

    #[test]
    fn test_snapshot_serialization_is_lenient() {
        let mut row = ExtractedRow::new();
        row.insert("ratio".to_string(), FieldValue::Float(f64::NAN));
        row.insert(
            "at".to_string(),
            FieldValue::Timestamp(Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()),
        );

        let json = serde_json::to_string(&row).unwrap();
        assert_eq!(json, r#"{"ratio":null,"at":"2024-03-01T12:00:00.000Z"}"#);
    }

    #[test]
    fn test_column_type_array_cast() {
        assert!(ColumnType::new("ARRAY").is_array());
        assert!(!ColumnType::new("integer").is_array());
        assert_eq!(
            ColumnType::new("ARRAY").with_udt_name("_text").array_cast(),
            "text[]"
        );
        assert_eq!(
            ColumnType::new("ARRAY").with_udt_name("_int4").array_cast(),
            "int4[]"
        );
        assert_eq!(ColumnType::new("ARRAY").array_cast(), "text[]");
        assert_eq!(
            ColumnType::new("ARRAY").with_udt_name("_Mood").array_cast(),
            "\"Mood\"[]"
        );
    }

    #[test]
    fn test_discovery_constructors() {
        assert!(Discovery::degraded().degraded);
        assert!(Discovery::degraded().is_empty());

        let discovery = Discovery::complete(vec![TableDescriptor::new("a")]);
        assert!(!discovery.degraded);
        assert!(!discovery.is_empty());
    }
}
