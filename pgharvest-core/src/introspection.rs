//! Schema DDL synthesis from the privileged catalog.
//!
//! The catalog is read in one pass ([`SchemaCatalog::introspect`]) and the
//! resulting [`SchemaSnapshot`] is rendered by the pure [`render_schema`].
//! Column types are rendered best-effort:
//!
//! 1. array columns become `text[]` (element types are not reconstructed)
//! 2. user-defined columns reference their qualified type name
//! 3. anything else keeps its declared name plus an optional length
//!
//! Defaults are copied verbatim apart from the legacy `uuid_generate_v4()`,
//! which becomes `gen_random_uuid()` so the script does not depend on the
//! `uuid-ossp` extension.

use crate::models::{ColumnDefinition, SchemaSnapshot, TableDescriptor};
use crate::source::SchemaCatalog;
use crate::sql::quote::{quote_identifier, quote_qualified};
use crate::sql::statement::{ColumnSpec, Statement, render};
use crate::Result;
use regex::Regex;
use std::sync::{Arc, LazyLock};

static LEGACY_UUID_DEFAULT: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r#"(?i)(?:"?[a-z_][a-z0-9_$]*"?\.)?uuid_generate_v4\(\s*\)"#).ok()
});

/// Produces schema DDL for a set of tables.
pub struct SchemaIntrospector {
    catalog: Arc<dyn SchemaCatalog>,
    schema: String,
}

impl SchemaIntrospector {
    pub fn new(catalog: Arc<dyn SchemaCatalog>, schema: impl Into<String>) -> Self {
        Self {
            catalog,
            schema: schema.into(),
        }
    }

    /// Reads the catalog and renders enum, table and index DDL.
    ///
    /// # Errors
    /// Any catalog failure is returned as is; no partial DDL is produced.
    pub async fn extract_schema(&self, tables: &[TableDescriptor]) -> Result<String> {
        let snapshot = self.catalog.introspect(&self.schema, tables).await?;
        tracing::info!(
            "Introspected {} enum types, {} tables and {} indexes",
            snapshot.enums.len(),
            snapshot.tables.len(),
            snapshot.indexes.len()
        );
        Ok(render_schema(&self.schema, &snapshot))
    }
}

/// Renders a snapshot as DDL: enums, then tables, then indexes.
pub fn render_schema(schema: &str, snapshot: &SchemaSnapshot) -> String {
    let mut statements = Vec::new();

    if !snapshot.enums.is_empty() {
        statements.push(Statement::comment("Enum types"));
        for enum_type in &snapshot.enums {
            statements.push(Statement::DropType {
                schema: schema.to_string(),
                name: enum_type.name.clone(),
            });
            statements.push(Statement::CreateEnum {
                schema: schema.to_string(),
                name: enum_type.name.clone(),
                labels: enum_type.labels.clone(),
            });
        }
        statements.push(Statement::Blank);
    }

    for definition in &snapshot.tables {
        statements.push(Statement::comment(format!(
            "Table {}",
            definition.table.qualified()
        )));
        statements.push(Statement::CreateTable {
            schema: definition.table.schema.clone(),
            name: definition.table.name.clone(),
            columns: definition.columns.iter().map(column_spec).collect(),
        });
        statements.push(Statement::Blank);
    }

    if !snapshot.indexes.is_empty() {
        statements.push(Statement::comment("Indexes"));
        statements.extend(
            snapshot
                .indexes
                .iter()
                .map(|index| Statement::Raw(index.definition.clone())),
        );
        statements.push(Statement::Blank);
    }

    render(&statements)
}

/// Converts catalog column metadata into a column clause.
pub fn column_spec(column: &ColumnDefinition) -> ColumnSpec {
    ColumnSpec {
        name: column.name.clone(),
        sql_type: column_sql_type(column),
        not_null: !column.is_nullable,
        default: column.column_default.as_deref().map(rewrite_default),
    }
}

/// Renders the declared type of a column.
pub fn column_sql_type(column: &ColumnDefinition) -> String {
    if column.data_type.eq_ignore_ascii_case("ARRAY") {
        return "text[]".to_string();
    }

    if column.data_type.eq_ignore_ascii_case("USER-DEFINED") {
        return match (column.udt_schema.as_deref(), column.udt_name.as_deref()) {
            (_, None | Some("")) => "text".to_string(),
            (Some(schema), Some(name)) if !schema.is_empty() => quote_qualified(schema, name),
            (_, Some(name)) => quote_identifier(name),
        };
    }

    match column.character_maximum_length {
        Some(length) => format!("{}({})", column.data_type, length),
        None => column.data_type.clone(),
    }
}

/// Rewrites recognized legacy defaults; everything else is returned as is.
pub fn rewrite_default(default: &str) -> String {
    match LEGACY_UUID_DEFAULT.as_ref() {
        Some(pattern) => pattern.replace_all(default, "gen_random_uuid()").into_owned(),
        None => default.to_string(),
    }
}
