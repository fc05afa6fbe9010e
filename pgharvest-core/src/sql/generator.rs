//! Reconstruction script generation.
//!
//! The full document is laid out in a fixed order: header, schema DDL (or a
//! placeholder when it could not be introspected), per-table data, footer.
//! Each `INSERT` takes its column list from the row itself, so rows of one
//! table may legitimately differ in shape.

use super::format::ValueFormatter;
use super::statement::{Statement, render};
use crate::error::HarvestError;
use crate::models::{ColumnTypeMap, ExtractedRow, TableDataset, TableDescriptor, iso8601};
use crate::Result;
use chrono::{DateTime, Utc};

/// Prefix of the comment emitted for tables without rows.
pub const NO_DATA_COMMENT: &str = "No data in table";

const DEFER_ENFORCEMENT: &str = "SET session_replication_role = replica;";
const RESTORE_ENFORCEMENT: &str = "SET session_replication_role = DEFAULT;";

/// Renders extracted datasets into a SQL reconstruction script.
///
/// # Example
/// ```rust
/// use pgharvest_core::models::{ExtractedRow, FieldValue, TableDataset, TableDescriptor};
/// use pgharvest_core::sql::generator::ScriptGenerator;
///
/// let tables = vec![TableDescriptor::new("users")];
/// let mut row = ExtractedRow::new();
/// row.insert("id".to_string(), FieldValue::from(1_i64));
/// let mut datasets = TableDataset::new();
/// datasets.insert("users".to_string(), vec![row]);
///
/// let sql = ScriptGenerator::new().generate(&tables, &datasets);
/// assert!(sql.contains(r#"INSERT INTO "public"."users" ("id") VALUES (1);"#));
/// ```
#[derive(Debug, Clone)]
pub struct ScriptGenerator {
    schema_ddl: Option<String>,
    column_types: ColumnTypeMap,
    include_drops: bool,
    generated_at: DateTime<Utc>,
}

impl Default for ScriptGenerator {
    fn default() -> Self {
        Self {
            schema_ddl: None,
            column_types: ColumnTypeMap::new(),
            include_drops: false,
            generated_at: Utc::now(),
        }
    }
}

impl ScriptGenerator {
    /// Creates a generator without schema DDL or type hints.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inlines introspected schema DDL; `None` emits the placeholder comment.
    pub fn with_schema_ddl(mut self, schema_ddl: Option<String>) -> Self {
        self.schema_ddl = schema_ddl;
        self
    }

    /// Sets the column types used to recognize array columns.
    pub fn with_column_types(mut self, column_types: ColumnTypeMap) -> Self {
        self.column_types = column_types;
        self
    }

    /// Emits `DROP TABLE IF EXISTS` guards in the full document.
    pub fn with_include_drops(mut self, include_drops: bool) -> Self {
        self.include_drops = include_drops;
        self
    }

    /// Overrides the timestamp written into the header.
    pub fn with_generated_at(mut self, generated_at: DateTime<Utc>) -> Self {
        self.generated_at = generated_at;
        self
    }

    /// Renders the full reconstruction document.
    ///
    /// With drop guards enabled and schema DDL available, the guards are
    /// emitted ahead of the DDL so that the `CREATE TABLE` statements
    /// recreate what was dropped; otherwise they precede each table's data.
    pub fn generate(&self, tables: &[TableDescriptor], datasets: &TableDataset) -> String {
        let mut statements = self.header("Database reconstruction script");

        let hoist_drops = self.include_drops
            && self
                .schema_ddl
                .as_deref()
                .is_some_and(|ddl| !ddl.trim().is_empty());
        if hoist_drops {
            statements.push(Statement::comment("Drop existing tables"));
            statements.extend(tables.iter().map(drop_table));
            statements.push(Statement::Blank);
        }

        match &self.schema_ddl {
            Some(ddl) if ddl.trim().is_empty() => {
                statements.push(Statement::comment("Schema: no objects found"));
            }
            Some(ddl) => {
                statements.push(Statement::comment("Schema"));
                statements.push(Statement::Raw(ddl.trim_end().to_string()));
            }
            None => {
                statements.push(Statement::comment(
                    "Schema DDL skipped: privileged catalog access was unavailable.\n\
                     Create the tables before running the statements below.",
                ));
            }
        }
        statements.push(Statement::Blank);

        statements.extend(self.data_statements(
            tables,
            datasets,
            self.include_drops && !hoist_drops,
        ));
        statements.extend(footer());

        render(&statements)
    }

    /// Renders a data-only document: header, per-table data, footer.
    pub fn generate_inserts(
        &self,
        tables: &[TableDescriptor],
        datasets: &TableDataset,
        include_drops: bool,
    ) -> String {
        let mut statements = self.header("Data-only script");
        statements.extend(self.data_statements(tables, datasets, include_drops));
        statements.extend(footer());
        render(&statements)
    }

    /// Per-table data statements in discovery order.
    ///
    /// A table without rows (or absent from `datasets`) yields exactly one
    /// "no data" comment.
    pub fn data_statements(
        &self,
        tables: &[TableDescriptor],
        datasets: &TableDataset,
        include_drops: bool,
    ) -> Vec<Statement> {
        let formatter = ValueFormatter::new(&self.column_types);
        let mut statements = Vec::new();

        for table in tables {
            let rows = datasets.get(&table.name).map(Vec::as_slice).unwrap_or_default();
            if rows.is_empty() {
                statements.push(Statement::comment(format!(
                    "{} {}",
                    NO_DATA_COMMENT,
                    table.qualified()
                )));
                statements.push(Statement::Blank);
                continue;
            }

            if include_drops {
                statements.push(drop_table(table));
            }
            statements.push(Statement::comment(format!(
                "Data for table {} ({} rows)",
                table.qualified(),
                rows.len()
            )));
            statements.extend(rows.iter().map(|row| insert(&formatter, table, row)));
            statements.push(Statement::Blank);
        }

        statements
    }

    /// Serializes datasets as a JSON mapping of table name to rows.
    pub fn snapshot_json(datasets: &TableDataset) -> Result<String> {
        serde_json::to_string_pretty(datasets).map_err(|e| HarvestError::Serialization {
            context: "Failed to serialize data snapshot".to_string(),
            source: e,
        })
    }

    fn header(&self, title: &str) -> Vec<Statement> {
        vec![
            Statement::comment(title),
            Statement::comment(format!("Generated at {}", iso8601(&self.generated_at))),
            Statement::comment(""),
            Statement::comment(
                "Uncomment to defer trigger and foreign key enforcement during the load\n\
                 (requires superuser or replication privileges):",
            ),
            Statement::comment(DEFER_ENFORCEMENT),
            Statement::Blank,
        ]
    }
}

fn footer() -> Vec<Statement> {
    vec![
        Statement::comment("Uncomment if enforcement was deferred above:"),
        Statement::comment(RESTORE_ENFORCEMENT),
    ]
}

fn drop_table(table: &TableDescriptor) -> Statement {
    Statement::DropTable {
        schema: table.schema.clone(),
        name: table.name.clone(),
    }
}

fn insert(formatter: &ValueFormatter<'_>, table: &TableDescriptor, row: &ExtractedRow) -> Statement {
    let (columns, values) = row
        .iter()
        .map(|(column, value)| {
            (
                column.clone(),
                formatter.format(&table.name, column, value),
            )
        })
        .unzip();

    Statement::Insert {
        schema: table.schema.clone(),
        table: table.name.clone(),
        columns,
        values,
    }
}
