//! Privileged catalog access over a direct PostgreSQL connection.
//!
//! Every operation opens its own connection and closes it before returning,
//! on success and on failure alike. Connections are never pooled, which
//! keeps at most one catalog connection open against the source.
//!
//! Catalog columns are cast to `text`/`int4` in SQL so that the
//! `information_schema` domain types decode as plain Rust types.

use super::SchemaCatalog;
use crate::error::{HarvestError, redact_database_url};
use crate::models::{
    ColumnDefinition, ColumnType, EnumType, IndexDefinition, SchemaSnapshot, TableColumnTypes,
    TableDefinition, TableDescriptor,
};
use crate::Result;
use async_trait::async_trait;
use futures::future::BoxFuture;
use sqlx::postgres::{PgConnection, PgRow};
use sqlx::{Connection, Row};

const LIST_BASE_TABLES: &str = "
    SELECT table_name::text AS table_name
    FROM information_schema.tables
    WHERE table_schema = $1
      AND table_type = 'BASE TABLE'
    ORDER BY table_name";

const COLUMN_TYPES: &str = "
    SELECT column_name::text AS column_name,
           data_type::text AS data_type,
           udt_name::text AS udt_name
    FROM information_schema.columns
    WHERE table_schema = $1
      AND table_name = $2
    ORDER BY ordinal_position";

const PRIMARY_KEY_COLUMNS: &str = "
    SELECT a.attname::text AS column_name
    FROM pg_index i
    JOIN pg_class c ON c.oid = i.indrelid
    JOIN pg_namespace n ON n.oid = c.relnamespace
    CROSS JOIN LATERAL unnest(i.indkey::int2[]) WITH ORDINALITY AS k(attnum, position)
    JOIN pg_attribute a ON a.attrelid = c.oid AND a.attnum = k.attnum
    WHERE i.indisprimary
      AND n.nspname = $1
      AND c.relname = $2
    ORDER BY k.position";

const ENUM_LABELS: &str = "
    SELECT t.typname::text AS type_name,
           e.enumlabel::text AS label
    FROM pg_type t
    JOIN pg_enum e ON e.enumtypid = t.oid
    JOIN pg_namespace n ON n.oid = t.typnamespace
    WHERE n.nspname = $1
    ORDER BY t.typname, e.enumsortorder";

const COLUMN_DEFINITIONS: &str = "
    SELECT column_name::text AS column_name,
           data_type::text AS data_type,
           udt_schema::text AS udt_schema,
           udt_name::text AS udt_name,
           character_maximum_length::int4 AS character_maximum_length,
           is_nullable::text AS is_nullable,
           column_default::text AS column_default
    FROM information_schema.columns
    WHERE table_schema = $1
      AND table_name = $2
    ORDER BY ordinal_position";

const INDEX_DEFINITIONS: &str = "
    SELECT indexname::text AS index_name,
           tablename::text AS table_name,
           indexdef
    FROM pg_indexes
    WHERE schemaname = $1
    ORDER BY tablename, indexname";

/// Typed column access with catalog error context.
trait RowExt {
    fn field<'r, T>(&'r self, name: &str) -> Result<T>
    where
        T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>;
}

impl RowExt for PgRow {
    fn field<'r, T>(&'r self, name: &str) -> Result<T>
    where
        T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
    {
        self.try_get(name).map_err(|e| {
            HarvestError::introspection_failed(format!("Failed to read catalog column '{}'", name), e)
        })
    }
}

/// [`SchemaCatalog`] backed by a PostgreSQL connection string.
#[derive(Clone)]
pub struct PgCatalog {
    database_url: String,
}

impl std::fmt::Debug for PgCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgCatalog")
            .field("database_url", &redact_database_url(&self.database_url))
            .finish()
    }
}

impl PgCatalog {
    /// Creates a catalog for `database_url`. No connection is opened here.
    ///
    /// # Errors
    /// Returns error if the URL is not a `postgres://` or `postgresql://` URL
    pub fn new(database_url: impl Into<String>) -> Result<Self> {
        let database_url = database_url.into();
        let parsed = url::Url::parse(&database_url).map_err(|e| {
            HarvestError::configuration(format!("Invalid database URL: {}", e))
        })?;

        if !matches!(parsed.scheme(), "postgres" | "postgresql") {
            return Err(HarvestError::configuration(format!(
                "Unsupported database URL scheme '{}'",
                parsed.scheme()
            )));
        }

        Ok(Self { database_url })
    }

    /// Runs `operation` on a fresh connection and closes it afterwards,
    /// whatever the outcome.
    async fn with_connection<T, F>(&self, operation: F) -> Result<T>
    where
        T: Send,
        F: for<'c> FnOnce(&'c mut PgConnection) -> BoxFuture<'c, Result<T>> + Send,
    {
        let mut connection = PgConnection::connect(&self.database_url)
            .await
            .map_err(|e| {
                HarvestError::connection_failed(
                    format!(
                        "Failed to connect to {}",
                        redact_database_url(&self.database_url)
                    ),
                    e,
                )
            })?;

        let result = operation(&mut connection).await;

        if let Err(e) = connection.close().await {
            tracing::debug!("Catalog connection did not close cleanly: {}", e);
        }

        result
    }
}

async fn fetch_columns(
    connection: &mut PgConnection,
    table: &TableDescriptor,
) -> Result<Vec<ColumnDefinition>> {
    let rows = sqlx::query(COLUMN_DEFINITIONS)
        .bind(&table.schema)
        .bind(&table.name)
        .fetch_all(&mut *connection)
        .await
        .map_err(|e| {
            HarvestError::from_catalog_query(
                &format!("columns of {}", table.qualified()),
                e,
            )
        })?;

    rows.iter()
        .map(|row| {
            let is_nullable: String = row.field("is_nullable")?;
            Ok(ColumnDefinition {
                name: row.field("column_name")?,
                data_type: row.field("data_type")?,
                udt_schema: row.field("udt_schema")?,
                udt_name: row.field("udt_name")?,
                character_maximum_length: row.field("character_maximum_length")?,
                is_nullable: is_nullable.eq_ignore_ascii_case("YES"),
                column_default: row.field("column_default")?,
            })
        })
        .collect()
}

/// Groups `(type, label)` rows, already sorted by type and sort order.
fn group_enum_labels(rows: Vec<(String, String)>) -> Vec<EnumType> {
    let mut enums: Vec<EnumType> = Vec::new();
    for (name, label) in rows {
        match enums.last_mut() {
            Some(current) if current.name == name => current.labels.push(label),
            _ => enums.push(EnumType {
                name,
                labels: vec![label],
            }),
        }
    }
    enums
}

#[async_trait]
impl SchemaCatalog for PgCatalog {
    async fn list_base_tables(&self, schema: &str) -> Result<Vec<TableDescriptor>> {
        let schema = schema.to_string();
        self.with_connection(move |connection| {
            Box::pin(async move {
                let rows = sqlx::query(LIST_BASE_TABLES)
                    .bind(&schema)
                    .fetch_all(&mut *connection)
                    .await
                    .map_err(|e| {
                        HarvestError::from_catalog_query("information_schema.tables", e)
                    })?;

                rows.iter()
                    .map(|row| {
                        let name: String = row.field("table_name")?;
                        Ok(TableDescriptor::in_schema(name, schema.as_str()))
                    })
                    .collect()
            })
        })
        .await
    }

    async fn column_types(&self, table: &TableDescriptor) -> Result<TableColumnTypes> {
        let table = table.clone();
        self.with_connection(move |connection| {
            Box::pin(async move {
                let rows = sqlx::query(COLUMN_TYPES)
                    .bind(&table.schema)
                    .bind(&table.name)
                    .fetch_all(&mut *connection)
                    .await
                    .map_err(|e| {
                        HarvestError::from_catalog_query(
                            &format!("column types of {}", table.qualified()),
                            e,
                        )
                    })?;

                let mut types = TableColumnTypes::with_capacity(rows.len());
                for row in &rows {
                    let name: String = row.field("column_name")?;
                    let data_type: String = row.field("data_type")?;
                    let udt_name: Option<String> = row.field("udt_name")?;
                    types.insert(
                        name,
                        ColumnType {
                            data_type,
                            udt_name,
                        },
                    );
                }
                Ok(types)
            })
        })
        .await
    }

    async fn primary_key(&self, table: &TableDescriptor) -> Result<Vec<String>> {
        let table = table.clone();
        self.with_connection(move |connection| {
            Box::pin(async move {
                let rows = sqlx::query(PRIMARY_KEY_COLUMNS)
                    .bind(&table.schema)
                    .bind(&table.name)
                    .fetch_all(&mut *connection)
                    .await
                    .map_err(|e| {
                        HarvestError::from_catalog_query(
                            &format!("primary key of {}", table.qualified()),
                            e,
                        )
                    })?;

                rows.iter().map(|row| row.field("column_name")).collect()
            })
        })
        .await
    }

    async fn introspect(
        &self,
        schema: &str,
        tables: &[TableDescriptor],
    ) -> Result<SchemaSnapshot> {
        let schema = schema.to_string();
        let tables = tables.to_vec();
        self.with_connection(move |connection| {
            Box::pin(async move {
                let enum_rows: Vec<(String, String)> = sqlx::query_as(ENUM_LABELS)
                    .bind(&schema)
                    .fetch_all(&mut *connection)
                    .await
                    .map_err(|e| HarvestError::from_catalog_query("pg_enum", e))?;
                let enums = group_enum_labels(enum_rows);
                tracing::debug!("Found {} enum types in schema {}", enums.len(), schema);

                let mut definitions = Vec::with_capacity(tables.len());
                for table in tables {
                    let columns = fetch_columns(connection, &table).await?;
                    definitions.push(TableDefinition { table, columns });
                }

                let index_rows = sqlx::query(INDEX_DEFINITIONS)
                    .bind(&schema)
                    .fetch_all(&mut *connection)
                    .await
                    .map_err(|e| HarvestError::from_catalog_query("pg_indexes", e))?;
                let indexes = index_rows
                    .iter()
                    .map(|row| {
                        Ok(IndexDefinition {
                            name: row.field("index_name")?,
                            table: row.field("table_name")?,
                            definition: row.field("indexdef")?,
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                tracing::debug!("Found {} indexes in schema {}", indexes.len(), schema);

                Ok(SchemaSnapshot {
                    enums,
                    tables: definitions,
                    indexes,
                })
            })
        })
        .await
    }
}
