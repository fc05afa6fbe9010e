//! The two ways the engine reaches a database.
//!
//! - [`DataApi`]: the restricted data API, always available. Used for row
//!   extraction and as the discovery fallback.
//! - [`SchemaCatalog`]: the privileged catalog connection, available only
//!   when a database URL is configured. Used for authoritative discovery,
//!   column type hints and schema DDL.
//!
//! Production implementations live in [`rest`] and [`postgres`]; tests use
//! in-memory doubles.

pub mod postgres;
pub mod rest;

use crate::Result;
use crate::models::{ExtractedRow, SchemaSnapshot, TableColumnTypes, TableDescriptor};
use async_trait::async_trait;

pub use postgres::PgCatalog;
pub use rest::RestClient;

/// Restricted data access: remote procedures and ranged table reads.
#[async_trait]
pub trait DataApi: Send + Sync {
    /// Invokes a remote procedure without arguments and returns its rows.
    ///
    /// # Errors
    /// Returns an error if the procedure is missing or the call fails
    async fn call_procedure(&self, name: &str) -> Result<Vec<serde_json::Value>>;

    /// Selects all columns of rows `[offset, offset + limit)` of `table`,
    /// sorted ascending by `order_by` when it is not empty.
    ///
    /// # Errors
    /// Returns an error if the API rejects the request
    async fn select_range(
        &self,
        table: &TableDescriptor,
        order_by: &[String],
        offset: usize,
        limit: usize,
    ) -> Result<Vec<ExtractedRow>>;
}

/// Privileged, read-only access to the database catalog.
#[async_trait]
pub trait SchemaCatalog: Send + Sync {
    /// Lists the base tables of `schema`, ordered by name.
    ///
    /// # Errors
    /// Returns an error if the connection or the catalog query fails
    async fn list_base_tables(&self, schema: &str) -> Result<Vec<TableDescriptor>>;

    /// Returns the declared column types of one table.
    ///
    /// # Errors
    /// Returns an error if the connection or the catalog query fails
    async fn column_types(&self, table: &TableDescriptor) -> Result<TableColumnTypes>;

    /// Returns the primary key columns of one table in key order, or an
    /// empty list when the table has none.
    ///
    /// # Errors
    /// Returns an error if the connection or the catalog query fails
    async fn primary_key(&self, _table: &TableDescriptor) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    /// Reads the enums and indexes of `schema` and the column definitions
    /// of `tables` in one pass.
    ///
    /// # Errors
    /// Returns an error if any catalog query fails; partial snapshots are
    /// never returned
    async fn introspect(
        &self,
        schema: &str,
        tables: &[TableDescriptor],
    ) -> Result<SchemaSnapshot>;
}
