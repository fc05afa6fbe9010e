//! Extraction and reconstruction engine for pgharvest.
//!
//! The engine copies the tables of one PostgreSQL schema through a
//! restricted data API and turns them into a SQL reconstruction script plus
//! a JSON snapshot. When a privileged connection string is also available it
//! uses the catalog for authoritative table discovery, column type hints and
//! schema DDL.
//!
//! # Architecture
//! - [`source`]: the restricted data API and privileged catalog seams
//! - [`discovery`]: table discovery with a degraded fallback
//! - [`extract`]: paginated row extraction
//! - [`introspection`]: enum, table and index DDL
//! - [`sql`]: quoting, value formatting and script generation
//! - [`orchestrator`]: per-run sequencing with per-table fault isolation
//!
//! # Security Guarantees
//! - Every identifier in generated SQL is quoted, every literal escaped
//! - Database URLs are redacted and API keys are never logged
//! - All catalog and data access is read-only

pub mod config;
pub mod discovery;
pub mod error;
pub mod extract;
pub mod introspection;
pub mod logging;
pub mod models;
pub mod orchestrator;
pub mod source;
pub mod sql;

// Re-export commonly used types
pub use config::{ApiConfig, HarvestConfig};
pub use discovery::{CatalogDiscovery, ProcedureDiscovery, TableDiscovery, select_discovery};
pub use error::{HarvestError, Result};
pub use extract::{PAGE_SIZE, RowExtractor};
pub use introspection::SchemaIntrospector;
pub use logging::init_logging;
pub use models::{
    ColumnType, ColumnTypeMap, Discovery, ExtractedRow, FieldValue, SchemaSnapshot, TableDataset,
    TableDescriptor,
};
pub use orchestrator::{HarvestOutput, Harvester, TableFailure};
pub use source::{DataApi, PgCatalog, RestClient, SchemaCatalog};
pub use sql::{ScriptGenerator, ValueFormatter, format_value, quote_identifier};
