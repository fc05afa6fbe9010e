//! Table discovery.
//!
//! Two strategies share one trait. [`select_discovery`] picks one once, from
//! the credentials available:
//!
//! - [`CatalogDiscovery`] reads `information_schema` over the privileged
//!   connection. It is authoritative and sorted by table name.
//! - [`ProcedureDiscovery`] calls the `get_all_tables` procedure through the
//!   data API.
//!
//! Discovery never fails. When the chosen source errors the result is empty
//! and flagged as degraded, and the caller decides how to proceed.

use crate::models::{Discovery, TableDescriptor};
use crate::source::{DataApi, SchemaCatalog};
use async_trait::async_trait;
use std::sync::Arc;

/// Remote procedure listing the application tables.
pub const TABLE_LIST_PROCEDURE: &str = "get_all_tables";

/// A strategy for resolving the tables of one schema.
#[async_trait]
pub trait TableDiscovery: Send + Sync {
    /// Resolves the tables to extract. Never errors; see [`Discovery::degraded`].
    async fn discover(&self) -> Discovery;

    /// Short name of the strategy for log output.
    fn name(&self) -> &'static str;
}

/// Discovery through the privileged catalog.
pub struct CatalogDiscovery {
    catalog: Arc<dyn SchemaCatalog>,
    schema: String,
}

impl CatalogDiscovery {
    pub fn new(catalog: Arc<dyn SchemaCatalog>, schema: impl Into<String>) -> Self {
        Self {
            catalog,
            schema: schema.into(),
        }
    }
}

#[async_trait]
impl TableDiscovery for CatalogDiscovery {
    async fn discover(&self) -> Discovery {
        match self.catalog.list_base_tables(&self.schema).await {
            Ok(mut tables) => {
                tables.retain(|table| !table.name.is_empty());
                tables.sort_by(|a, b| a.name.cmp(&b.name));
                tracing::info!(
                    "Discovered {} tables in schema {} from the catalog",
                    tables.len(),
                    self.schema
                );
                Discovery::complete(tables)
            }
            Err(e) => {
                tracing::warn!("Catalog table discovery failed: {}", e);
                Discovery::degraded()
            }
        }
    }

    fn name(&self) -> &'static str {
        "catalog"
    }
}

/// Discovery through the `get_all_tables` remote procedure.
pub struct ProcedureDiscovery {
    api: Arc<dyn DataApi>,
    schema: String,
}

impl ProcedureDiscovery {
    pub fn new(api: Arc<dyn DataApi>, schema: impl Into<String>) -> Self {
        Self {
            api,
            schema: schema.into(),
        }
    }
}

#[async_trait]
impl TableDiscovery for ProcedureDiscovery {
    async fn discover(&self) -> Discovery {
        let rows = match self.api.call_procedure(TABLE_LIST_PROCEDURE).await {
            Ok(rows) => rows,
            Err(e) => {
                tracing::warn!(
                    "Procedure {} unavailable, no tables discovered: {}",
                    TABLE_LIST_PROCEDURE,
                    e
                );
                return Discovery::degraded();
            }
        };

        let tables: Vec<TableDescriptor> = rows
            .iter()
            .filter_map(|row| {
                let table = descriptor_from_row(row, &self.schema);
                if table.is_none() {
                    tracing::warn!("Skipping unusable {} entry: {}", TABLE_LIST_PROCEDURE, row);
                }
                table
            })
            .collect();

        tracing::info!(
            "Discovered {} tables through {}",
            tables.len(),
            TABLE_LIST_PROCEDURE
        );
        Discovery::complete(tables)
    }

    fn name(&self) -> &'static str {
        "procedure"
    }
}

/// Reads one procedure row.
///
/// Accepts a bare table name or an object carrying `table_name`, `tablename`
/// or `name`, optionally with `table_schema` or `schema`. Empty names yield
/// `None`.
pub fn descriptor_from_row(row: &serde_json::Value, default_schema: &str) -> Option<TableDescriptor> {
    let (name, schema) = match row {
        serde_json::Value::String(name) => (name.as_str(), None),
        serde_json::Value::Object(object) => {
            let name = ["table_name", "tablename", "name"]
                .iter()
                .find_map(|key| object.get(*key).and_then(serde_json::Value::as_str))?;
            let schema = ["table_schema", "schema"]
                .iter()
                .find_map(|key| object.get(*key).and_then(serde_json::Value::as_str))
                .filter(|schema| !schema.is_empty());
            (name, schema)
        }
        _ => return None,
    };

    if name.is_empty() {
        return None;
    }

    Some(TableDescriptor::in_schema(
        name,
        schema.unwrap_or(default_schema),
    ))
}

/// Chooses the discovery strategy for the available credentials.
pub fn select_discovery(
    api: Arc<dyn DataApi>,
    catalog: Option<Arc<dyn SchemaCatalog>>,
    schema: &str,
) -> Box<dyn TableDiscovery> {
    match catalog {
        Some(catalog) => Box::new(CatalogDiscovery::new(catalog, schema)),
        None => Box::new(ProcedureDiscovery::new(api, schema)),
    }
}
