//! Run sequencing: discover, prefetch column types and primary keys,
//! extract, generate.
//!
//! Tables are processed one at a time. A table whose extraction fails is
//! recorded with an empty dataset and a [`TableFailure`]; the run continues
//! with the next table. Schema introspection failures fall back to the
//! placeholder comment. Only configuration errors and snapshot serialization
//! failures abort a run.

use crate::config::HarvestConfig;
use crate::discovery::select_discovery;
use crate::error::HarvestError;
use crate::extract::RowExtractor;
use crate::introspection::SchemaIntrospector;
use crate::models::{ColumnTypeMap, Discovery, TableDataset, TableDescriptor};
use crate::source::{DataApi, SchemaCatalog};
use crate::sql::generator::ScriptGenerator;
use crate::Result;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;

/// A table whose rows could not be extracted.
#[derive(Debug)]
pub struct TableFailure {
    pub table: TableDescriptor,
    pub error: HarvestError,
}

/// Everything one run produces.
#[derive(Debug)]
pub struct HarvestOutput {
    /// Tables in discovery order
    pub tables: Vec<TableDescriptor>,
    /// Rows per table; failed tables map to an empty sequence
    pub datasets: TableDataset,
    pub failures: Vec<TableFailure>,
    pub discovery_degraded: bool,
    /// Whether introspected DDL made it into `sql`
    pub schema_included: bool,
    /// Full reconstruction script
    pub sql: String,
    /// Data-only script
    pub inserts_sql: String,
    /// Structured snapshot as pretty JSON
    pub snapshot: String,
    pub generated_at: DateTime<Utc>,
}

impl HarvestOutput {
    /// Total number of extracted rows.
    pub fn row_count(&self) -> usize {
        self.datasets.values().map(Vec::len).sum()
    }
}

/// Drives one extraction run.
pub struct Harvester {
    api: Arc<dyn DataApi>,
    catalog: Option<Arc<dyn SchemaCatalog>>,
    config: HarvestConfig,
}

impl Harvester {
    /// Creates a harvester. A catalog enables authoritative discovery,
    /// array type hints and schema DDL.
    pub fn new(
        api: Arc<dyn DataApi>,
        catalog: Option<Arc<dyn SchemaCatalog>>,
        config: HarvestConfig,
    ) -> Self {
        Self {
            api,
            catalog,
            config,
        }
    }

    /// Resolves the tables to extract with the strategy the credentials allow.
    pub async fn discover(&self) -> Discovery {
        let discovery = select_discovery(self.api.clone(), self.catalog.clone(), &self.config.schema);
        tracing::debug!("Using {} table discovery", discovery.name());
        discovery.discover().await
    }

    /// Runs discovery, extraction and script generation.
    ///
    /// # Errors
    /// Returns error if the configuration is invalid or the snapshot cannot
    /// be serialized. Per-table failures are reported in
    /// [`HarvestOutput::failures`] instead.
    pub async fn run(&self) -> Result<HarvestOutput> {
        self.config.validate()?;
        let generated_at = Utc::now();

        let discovery = self.discover().await;
        if discovery.degraded {
            tracing::warn!("Table discovery was degraded; the table list may be incomplete");
        }
        if discovery.is_empty() {
            tracing::warn!("No tables found in schema {}", self.config.schema);
        }
        let tables = discovery.tables;

        let column_types = self.prefetch_column_types(&tables).await;
        let orderings = self.prefetch_orderings(&tables).await;

        let extractor = RowExtractor::new(self.api.clone()).with_page_size(self.config.page_size);
        let mut datasets = TableDataset::with_capacity(tables.len());
        let mut failures = Vec::new();

        for table in &tables {
            tracing::info!("Extracting {}", table.qualified());
            let order_by = orderings.get(&table.name).map_or(&[][..], Vec::as_slice);
            match extractor.extract_table_ordered(table, order_by).await {
                Ok(rows) => {
                    tracing::info!("Extracted {} rows from {}", rows.len(), table.qualified());
                    datasets.insert(table.name.clone(), rows);
                }
                Err(error) => {
                    tracing::error!("Skipping {}: {}", table.qualified(), error);
                    datasets.insert(table.name.clone(), Vec::new());
                    failures.push(TableFailure {
                        table: table.clone(),
                        error,
                    });
                }
            }
        }

        let schema_ddl = self.schema_ddl(&tables).await;
        let schema_included = schema_ddl.is_some();

        let generator = ScriptGenerator::new()
            .with_schema_ddl(schema_ddl)
            .with_column_types(column_types)
            .with_include_drops(self.config.include_drops)
            .with_generated_at(generated_at);

        let sql = generator.generate(&tables, &datasets);
        let inserts_sql = generator.generate_inserts(&tables, &datasets, self.config.include_drops);
        let snapshot = ScriptGenerator::snapshot_json(&datasets)?;

        Ok(HarvestOutput {
            tables,
            datasets,
            failures,
            discovery_degraded: discovery.degraded,
            schema_included,
            sql,
            inserts_sql,
            snapshot,
            generated_at,
        })
    }

    async fn prefetch_column_types(&self, tables: &[TableDescriptor]) -> ColumnTypeMap {
        let mut column_types = ColumnTypeMap::new();
        let Some(catalog) = &self.catalog else {
            return column_types;
        };

        for table in tables {
            match catalog.column_types(table).await {
                Ok(types) => {
                    column_types.insert(table.name.clone(), types);
                }
                Err(e) => {
                    tracing::warn!(
                        "Column types of {} unavailable, array values will be written as JSON: {}",
                        table.qualified(),
                        e
                    );
                }
            }
        }

        column_types
    }

    /// Primary keys to page by, for tables that have one.
    async fn prefetch_orderings(&self, tables: &[TableDescriptor]) -> HashMap<String, Vec<String>> {
        let mut orderings = HashMap::new();
        let Some(catalog) = &self.catalog else {
            return orderings;
        };

        for table in tables {
            match catalog.primary_key(table).await {
                Ok(columns) if columns.is_empty() => {
                    tracing::warn!(
                        "{} has no primary key, pages are read without an ordering",
                        table.qualified()
                    );
                }
                Ok(columns) => {
                    orderings.insert(table.name.clone(), columns);
                }
                Err(e) => {
                    tracing::warn!(
                        "Primary key of {} unavailable, pages are read without an ordering: {}",
                        table.qualified(),
                        e
                    );
                }
            }
        }

        orderings
    }

    async fn schema_ddl(&self, tables: &[TableDescriptor]) -> Option<String> {
        let catalog = self.catalog.clone()?;
        let introspector = SchemaIntrospector::new(catalog, self.config.schema.clone());

        match introspector.extract_schema(tables).await {
            Ok(ddl) => Some(ddl),
            Err(e) => {
                tracing::warn!("Schema introspection failed, writing data only: {}", e);
                None
            }
        }
    }
}
