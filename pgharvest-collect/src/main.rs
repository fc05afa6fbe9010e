//! Database extraction tool.
//!
//! Copies every table of one schema through the data API and writes a SQL
//! reconstruction script, a data-only script and a JSON snapshot.
//!
//! # Security Guarantees
//! - Read-only access to the data API and the catalog
//! - API keys are never logged and database URLs are redacted

use clap::Parser;
use pgharvest_collect::output::write_outputs;
use pgharvest_collect::{Cli, Command, build_harvester};
use pgharvest_core::error::redact_database_url;
use pgharvest_core::{HarvestOutput, Harvester, Result, init_logging};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.global.verbose, cli.global.quiet)?;

    info!("Data API: {}", cli.api_url.trim());
    match cli.database_url() {
        Some(url) => info!("Catalog: {}", redact_database_url(url)),
        None => info!("Catalog: not configured, schema DDL will be skipped"),
    }

    let harvester = build_harvester(&cli).map_err(|e| {
        error!("Invalid configuration: {}", e);
        e
    })?;

    match cli.command() {
        Command::Tables => list_tables(&harvester).await,
        Command::Dump => dump(&harvester, &cli).await,
    }
}

/// Discovers tables and prints one qualified name per line.
async fn list_tables(harvester: &Harvester) -> Result<()> {
    let discovery = harvester.discover().await;

    if discovery.degraded {
        warn!("Table discovery was degraded; the list may be incomplete");
    }

    if discovery.tables.is_empty() {
        eprintln!("No tables found");
        std::process::exit(1);
    }

    for table in &discovery.tables {
        println!("{}", table.qualified());
    }

    Ok(())
}

/// Runs a full extraction and writes the outputs.
async fn dump(harvester: &Harvester, cli: &Cli) -> Result<()> {
    info!("Starting extraction...");

    let output = harvester.run().await.map_err(|e| {
        error!("Extraction failed: {}", e);
        e
    })?;

    if output.tables.is_empty() {
        eprintln!("No tables found");
        eprintln!(
            "Install the get_all_tables() procedure or pass --database-url for catalog discovery"
        );
        std::process::exit(1);
    }

    let paths = write_outputs(&cli.output_dir, &output, cli.compress).await?;

    info!("✓ Extraction completed");
    println!("Extraction completed");
    println!("Script: {}", paths.sql.display());
    println!("Inserts: {}", paths.inserts.display());
    println!("Snapshot: {}", paths.snapshot.display());
    print_summary(&output);

    Ok(())
}

fn print_summary(output: &HarvestOutput) {
    println!("Tables: {}", output.tables.len());
    println!("Rows: {}", output.row_count());
    println!(
        "Schema DDL: {}",
        if output.schema_included {
            "included"
        } else {
            "skipped"
        }
    );

    if !output.failures.is_empty() {
        println!("Failed tables: {}", output.failures.len());
        for failure in &output.failures {
            warn!("{}: {}", failure.table.qualified(), failure.error);
        }
    }
}
