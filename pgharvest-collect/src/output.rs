//! File output operations for extraction results.
//!
//! Writes the full script, the data-only script and the JSON snapshot into
//! one directory, all sharing the run's timestamp.

use chrono::{DateTime, Utc};
use pgharvest_core::{HarvestError, HarvestOutput, Result};
use std::path::{Path, PathBuf};

/// Paths of the files written for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    pub sql: PathBuf,
    pub inserts: PathBuf,
    pub snapshot: PathBuf,
}

/// File name stamp for a run, e.g. `20240506_070809`.
pub fn file_stamp(generated_at: &DateTime<Utc>) -> String {
    generated_at.format("%Y%m%d_%H%M%S").to_string()
}

/// Computes the output paths inside `dir`.
pub fn output_paths(dir: &Path, stamp: &str, compress: bool) -> OutputPaths {
    let snapshot_extension = if compress { "json.zst" } else { "json" };
    OutputPaths {
        sql: dir.join(format!("backup_{}.sql", stamp)),
        inserts: dir.join(format!("inserts_{}.sql", stamp)),
        snapshot: dir.join(format!("data_{}.{}", stamp, snapshot_extension)),
    }
}

/// Writes all outputs of a run, creating `dir` if needed.
///
/// # Errors
/// Returns error if the directory or a file cannot be written, or if
/// compression is requested without the `compression` feature
pub async fn write_outputs(
    dir: &Path,
    output: &HarvestOutput,
    compress: bool,
) -> Result<OutputPaths> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| HarvestError::Io {
            context: format!("Failed to create output directory {}", dir.display()),
            source: e,
        })?;

    let paths = output_paths(dir, &file_stamp(&output.generated_at), compress);

    write_file(&paths.sql, output.sql.as_bytes()).await?;
    write_file(&paths.inserts, output.inserts_sql.as_bytes()).await?;

    if compress {
        save_compressed(&output.snapshot, &paths.snapshot).await?;
    } else {
        write_file(&paths.snapshot, output.snapshot.as_bytes()).await?;
    }

    tracing::info!("Wrote outputs to {}", dir.display());
    Ok(paths)
}

async fn write_file(path: &Path, contents: &[u8]) -> Result<()> {
    tokio::fs::write(path, contents)
        .await
        .map_err(|e| HarvestError::Io {
            context: format!("Failed to write to {}", path.display()),
            source: e,
        })
}

/// Saves compressed JSON data.
#[cfg(feature = "compression")]
async fn save_compressed(json_data: &str, output_path: &Path) -> Result<()> {
    let compressed_data = zstd::encode_all(json_data.as_bytes(), 3).map_err(|e| HarvestError::Io {
        context: "Failed to compress snapshot".to_string(),
        source: e,
    })?;

    write_file(output_path, &compressed_data).await
}

#[cfg(not(feature = "compression"))]
async fn save_compressed(_json_data: &str, _output_path: &Path) -> Result<()> {
    Err(HarvestError::configuration(
        "Compression not available. Compile with --features compression",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_file_stamp_format() {
        let at = Utc.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap();
        assert_eq!(file_stamp(&at), "20240506_070809");
    }

    #[test]
    fn test_output_paths() {
        let paths = output_paths(Path::new("backups"), "20240506_070809", false);
        assert_eq!(paths.sql, PathBuf::from("backups/backup_20240506_070809.sql"));
        assert_eq!(
            paths.inserts,
            PathBuf::from("backups/inserts_20240506_070809.sql")
        );
        assert_eq!(
            paths.snapshot,
            PathBuf::from("backups/data_20240506_070809.json")
        );

        let compressed = output_paths(Path::new("backups"), "20240506_070809", true);
        assert_eq!(
            compressed.snapshot,
            PathBuf::from("backups/data_20240506_070809.json.zst")
        );
    }
}
