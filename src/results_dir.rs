//! Results directory management for startup-bench
//!
//! Each run gets a structured output directory containing:
//! - the flat summary CSV and the per-task table
//! - console.log mirroring the narrated output
//! - a copy of the config file (when one was given)
//! - run metadata (JSON)
//!
//! Directory format: startup-{YYYYMMDD}-{HHMM}-{label}/

use anyhow::{Context, Result};
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Metadata about a benchmark run
#[derive(Debug, Serialize, Deserialize)]
pub struct RunMetadata {
    pub version: String,
    pub benchmark: String,
    pub config_path: Option<String>,
    pub start_time: String,
    pub end_time: Option<String>,
    pub duration_secs: Option<f64>,
    pub command_line: Vec<String>,
    pub hostname: String,
}

impl RunMetadata {
    pub fn new(benchmark: String, config_path: Option<String>) -> Self {
        let version = env!("CARGO_PKG_VERSION").to_string();
        let start_time = Local::now().to_rfc3339();
        let hostname = hostname::get()
            .unwrap_or_else(|_| "unknown".into())
            .to_string_lossy()
            .to_string();
        let command_line = std::env::args().collect();

        Self {
            version,
            benchmark,
            config_path,
            start_time,
            end_time: None,
            duration_secs: None,
            command_line,
            hostname,
        }
    }

    pub fn finalize(&mut self, duration_secs: f64) {
        self.end_time = Some(Local::now().to_rfc3339());
        self.duration_secs = Some(duration_secs);
    }
}

/// Results directory manager
pub struct ResultsDir {
    path: PathBuf,
    metadata: RunMetadata,
}

impl ResultsDir {
    /// Create a new results directory with the standard naming convention.
    ///
    /// # Arguments
    /// * `label` - benchmark label (e.g. "fargate-privateimage")
    /// * `base_dir` - optional base directory (defaults to current directory)
    /// * `config_path` - config file to copy into the directory, if one was used
    pub fn create(
        label: &str,
        base_dir: Option<&Path>,
        config_path: Option<&Path>,
    ) -> Result<Self> {
        let now = Local::now();
        let dir_name = format!("startup-{}-{}", now.format("%Y%m%d-%H%M"), label);

        let base = base_dir.unwrap_or_else(|| Path::new("."));
        let dir_path = base.join(&dir_name);

        fs::create_dir_all(&dir_path)
            .with_context(|| format!("Failed to create results directory: {}", dir_path.display()))?;

        if let Some(config) = config_path {
            let config_dest = dir_path.join("config.yaml");
            fs::copy(config, &config_dest)
                .with_context(|| "Failed to copy config to results directory".to_string())?;
        }

        let metadata = RunMetadata::new(
            label.to_string(),
            config_path.map(|p| p.to_string_lossy().to_string()),
        );

        Ok(Self {
            path: dir_path,
            metadata,
        })
    }

    /// Get the path to the results directory
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flat summary CSV (one row per measured round)
    pub fn summary_csv_path(&self) -> PathBuf {
        self.path.join("startup_times.csv")
    }

    /// Detailed per-task table
    pub fn task_table_path(&self) -> PathBuf {
        self.path.join("task_times.tsv")
    }

    /// Console log mirrored by the file tracing layer
    pub fn console_log_path(&self) -> PathBuf {
        self.path.join("console.log")
    }

    /// Base directory for rendered histogram images
    pub fn images_dir(&self) -> PathBuf {
        self.path.join("images")
    }

    /// Write metadata to metadata.json
    pub fn write_metadata(&self) -> Result<()> {
        let metadata_path = self.path.join("metadata.json");
        let json = serde_json::to_string_pretty(&self.metadata)
            .with_context(|| "Failed to serialize metadata")?;
        fs::write(&metadata_path, json)
            .with_context(|| "Failed to write metadata.json".to_string())?;
        Ok(())
    }

    /// Finalize the results directory (write final metadata)
    pub fn finalize(&mut self, duration_secs: f64) -> Result<()> {
        self.metadata.finalize(duration_secs);
        self.write_metadata()?;
        tracing::info!("results saved to {}", self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_results_dir_creation() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("bench.yaml");
        fs::write(&config_path, "# test config").unwrap();

        let results =
            ResultsDir::create("fargate-publicimage", Some(temp_dir.path()), Some(&config_path))
                .unwrap();

        assert!(results.path().exists());
        assert!(results.path().join("config.yaml").exists());
        assert!(results
            .path()
            .file_name()
            .unwrap()
            .to_string_lossy()
            .ends_with("fargate-publicimage"));
    }

    #[test]
    fn test_metadata_serialization() {
        let metadata = RunMetadata::new("ec2-privateimage".to_string(), None);
        let json = serde_json::to_string(&metadata).unwrap();
        assert!(json.contains("\"version\""));
        assert!(json.contains("\"benchmark\":\"ec2-privateimage\""));
    }
}
