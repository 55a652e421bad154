#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Import configuration, outcome, and report types.
//!
//! Everything the bulk import pipeline reads or produces lives here so the
//! orchestration crate, the CLI, and the JSON run report share one
//! vocabulary. The configuration types deserialize from TOML with every
//! section optional; missing sections fall back to the defaults of the
//! original trajectory deployment.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum_macros::Display;

/// Wire format used when streaming rows into the target table.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum WireFormat {
    /// `PostgreSQL` text format (one row per line, delimiter-separated).
    #[default]
    Text,
    /// `PostgreSQL` CSV format.
    Csv,
}

/// Destination table and the shape of the rows streamed into it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportTarget {
    /// Staging table that receives the rows.
    pub table: String,
    /// Column list, in the order fields appear in each data file.
    pub columns: Vec<String>,
    /// Wire format of the data files.
    pub format: WireFormat,
    /// Field delimiter.
    pub delimiter: char,
    /// Token that represents SQL `NULL` in the data files.
    #[serde(rename = "null")]
    pub null_token: String,
}

impl Default for ImportTarget {
    fn default() -> Self {
        Self {
            table: "performance_wa".to_string(),
            columns: ["fid", "geom", "dtg", "taxi_id"]
                .into_iter()
                .map(String::from)
                .collect(),
            format: WireFormat::Text,
            delimiter: '|',
            null_token: String::new(),
        }
    }
}

/// How to reach the database command-line client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Container running the database. When set, `psql` is invoked through
    /// `docker exec -i <container>`; otherwise it runs locally.
    pub container: Option<String>,
    /// Database role.
    pub user: String,
    /// Database name.
    pub name: String,
    /// `psql` executable.
    pub psql: String,
    /// `docker` executable.
    pub docker: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            container: Some("my-postgis-container".to_string()),
            user: "postgres".to_string(),
            name: "postgres".to_string(),
            psql: "psql".to_string(),
            docker: "docker".to_string(),
        }
    }
}

/// Where the data files live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Directory holding the pre-partitioned data files.
    pub dir: PathBuf,
    /// File name suffix selecting importable files (e.g. `.tbl`).
    pub suffix: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("data/tbl"),
            suffix: ".tbl".to_string(),
        }
    }
}

/// Scripts that suspend and restore the database's auxiliary features.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    /// Interpreter used to run both scripts.
    pub shell: String,
    /// Script that disables auxiliary indexing features.
    pub disable_script: PathBuf,
    /// Script that restores auxiliary indexing features.
    pub restore_script: PathBuf,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            shell: "bash".to_string(),
            disable_script: PathBuf::from("bin/disable_geomesa_features.sh"),
            restore_script: PathBuf::from("bin/enable_geomesa_features.sh"),
        }
    }
}

/// Per-file timeout and retry settings for the import loop.
///
/// The defaults (no timeout, no retries) keep a hung file blocking the
/// pipeline until the client returns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Per-attempt timeout in seconds. `None` waits forever.
    pub timeout_secs: Option<u64>,
    /// Additional attempts after a failed import of a single file.
    pub max_retries: u32,
    /// Base backoff in seconds, doubled after every retry.
    pub retry_backoff_secs: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout_secs: None,
            max_retries: 0,
            retry_backoff_secs: 2,
        }
    }
}

impl RetryPolicy {
    /// Per-attempt timeout, if configured.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    /// Delay before retry number `retry` (1-based): base, 2×base, 4×base, ...
    #[must_use]
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 1u64 << retry.saturating_sub(1).min(16);
        Duration::from_secs(self.retry_backoff_secs.saturating_mul(factor))
    }
}

/// Final row-count verification settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifyConfig {
    /// Relation to count. Defaults to the target table when unset.
    pub relation: Option<String>,
    /// Number of rows every data file holds.
    pub rows_per_file: u64,
    /// Percentage of the expected row count that must be present.
    pub threshold_pct: u64,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            relation: Some("performance".to_string()),
            rows_per_file: 100_000,
            threshold_pct: 98,
        }
    }
}

/// Run log settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Directory that receives the dated run log file.
    pub dir: PathBuf,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("logs"),
        }
    }
}

/// Complete, immutable configuration for one import run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    /// Database client settings.
    pub database: DatabaseConfig,
    /// Destination table.
    pub target: ImportTarget,
    /// Data file location.
    pub source: SourceConfig,
    /// Feature toggle scripts.
    pub features: FeatureConfig,
    /// Per-file timeout and retry policy.
    pub import: RetryPolicy,
    /// Row-count verification.
    pub verify: VerifyConfig,
    /// Run log location.
    pub logging: LoggingConfig,
}

impl ImportConfig {
    /// Relation counted during verification.
    #[must_use]
    pub fn verify_relation(&self) -> &str {
        self.verify
            .relation
            .as_deref()
            .unwrap_or(&self.target.table)
    }
}

/// The ordered set of data files discovered for one run.
///
/// Always sorted lexicographically by file name so run logs are
/// reproducible.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FileBatch {
    files: Vec<PathBuf>,
}

impl FileBatch {
    /// Creates a batch, sorting `files` by file name.
    #[must_use]
    pub fn new(mut files: Vec<PathBuf>) -> Self {
        files.sort_by(|a, b| a.file_name().cmp(&b.file_name()).then_with(|| a.cmp(b)));
        Self { files }
    }

    /// Number of files in the batch.
    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Whether the batch holds no files.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Iterates the files in import order.
    pub fn iter(&self) -> impl Iterator<Item = &Path> {
        self.files.iter().map(PathBuf::as_path)
    }
}

/// Whether a single file made it into the table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ImportStatus {
    /// The client exited zero.
    Succeeded,
    /// The client exited non-zero, could not be spawned, or timed out.
    Failed {
        /// Captured stderr or runner error.
        error: String,
    },
}

/// The recorded result of importing one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportOutcome {
    /// The data file.
    pub file: PathBuf,
    /// 1-based position within the batch.
    pub position: usize,
    /// Wall-clock time of the final transfer attempt.
    pub duration: Duration,
    /// Success or failure.
    #[serde(flatten)]
    pub status: ImportStatus,
    /// Number of transfer attempts made.
    pub attempts: u32,
}

impl ImportOutcome {
    /// Whether the file was imported.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.status, ImportStatus::Succeeded)
    }

    /// The file name without its directory, for log lines.
    #[must_use]
    pub fn file_name(&self) -> String {
        self.file.file_name().map_or_else(
            || self.file.display().to_string(),
            |name| name.to_string_lossy().into_owned(),
        )
    }
}

/// Aggregate over all outcomes of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Files imported successfully.
    pub succeeded: usize,
    /// Files that failed.
    pub failed: usize,
    /// Files attempted.
    pub total: usize,
    /// Summed import time of successful files only.
    pub total_import_duration: Duration,
    /// Estimated rows imported (`succeeded × rows_per_file`).
    pub rows_imported: u64,
    /// Rows per second over `total_import_duration`, 0 when it is zero.
    pub throughput: u64,
    /// Mean import time of a successful file, in seconds.
    pub avg_file_secs: Option<f64>,
    /// Mean import time per row, in milliseconds.
    pub avg_ms_per_row: Option<f64>,
}

/// Result class of the final row-count check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerificationStatus {
    /// Observed count reached the expected minimum.
    Passed,
    /// Observed count fell short of the expected minimum.
    Failed,
    /// The count query failed or returned something unparseable.
    Indeterminate,
}

/// Outcome of the final row-count check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationResult {
    /// Relation that was counted.
    pub relation: String,
    /// Minimum number of rows expected.
    pub expected_min: u64,
    /// Number of rows observed, if the query produced one.
    pub observed: Option<u64>,
    /// Pass, fail, or indeterminate.
    pub status: VerificationStatus,
}

/// Everything a completed run produced, as written to the JSON report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    /// Per-file outcomes in batch order.
    pub outcomes: Vec<ImportOutcome>,
    /// Aggregate counts and timings.
    pub summary: RunSummary,
    /// Final row-count check.
    pub verification: VerificationResult,
    /// Wall-clock time of the whole run.
    pub elapsed: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_deployment() {
        let config = ImportConfig::default();
        assert_eq!(config.target.table, "performance_wa");
        assert_eq!(config.target.columns, ["fid", "geom", "dtg", "taxi_id"]);
        assert_eq!(config.target.delimiter, '|');
        assert!(config.target.null_token.is_empty());
        assert_eq!(config.source.suffix, ".tbl");
        assert_eq!(config.verify.rows_per_file, 100_000);
        assert_eq!(config.verify.threshold_pct, 98);
        assert_eq!(config.import.max_retries, 0);
        assert!(config.import.timeout().is_none());
    }

    #[test]
    fn parses_partial_toml() {
        let toml_str = r#"
            [target]
            table = "trips"
            delimiter = ","
            format = "csv"

            [database]
            container = "pg"

            [import]
            timeout_secs = 30
        "#;
        let config: ImportConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.target.table, "trips");
        assert_eq!(config.target.delimiter, ',');
        assert_eq!(config.target.format, WireFormat::Csv);
        assert_eq!(config.target.columns.len(), 4);
        assert_eq!(config.database.container.as_deref(), Some("pg"));
        assert_eq!(config.database.user, "postgres");
        assert_eq!(config.import.timeout(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn verify_relation_falls_back_to_target_table() {
        let mut config = ImportConfig::default();
        assert_eq!(config.verify_relation(), "performance");
        config.verify.relation = None;
        assert_eq!(config.verify_relation(), "performance_wa");
    }

    #[test]
    fn backoff_doubles() {
        let policy = RetryPolicy {
            retry_backoff_secs: 2,
            ..RetryPolicy::default()
        };
        assert_eq!(policy.backoff(1), Duration::from_secs(2));
        assert_eq!(policy.backoff(2), Duration::from_secs(4));
        assert_eq!(policy.backoff(3), Duration::from_secs(8));
    }

    #[test]
    fn batch_sorts_by_file_name() {
        let batch = FileBatch::new(vec![
            PathBuf::from("/d/b.tbl"),
            PathBuf::from("/d/a.tbl"),
            PathBuf::from("/d/c.tbl"),
        ]);
        let names: Vec<_> = batch
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap())
            .collect();
        assert_eq!(names, ["a.tbl", "b.tbl", "c.tbl"]);
    }

    #[test]
    fn outcome_serializes_flat_status() {
        let outcome = ImportOutcome {
            file: PathBuf::from("/d/a.tbl"),
            position: 1,
            duration: Duration::from_millis(5),
            status: ImportStatus::Failed {
                error: "boom".to_string(),
            },
            attempts: 1,
        };
        assert_eq!(outcome.file_name(), "a.tbl");
        assert!(!outcome.is_success());
        let value = serde_json::to_value(&outcome).unwrap();
        assert_eq!(value["status"], "FAILED");
        assert_eq!(value["error"], "boom");
        assert_eq!(value["position"], 1);
    }
}
