//! End-of-run summary and row-count verification.
//!
//! [`summarize`] is a pure function of the outcome sequence. [`verify`]
//! issues one count query; its failure is downgraded to
//! [`VerificationStatus::Indeterminate`] because the check is advisory.

use std::path::Path;
use std::time::Duration;

use traj_import_models::{
    ImportOutcome, RunReport, RunSummary, VerificationResult, VerificationStatus,
};
use traj_import_runner::CommandRunner;

use crate::psql::{PsqlClient, parse_count};

const RULE_WIDE: &str = "==================================================";
const RULE_THIN: &str = "--------------------------------------------------";

/// Errors from writing the JSON run report.
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    /// The report could not be serialized.
    #[error("Failed to serialize run report: {0}")]
    Json(#[from] serde_json::Error),

    /// The report file could not be written.
    #[error("Failed to write run report {path}: {source}")]
    Io {
        /// Destination path.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

/// Aggregates per-file outcomes.
///
/// Only successful files contribute to `total_import_duration`; failed
/// files can return almost instantly and would inflate throughput.
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn summarize(outcomes: &[ImportOutcome], rows_per_file: u64) -> RunSummary {
    let succeeded = outcomes.iter().filter(|o| o.is_success()).count();
    let total = outcomes.len();
    let total_import_duration: Duration = outcomes
        .iter()
        .filter(|o| o.is_success())
        .map(|o| o.duration)
        .sum();
    let rows_imported = (succeeded as u64).saturating_mul(rows_per_file);
    let secs = total_import_duration.as_secs_f64();

    let throughput = if secs > 0.0 {
        (rows_imported as f64 / secs) as u64
    } else {
        0
    };

    let avg_file_secs = (succeeded > 0).then(|| secs / succeeded as f64);
    let avg_ms_per_row = (rows_imported > 0).then(|| {
        if secs > 0.0 {
            secs * 1000.0 / rows_imported as f64
        } else {
            0.0
        }
    });

    RunSummary {
        succeeded,
        failed: total - succeeded,
        total,
        total_import_duration,
        rows_imported,
        throughput,
        avg_file_secs,
        avg_ms_per_row,
    }
}

/// Minimum row count expected after importing `succeeded` files:
/// `floor(succeeded × rows_per_file × threshold_pct / 100)`.
#[must_use]
pub fn expected_minimum(succeeded: u64, rows_per_file: u64, threshold_pct: u64) -> u64 {
    u128::from(succeeded)
        .checked_mul(u128::from(rows_per_file))
        .and_then(|rows| rows.checked_mul(u128::from(threshold_pct)))
        .and_then(|scaled| u64::try_from(scaled / 100).ok())
        .unwrap_or(u64::MAX)
}

/// Classifies an observed count against the expected minimum.
#[must_use]
pub const fn classify(expected_min: u64, observed: Option<u64>) -> VerificationStatus {
    match observed {
        Some(count) if count >= expected_min => VerificationStatus::Passed,
        Some(_) => VerificationStatus::Failed,
        None => VerificationStatus::Indeterminate,
    }
}

/// Counts the rows of `relation` and compares them with the expected
/// minimum.
///
/// A failing or unparseable count query yields
/// [`VerificationStatus::Indeterminate`] rather than an error.
pub async fn verify(
    runner: &dyn CommandRunner,
    client: PsqlClient<'_>,
    relation: &str,
    succeeded: u64,
    rows_per_file: u64,
    threshold_pct: u64,
) -> VerificationResult {
    let expected_min = expected_minimum(succeeded, rows_per_file, threshold_pct);

    let observed = match runner.execute(&client.count_rows(relation), true).await {
        Ok(output) if output.success() => {
            let count = parse_count(&output.stdout);
            if count.is_none() {
                log::warn!("Unparseable row count output: {:?}", output.stdout.trim());
            }
            count
        }
        Ok(output) => {
            log::warn!("Row count query failed: {}", output.stderr.trim());
            None
        }
        Err(e) => {
            log::warn!("Row count query failed: {e}");
            None
        }
    };

    VerificationResult {
        relation: relation.to_string(),
        expected_min,
        observed,
        status: classify(expected_min, observed),
    }
}

/// Logs the performance report for a finished run.
pub fn log_summary(summary: &RunSummary, elapsed: Duration) {
    log::info!("{RULE_WIDE}");
    log::info!(" Bulk import complete - performance report");
    log::info!("{RULE_WIDE}");
    log::info!("Total run time: {:.3} s", elapsed.as_secs_f64());
    log::info!("{RULE_THIN}");
    log::info!("File statistics:");
    log::info!("  - Imported successfully: {}", summary.succeeded);
    log::info!("  - Failed: {}", summary.failed);
    log::info!("  - Total files: {}", summary.total);
    log::info!("{RULE_THIN}");

    if let Some(avg_file_secs) = summary.avg_file_secs {
        log::info!("Performance (import commands only):");
        log::info!(
            "  - Pure import time: {:.3} s",
            summary.total_import_duration.as_secs_f64()
        );
        log::info!("  - Rows imported (estimated): {}", summary.rows_imported);
        log::info!("  - Average time per file: {avg_file_secs:.3} s");
        log::info!(
            "  - Average time per row: {:.3} ms",
            summary.avg_ms_per_row.unwrap_or_default()
        );
        log::info!("  - Throughput: {} rows/s", summary.throughput);
        log::info!("{RULE_THIN}");
    }
}

/// Logs the verification result.
pub fn log_verification(result: &VerificationResult) {
    log::info!("Final row count verification...");
    match result.status {
        VerificationStatus::Passed => {
            log::info!(
                "  -> '{}' holds {} rows (expected at least {})",
                result.relation,
                result.observed.unwrap_or_default(),
                result.expected_min,
            );
            log::info!("  -> [OK] Row count meets expectations.");
        }
        VerificationStatus::Failed => {
            log::info!(
                "  -> '{}' holds {} rows (expected at least {})",
                result.relation,
                result.observed.unwrap_or_default(),
                result.expected_min,
            );
            log::warn!(
                "  -> [WARNING] Row count does not match the number of imported files; check partition maintenance."
            );
        }
        VerificationStatus::Indeterminate => {
            log::warn!("  -> [WARNING] Could not determine the final row count.");
        }
    }
    log::info!("{RULE_WIDE}");
}

/// Writes `report` to `path` as pretty-printed JSON.
///
/// # Errors
///
/// Returns [`ReportError`] if serialization or the write fails.
pub fn write_json(report: &RunReport, path: &Path) -> Result<(), ReportError> {
    let json = serde_json::to_string_pretty(report)?;
    std::fs::write(path, json).map_err(|e| ReportError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    log::info!("Run report written to {}", path.display());
    Ok(())
}
