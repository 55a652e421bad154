#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for the trajectory bulk import pipeline.
//!
//! Exit status is 0 when the run reaches the end (even if some files
//! failed to import) and 1 on any fatal condition.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use traj_import::config::{self, ConfigError};
use traj_import::models::{ImportConfig, RunReport};
use traj_import::pipeline::Pipeline;
use traj_import::{PipelineError, ProcessRunner, discovery, report};
use traj_import_cli_utils::IndicatifProgress;

#[derive(Parser)]
#[command(
    name = "traj_import",
    about = "Bulk import of pre-partitioned trajectory data files into PostGIS"
)]
struct Cli {
    /// TOML config file. Built-in defaults are used when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding the data files
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// File name suffix of importable files (e.g. ".tbl")
    #[arg(long, global = true)]
    suffix: Option<String>,

    /// Staging table to clear and import into
    #[arg(long, global = true)]
    table: Option<String>,

    /// Container running the database
    #[arg(long, global = true, conflicts_with = "local")]
    container: Option<String>,

    /// Run `psql` locally instead of inside a container
    #[arg(long, global = true)]
    local: bool,

    /// Directory for the dated run log
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    /// Per-file import timeout in seconds (default: no timeout)
    #[arg(long, global = true)]
    timeout_secs: Option<u64>,

    /// Retries per failed file (default: 0)
    #[arg(long, global = true)]
    max_retries: Option<u32>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full import pipeline (default)
    Run {
        /// Also write the run report as JSON to this path
        #[arg(long)]
        report_json: Option<PathBuf>,
    },
    /// List the data files that would be imported, in import order
    List,
}

/// Loads the config file (if any) and applies command-line overrides.
fn build_config(cli: &Cli) -> Result<ImportConfig, ConfigError> {
    let mut config = match &cli.config {
        Some(path) => config::load(path)?,
        None => ImportConfig::default(),
    };

    if let Some(dir) = &cli.data_dir {
        config.source.dir.clone_from(dir);
    }
    if let Some(suffix) = &cli.suffix {
        config.source.suffix.clone_from(suffix);
    }
    if let Some(table) = &cli.table {
        config.target.table.clone_from(table);
    }
    if cli.local {
        config.database.container = None;
    } else if let Some(container) = &cli.container {
        config.database.container = Some(container.clone());
    }
    if let Some(dir) = &cli.log_dir {
        config.logging.dir.clone_from(dir);
    }
    if cli.timeout_secs.is_some() {
        config.import.timeout_secs = cli.timeout_secs;
    }
    if let Some(retries) = cli.max_retries {
        config.import.max_retries = retries;
    }

    config::validate(&config)?;
    Ok(config)
}

fn list(config: &ImportConfig) -> ExitCode {
    match discovery::list(&config.source.dir, &config.source.suffix) {
        Ok(batch) => {
            for (index, file) in batch.iter().enumerate() {
                println!("{:>6}  {}", index + 1, file.display());
            }
            println!("{} file(s)", batch.len());
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: &ImportConfig, report_json: Option<&Path>) -> ExitCode {
    let (multi, log_path) = match traj_import_cli_utils::init_logger(&config.logging.dir) {
        Ok(logger) => logger,
        Err(e) => {
            eprintln!(
                "Failed to open run log in {}: {e}",
                config.logging.dir.display()
            );
            return ExitCode::FAILURE;
        }
    };
    log::info!("Run log: {}", log_path.display());

    let progress = IndicatifProgress::steps_bar(&multi, "Importing", 0);
    let runner = ProcessRunner;

    let result = Pipeline::new(config, &runner)
        .with_progress(progress)
        .run()
        .await;
    finish(result, report_json)
}

/// Maps the run result to the process exit status, writing the JSON report
/// for completed runs. A report that cannot be written only warns.
fn finish(result: Result<RunReport, PipelineError>, report_json: Option<&Path>) -> ExitCode {
    match result {
        Ok(run_report) => {
            if let Some(path) = report_json {
                if let Err(e) = report::write_json(&run_report, path) {
                    log::warn!("{e}");
                }
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!("Import aborted: {e}");
            ExitCode::FAILURE
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match build_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    match cli.command {
        Some(Commands::List) => list(&config),
        Some(Commands::Run { report_json }) => run(&config, report_json.as_deref()).await,
        None => run(&config, None).await,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use traj_import::models::{VerificationResult, VerificationStatus};

    use super::*;

    #[test]
    fn defaults_without_flags() {
        let cli = Cli::try_parse_from(["traj_import"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(build_config(&cli).unwrap(), ImportConfig::default());
    }

    #[test]
    fn flags_override_defaults() {
        let cli = Cli::try_parse_from([
            "traj_import",
            "run",
            "--data-dir",
            "/data/beijing_tbl_100k",
            "--table",
            "trips_wa",
            "--local",
            "--timeout-secs",
            "600",
            "--max-retries",
            "2",
            "--report-json",
            "report.json",
        ])
        .unwrap();

        let config = build_config(&cli).unwrap();
        assert_eq!(config.source.dir, Path::new("/data/beijing_tbl_100k"));
        assert_eq!(config.target.table, "trips_wa");
        assert_eq!(config.database.container, None);
        assert_eq!(config.import.timeout_secs, Some(600));
        assert_eq!(config.import.max_retries, 2);
        assert!(matches!(
            cli.command,
            Some(Commands::Run { report_json: Some(_) })
        ));
    }

    #[test]
    fn container_and_local_conflict() {
        assert!(Cli::try_parse_from(["traj_import", "--local", "--container", "pg"]).is_err());
    }

    fn completed_report() -> RunReport {
        RunReport {
            outcomes: Vec::new(),
            summary: report::summarize(&[], 100_000),
            verification: VerificationResult {
                relation: "performance".to_string(),
                expected_min: 0,
                observed: Some(0),
                status: VerificationStatus::Passed,
            },
            elapsed: Duration::from_secs(3),
        }
    }

    #[test]
    fn completed_run_exits_zero() {
        assert_eq!(finish(Ok(completed_report()), None), ExitCode::SUCCESS);
    }

    #[test]
    fn fatal_error_exits_one() {
        let err = PipelineError::Panicked("lost connection".to_string());
        assert_eq!(finish(Err(err), None), ExitCode::FAILURE);
    }

    #[test]
    fn completed_run_writes_json_report() {
        let tmp = std::env::temp_dir().join("traj_import_cli_report_test");
        let _ = std::fs::remove_dir_all(&tmp);
        std::fs::create_dir_all(&tmp).unwrap();
        let path = tmp.join("report.json");

        assert_eq!(
            finish(Ok(completed_report()), Some(&path)),
            ExitCode::SUCCESS
        );
        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["verification"]["status"], "PASSED");

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn unwritable_json_report_still_exits_zero() {
        let path = Path::new("/nonexistent/traj_import/report.json");
        assert_eq!(
            finish(Ok(completed_report()), Some(path)),
            ExitCode::SUCCESS
        );
    }

    #[test]
    fn invalid_override_is_rejected() {
        let cli = Cli::try_parse_from(["traj_import", "--timeout-secs", "0"]).unwrap();
        assert!(matches!(
            build_config(&cli),
            Err(ConfigError::Invalid { .. })
        ));
    }
}
