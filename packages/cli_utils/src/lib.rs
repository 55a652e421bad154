#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Shared CLI utilities for the trajectory import toolchain.
//!
//! Provides an `indicatif`-backed progress bar behind the
//! [`ImportProgress`] trait, plus [`init_logger`] which sets up
//! `indicatif-log-bridge` so that `log::info!` and friends are suspended
//! while the progress bar redraws. Every enabled record is also appended to
//! a dated run log file.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{LineWriter, Write as _};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use indicatif::{ProgressBar, ProgressStyle};
use log::{Log, Metadata, Record};
use traj_import::models::ImportOutcome;
use traj_import::progress::ImportProgress;

pub use indicatif::MultiProgress;

/// An `indicatif` [`ProgressBar`] that follows the import loop.
pub struct IndicatifProgress {
    bar: ProgressBar,
}

impl IndicatifProgress {
    /// Creates a progress bar for step-level progress (e.g., files 3/120).
    /// The length is updated once the batch starts.
    #[must_use]
    pub fn steps_bar(
        multi: &MultiProgress,
        message: &str,
        total: u64,
    ) -> Arc<dyn ImportProgress> {
        let bar = multi.add(ProgressBar::new(total));
        bar.set_style(
            ProgressStyle::with_template(
                "{msg} {wide_bar:.green/dim} {pos}/{len} [{elapsed_precise}]",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("##-"),
        );
        bar.set_message(message.to_string());

        Arc::new(Self { bar })
    }
}

impl ImportProgress for IndicatifProgress {
    fn batch_started(&self, total: usize) {
        self.bar.set_length(total as u64);
        self.bar.set_position(0);
    }

    fn file_started(&self, _position: usize, name: &str) {
        self.bar.set_message(name.to_string());
    }

    fn file_finished(&self, _outcome: &ImportOutcome) {
        self.bar.inc(1);
    }

    fn batch_finished(&self, succeeded: usize, total: usize) {
        self.bar
            .finish_with_message(format!("{succeeded}/{total} files imported"));
    }
}

/// Path of the run log for `date` (formatted `YYYYMMDD`) inside `dir`.
#[must_use]
pub fn log_file_path(dir: &Path, date: &str) -> PathBuf {
    dir.join(format!("import_log_{date}.log"))
}

/// One run log line: `YYYY-MM-DD HH:MM:SS - LEVEL - message`.
fn format_line(timestamp: &str, level: log::Level, message: impl fmt::Display) -> String {
    format!("{timestamp} - {level} - {message}")
}

/// Forwards every record to `inner` and appends the enabled ones to a file.
struct FileTee<L> {
    inner: L,
    file: Mutex<LineWriter<File>>,
}

impl<L: Log> Log for FileTee<L> {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        self.inner.enabled(metadata)
    }

    fn log(&self, record: &Record<'_>) {
        if !self.inner.enabled(record.metadata()) {
            return;
        }
        self.inner.log(record);

        let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
        let line = format_line(&timestamp, record.level(), record.args());
        let mut file = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        // A failed write to the run log must not take the import down.
        let _ = writeln!(file, "{line}");
    }

    fn flush(&self) {
        self.inner.flush();
        let _ = self
            .file
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .flush();
    }
}

/// Initializes the global logger: `pretty_env_logger` on the console
/// (default level `info`, overridable via `RUST_LOG`), teed into
/// `<log_dir>/import_log_<YYYYMMDD>.log`, all wrapped in
/// `indicatif-log-bridge`.
///
/// Returns the [`MultiProgress`] that all progress bars must be added to,
/// and the path of the run log file.
///
/// # Errors
///
/// Returns an I/O error if the log directory cannot be created or the log
/// file cannot be opened.
pub fn init_logger(log_dir: &Path) -> std::io::Result<(MultiProgress, PathBuf)> {
    std::fs::create_dir_all(log_dir)?;
    let path = log_file_path(log_dir, &chrono::Local::now().format("%Y%m%d").to_string());
    let file = OpenOptions::new().create(true).append(true).open(&path)?;

    let multi = MultiProgress::new();

    // Build the pretty-env-logger logger manually so we can wrap it.
    let logger = pretty_env_logger::formatted_builder()
        .filter_level(log::LevelFilter::Info)
        .parse_env("RUST_LOG")
        .build();
    let level = logger.filter();

    let tee = FileTee {
        inner: logger,
        file: Mutex::new(LineWriter::new(file)),
    };

    indicatif_log_bridge::LogWrapper::new(multi.clone(), tee)
        .try_init()
        .ok(); // Ignore error if logger was already set (e.g., in tests)

    log::set_max_level(level);

    Ok((multi, path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_file_is_dated() {
        assert_eq!(
            log_file_path(Path::new("logs"), "20240315"),
            Path::new("logs/import_log_20240315.log")
        );
    }

    #[test]
    fn formats_run_log_line() {
        assert_eq!(
            format_line("2024-03-15 08:00:01", log::Level::Warn, "file 2/3 failed"),
            "2024-03-15 08:00:01 - WARN - file 2/3 failed"
        );
    }

    #[test]
    fn init_creates_log_directory_and_file() {
        let tmp = std::env::temp_dir().join("traj_import_cli_utils_logger_test");
        let _ = std::fs::remove_dir_all(&tmp);

        let (_multi, path) = init_logger(&tmp.join("logs")).unwrap();
        assert!(path.exists());
        assert!(path.starts_with(tmp.join("logs")));

        let _ = std::fs::remove_dir_all(&tmp);
    }
}
