//! The per-file import loop.
//!
//! Streams each file of a [`FileBatch`] into the target table, one at a
//! time and in batch order. A failing file never stops the loop: its
//! failure is captured as [`ImportStatus::Failed`] and the next file is
//! attempted, so a run imports as many files as it can and leaves failure
//! analysis to the report.

use std::path::Path;
use std::sync::Arc;

use tokio::time::Instant;
use traj_import_models::{FileBatch, ImportOutcome, ImportStatus, ImportTarget, RetryPolicy};
use traj_import_runner::{CommandOutput, CommandRunner};

use crate::progress::{ImportProgress, null_progress};
use crate::psql::PsqlClient;

/// Drives the import of one batch.
pub struct ImportLoop<'a> {
    runner: &'a dyn CommandRunner,
    client: PsqlClient<'a>,
    target: &'a ImportTarget,
    policy: &'a RetryPolicy,
    progress: Arc<dyn ImportProgress>,
}

impl<'a> ImportLoop<'a> {
    #[must_use]
    pub fn new(
        runner: &'a dyn CommandRunner,
        client: PsqlClient<'a>,
        target: &'a ImportTarget,
        policy: &'a RetryPolicy,
    ) -> Self {
        Self {
            runner,
            client,
            target,
            policy,
            progress: null_progress(),
        }
    }

    /// Reports per-file progress to `progress`.
    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ImportProgress>) -> Self {
        self.progress = progress;
        self
    }

    /// Imports every file of `batch`, returning one outcome per file in
    /// batch order.
    pub async fn run(&self, batch: &FileBatch) -> Vec<ImportOutcome> {
        let total = batch.len();
        self.progress.batch_started(total);

        let mut outcomes = Vec::with_capacity(total);
        let mut succeeded = 0usize;

        for (index, file) in batch.iter().enumerate() {
            let position = index + 1;
            let name = display_name(file);
            log::info!("  -> Importing file {position}/{total}: {name} ...");
            self.progress.file_started(position, &name);

            let outcome = self.import_file(file, position).await;

            match &outcome.status {
                ImportStatus::Succeeded => {
                    succeeded += 1;
                    log::info!(
                        "  -> Imported file {position}/{total}: {name} ... ok ({:.3}s)",
                        outcome.duration.as_secs_f64()
                    );
                }
                ImportStatus::Failed { error } => {
                    log::error!("  -> Import of file {position}/{total}: {name} ... FAILED");
                    log::error!("     error: {}", error.trim());
                }
            }

            self.progress.file_finished(&outcome);
            outcomes.push(outcome);
        }

        self.progress.batch_finished(succeeded, total);

        outcomes
    }

    /// Imports one file, retrying according to the policy. The recorded
    /// duration covers only the final attempt's transfer.
    async fn import_file(&self, file: &Path, position: usize) -> ImportOutcome {
        let command = self
            .client
            .copy_from_file(self.target, file)
            .timeout(self.policy.timeout());

        let mut attempts = 0u32;
        loop {
            attempts += 1;

            let start = Instant::now();
            let result = self.runner.execute(&command, true).await;
            let duration = start.elapsed();

            let status = match result {
                Ok(output) if output.success() => ImportStatus::Succeeded,
                Ok(output) => ImportStatus::Failed {
                    error: failure_detail(&output),
                },
                Err(e) => ImportStatus::Failed {
                    error: e.to_string(),
                },
            };

            if let ImportStatus::Failed { error } = &status {
                if attempts <= self.policy.max_retries {
                    let delay = self.policy.backoff(attempts);
                    log::warn!(
                        "     {} failed ({}), retry {attempts}/{} in {delay:?}...",
                        display_name(file),
                        error.trim(),
                        self.policy.max_retries,
                    );
                    tokio::time::sleep(delay).await;
                    continue;
                }
            }

            return ImportOutcome {
                file: file.to_path_buf(),
                position,
                duration,
                status,
                attempts,
            };
        }
    }
}

fn display_name(file: &Path) -> String {
    file.file_name().map_or_else(
        || file.display().to_string(),
        |name| name.to_string_lossy().into_owned(),
    )
}

fn failure_detail(output: &CommandOutput) -> String {
    let stderr = output.stderr.trim();
    if !stderr.is_empty() {
        return stderr.to_string();
    }
    output.exit_code.map_or_else(
        || "terminated by signal".to_string(),
        |code| format!("exited with status {code}"),
    )
}
