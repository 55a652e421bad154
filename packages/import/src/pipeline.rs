//! The six-phase bulk import pipeline.
//!
//! ```text
//! Start -> FeaturesDisabled -> TableCleared -> FilesDiscovered -> Importing
//!       -> FeaturesRestored -> Verified -> Done
//! ```
//!
//! Clearing, discovery, and the import loop run inside
//! [`FeatureToggle::while_suspended`], so the features are restored exactly
//! once no matter how that section ends. An empty batch skips `Importing`
//! and ends the run with [`PipelineError::Discovery`] after restoring.
//! Reaching `Done` means success even when individual files failed.

use std::sync::Arc;

use strum_macros::Display;
use tokio::time::Instant;
use traj_import_models::{ImportConfig, ImportOutcome, RunReport};
use traj_import_runner::CommandRunner;

use crate::PipelineError;
use crate::discovery;
use crate::loader::ImportLoop;
use crate::progress::{ImportProgress, null_progress};
use crate::psql::PsqlClient;
use crate::report;
use crate::toggle::FeatureToggle;

/// States of a run, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Phase {
    #[strum(to_string = "Start")]
    Start,
    #[strum(to_string = "Auxiliary features disabled")]
    FeaturesDisabled,
    #[strum(to_string = "Staging table cleared")]
    TableCleared,
    #[strum(to_string = "Data files discovered")]
    FilesDiscovered,
    #[strum(to_string = "Importing files")]
    Importing,
    #[strum(to_string = "Auxiliary features restored")]
    FeaturesRestored,
    #[strum(to_string = "Row count verified")]
    Verified,
    #[strum(to_string = "Done")]
    Done,
}

fn enter(phase: Phase) {
    log::info!(">>> {phase}");
}

/// Sequences one import run against a single database.
pub struct Pipeline<'a> {
    config: &'a ImportConfig,
    runner: &'a dyn CommandRunner,
    progress: Arc<dyn ImportProgress>,
}

impl<'a> Pipeline<'a> {
    #[must_use]
    pub fn new(config: &'a ImportConfig, runner: &'a dyn CommandRunner) -> Self {
        Self {
            config,
            runner,
            progress: null_progress(),
        }
    }

    /// Reports per-file progress to `progress`.
    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ImportProgress>) -> Self {
        self.progress = progress;
        self
    }

    /// Runs the whole pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] for any fatal condition. Auxiliary
    /// features have been restored (or restoring them has been attempted
    /// once) by the time an error is returned.
    pub async fn run(&self) -> Result<RunReport, PipelineError> {
        let start = Instant::now();
        let client = PsqlClient::new(&self.config.database);
        let toggle = FeatureToggle::new(self.runner, &self.config.features);

        log::info!("==================================================");
        log::info!(
            "Starting bulk import of '{}' into '{}'",
            self.config.source.dir.display(),
            self.config.target.table
        );
        log::info!("==================================================");
        enter(Phase::Start);

        let outcomes = toggle.while_suspended(self.import_phase(client)).await?;
        enter(Phase::FeaturesRestored);

        let verify = &self.config.verify;
        let summary = report::summarize(&outcomes, verify.rows_per_file);
        report::log_summary(&summary, start.elapsed());

        let verification = report::verify(
            self.runner,
            client,
            self.config.verify_relation(),
            summary.succeeded as u64,
            verify.rows_per_file,
            verify.threshold_pct,
        )
        .await;
        report::log_verification(&verification);
        enter(Phase::Verified);

        let elapsed = start.elapsed();
        enter(Phase::Done);

        Ok(RunReport {
            outcomes,
            summary,
            verification,
            elapsed,
        })
    }

    /// Clears the staging table, discovers the batch, and imports it. Runs
    /// only while auxiliary features are disabled.
    async fn import_phase(
        &self,
        client: PsqlClient<'_>,
    ) -> Result<Vec<ImportOutcome>, PipelineError> {
        enter(Phase::FeaturesDisabled);

        let target = &self.config.target;
        log::info!("Clearing staging table '{}'...", target.table);
        self.runner
            .execute(&client.clear_table(&target.table), false)
            .await
            .map_err(PipelineError::ClearTable)?;
        enter(Phase::TableCleared);

        let source = &self.config.source;
        let batch = discovery::list(&source.dir, &source.suffix)?;
        log::info!("Found {} file(s) to import.", batch.len());
        enter(Phase::FilesDiscovered);

        enter(Phase::Importing);
        let outcomes = ImportLoop::new(self.runner, client, target, &self.config.import)
            .with_progress(self.progress.clone())
            .run(&batch)
            .await;
        log::info!("All file imports attempted.");

        Ok(outcomes)
    }
}
