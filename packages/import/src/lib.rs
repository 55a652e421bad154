#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Bulk import orchestration for pre-partitioned trajectory data files.
//!
//! A run suspends the database's auxiliary indexing features, clears the
//! staging table, streams every data file into it through `psql`, restores
//! the features, and finally checks the row count. See [`pipeline`] for the
//! sequencing and [`toggle`] for the restore guarantee.
//!
//! All database access goes through a [`CommandRunner`], so the whole
//! pipeline runs unchanged against
//! [`FakeRunner`](traj_import_runner::fake::FakeRunner) in tests.

pub mod config;
pub mod discovery;
pub mod loader;
pub mod pipeline;
pub mod progress;
pub mod psql;
pub mod report;
pub mod toggle;

pub use traj_import_models as models;
pub use traj_import_runner::{CommandRunner, ProcessRunner, RunnerError};

use discovery::DiscoveryError;

/// Fatal conditions that abort an import run.
///
/// Every variant maps to process exit status 1. Per-file import failures
/// are not errors; they are recorded as
/// [`ImportStatus::Failed`](traj_import_models::ImportStatus::Failed).
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The disable script failed.
    #[error("Failed to disable auxiliary features: {0}")]
    Disable(#[source] RunnerError),

    /// The restore script failed.
    #[error("Failed to restore auxiliary features: {0}")]
    Restore(#[source] RunnerError),

    /// The staging table could not be cleared.
    #[error("Failed to clear staging table: {0}")]
    ClearTable(#[source] RunnerError),

    /// No importable files, or the data directory could not be read.
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    /// Something panicked while auxiliary features were suspended.
    #[error("Import phase panicked: {0}")]
    Panicked(String),
}
