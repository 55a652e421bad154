//! Per-file progress events emitted by the import loop.
//!
//! The loop reports what happens to each file; renderers decide how to show
//! it. The CLI drives an `indicatif` bar from these events, everything else
//! uses [`NullProgress`].

use std::sync::Arc;

use traj_import_models::ImportOutcome;

/// Receives import loop events. Every method defaults to a no-op.
pub trait ImportProgress: Send + Sync {
    /// The loop is about to import `total` files.
    fn batch_started(&self, _total: usize) {}

    /// File `position` (1-based) named `name` is being imported.
    fn file_started(&self, _position: usize, _name: &str) {}

    /// A file finished, successfully or not.
    fn file_finished(&self, _outcome: &ImportOutcome) {}

    /// Every file has been attempted; `succeeded` of `total` made it in.
    fn batch_finished(&self, _succeeded: usize, _total: usize) {}
}

/// Ignores every event.
pub struct NullProgress;

impl ImportProgress for NullProgress {}

#[must_use]
pub fn null_progress() -> Arc<dyn ImportProgress> {
    Arc::new(NullProgress)
}
