//! Suspension and restoration of the database's auxiliary features.
//!
//! Disabling the features is the acquisition and restoring them is the
//! release of the only critical section in a run.
//! [`FeatureToggle::while_suspended`] pairs the two so that restore runs
//! exactly once on every path out of the import phase: success, error,
//! panic, and a failed disable.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures::FutureExt as _;
use traj_import_models::FeatureConfig;
use traj_import_runner::{CommandRunner, CommandSpec, RunnerError};

use crate::PipelineError;

/// Runs the disable/restore scripts.
pub struct FeatureToggle<'a> {
    runner: &'a dyn CommandRunner,
    disable: CommandSpec,
    restore: CommandSpec,
}

impl<'a> FeatureToggle<'a> {
    #[must_use]
    pub fn new(runner: &'a dyn CommandRunner, features: &FeatureConfig) -> Self {
        let script = |path: &std::path::Path| {
            CommandSpec::new(&features.shell).arg(path.display().to_string())
        };
        Self {
            runner,
            disable: script(&features.disable_script),
            restore: script(&features.restore_script),
        }
    }

    /// Runs the disable script.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError`] if the script cannot run or exits non-zero.
    pub async fn disable(&self) -> Result<(), RunnerError> {
        log::info!("Disabling auxiliary features: {}", self.disable);
        self.runner.execute(&self.disable, false).await?;
        Ok(())
    }

    /// Runs the restore script.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError`] if the script cannot run or exits non-zero.
    pub async fn restore(&self) -> Result<(), RunnerError> {
        log::info!("Restoring auxiliary features: {}", self.restore);
        self.runner.execute(&self.restore, false).await?;
        Ok(())
    }

    /// Disables the features, drives `body` to completion, and restores the
    /// features.
    ///
    /// Restore is attempted exactly once whatever happens: after a failed
    /// or panicking disable, after `body` returns `Ok` or `Err`, and after
    /// `body` panics. When both `body` and restore fail, the body's error
    /// is returned and the restore failure is logged.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Disable`], the body's own error,
    /// [`PipelineError::Panicked`], or [`PipelineError::Restore`].
    pub async fn while_suspended<F, T>(&self, body: F) -> Result<T, PipelineError>
    where
        F: Future<Output = Result<T, PipelineError>>,
    {
        let disabled = match AssertUnwindSafe(self.disable()).catch_unwind().await {
            Ok(result) => result.map_err(PipelineError::Disable),
            Err(payload) => Err(PipelineError::Panicked(panic_message(payload.as_ref()))),
        };
        if let Err(e) = disabled {
            log::error!("Failed to disable auxiliary features: {e}");
            if let Err(restore_err) = self.restore().await {
                log::error!("Restore after failed disable also failed: {restore_err}");
            }
            return Err(e);
        }

        let body = AssertUnwindSafe(body)
            .catch_unwind()
            .await
            .map_err(|payload| PipelineError::Panicked(panic_message(payload.as_ref())))
            .and_then(std::convert::identity);

        let restored = self.restore().await;

        match (body, restored) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(e)) => Err(PipelineError::Restore(e)),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(restore_err)) => {
                log::error!("Failed to restore auxiliary features: {restore_err}");
                Err(e)
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

#[cfg(test)]
mod tests {
    use traj_import_runner::fake::{FakeResponse, FakeRunner};

    use super::*;
    use crate::discovery::DiscoveryError;

    const DISABLE: &str = "disable_geomesa_features.sh";
    const RESTORE: &str = "enable_geomesa_features.sh";

    #[tokio::test]
    async fn restores_after_successful_body() {
        let runner = FakeRunner::new();
        let toggle = FeatureToggle::new(&runner, &FeatureConfig::default());

        let value = toggle.while_suspended(async { Ok(7) }).await.unwrap();

        assert_eq!(value, 7);
        let calls: Vec<String> = runner.calls().iter().map(ToString::to_string).collect();
        assert_eq!(
            calls,
            [
                "bash bin/disable_geomesa_features.sh",
                "bash bin/enable_geomesa_features.sh"
            ]
        );
    }

    #[tokio::test]
    async fn restores_once_after_body_error() {
        let runner = FakeRunner::new();
        let toggle = FeatureToggle::new(&runner, &FeatureConfig::default());

        let err = toggle
            .while_suspended(async {
                Err::<(), _>(PipelineError::Discovery(DiscoveryError::NoFilesFound {
                    dir: "/data".to_string(),
                    suffix: ".tbl".to_string(),
                }))
            })
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::Discovery(_)));
        assert_eq!(runner.count_matching(RESTORE), 1);
    }

    #[tokio::test]
    async fn restores_once_after_body_panic() {
        let runner = FakeRunner::new();
        let toggle = FeatureToggle::new(&runner, &FeatureConfig::default());

        let err = toggle
            .while_suspended(async {
                if runner.count_matching(DISABLE) == 1 {
                    panic!("lost connection");
                }
                Ok(())
            })
            .await
            .unwrap_err();

        match err {
            PipelineError::Panicked(message) => assert_eq!(message, "lost connection"),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(runner.count_matching(RESTORE), 1);
    }

    #[tokio::test]
    async fn failed_disable_skips_body_and_still_restores_once() {
        let runner = FakeRunner::new();
        runner.on(DISABLE, FakeResponse::fail(1, "geomesa unavailable"));
        let toggle = FeatureToggle::new(&runner, &FeatureConfig::default());
        let mut ran = false;

        let err = toggle
            .while_suspended(async {
                ran = true;
                Ok(())
            })
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::Disable(_)));
        assert!(!ran);
        assert_eq!(runner.count_matching(RESTORE), 1);
    }

    #[tokio::test]
    async fn panicking_disable_skips_body_and_still_restores_once() {
        let runner = FakeRunner::new();
        runner.on(DISABLE, FakeResponse::Panic("docker daemon gone".to_string()));
        let toggle = FeatureToggle::new(&runner, &FeatureConfig::default());
        let mut ran = false;

        let err = toggle
            .while_suspended(async {
                ran = true;
                Ok(())
            })
            .await
            .unwrap_err();

        match err {
            PipelineError::Panicked(message) => assert_eq!(message, "docker daemon gone"),
            other => panic!("unexpected error: {other}"),
        }
        assert!(!ran);
        assert_eq!(runner.count_matching(RESTORE), 1);
    }

    #[tokio::test]
    async fn failed_restore_is_fatal() {
        let runner = FakeRunner::new();
        runner.on(RESTORE, FakeResponse::fail(1, "permission denied"));
        let toggle = FeatureToggle::new(&runner, &FeatureConfig::default());

        let err = toggle
            .while_suspended(async { Ok(()) })
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::Restore(_)));
        assert_eq!(runner.count_matching(RESTORE), 1);
    }

    #[tokio::test]
    async fn body_error_wins_over_restore_error() {
        let runner = FakeRunner::new();
        runner.on(RESTORE, FakeResponse::fail(1, "permission denied"));
        let toggle = FeatureToggle::new(&runner, &FeatureConfig::default());

        let err = toggle
            .while_suspended(async { Err::<(), _>(PipelineError::Panicked("x".to_string())) })
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::Panicked(_)));
        assert_eq!(runner.count_matching(RESTORE), 1);
    }
}
