//! [`CommandRunner`] backed by real child processes.

use std::process::Stdio;

use async_trait::async_trait;

use crate::{CommandOutput, CommandRunner, CommandSpec, RunnerError, check_exit};

/// Spawns each command as a child process via `tokio::process`.
///
/// Standard output and standard error are captured in full. When the
/// command carries a timeout, the child is killed once it elapses.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn execute(
        &self,
        command: &CommandSpec,
        allow_non_zero_exit: bool,
    ) -> Result<CommandOutput, RunnerError> {
        log::debug!("exec: {command}");

        let mut cmd = tokio::process::Command::new(&command.program);
        cmd.args(&command.args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(path) = &command.stdin {
            let file = std::fs::File::open(path).map_err(|e| RunnerError::Stdin {
                path: path.display().to_string(),
                source: e,
            })?;
            cmd.stdin(Stdio::from(file));
        } else {
            cmd.stdin(Stdio::null());
        }

        let child = cmd.spawn().map_err(|e| RunnerError::Spawn {
            command: command.to_string(),
            source: e,
        })?;

        // Dropping the wait future on timeout drops the child, which kills it.
        let waited = match command.timeout {
            Some(timeout) => tokio::time::timeout(timeout, child.wait_with_output())
                .await
                .map_err(|_| RunnerError::TimedOut {
                    command: command.to_string(),
                    timeout,
                })?,
            None => child.wait_with_output().await,
        };

        let output = waited.map_err(|e| RunnerError::Wait {
            command: command.to_string(),
            source: e,
        })?;

        let output = CommandOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        check_exit(command, output, allow_non_zero_exit)
    }
}
