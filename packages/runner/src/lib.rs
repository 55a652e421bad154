#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! External command execution for the trajectory import pipeline.
//!
//! Every interaction with the database and the feature toggle scripts goes
//! through the [`CommandRunner`] trait. [`ProcessRunner`] spawns real
//! processes; [`fake::FakeRunner`] records invocations and replays scripted
//! responses so orchestration logic can be exercised without a live
//! database.
//!
//! Runners never retry. A non-zero exit is either returned as data or
//! raised as [`RunnerError::NonZeroExit`], depending on the caller's
//! `allow_non_zero_exit` flag.

pub mod fake;
mod process;

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;

pub use process::ProcessRunner;

/// A fully-specified external command.
///
/// Arguments are passed to the program verbatim, without a shell in
/// between, so SQL strings need no extra quoting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// Program to execute.
    pub program: String,
    /// Arguments, in order.
    pub args: Vec<String>,
    /// File whose contents are streamed to the program's standard input.
    pub stdin: Option<PathBuf>,
    /// Kill the program if it runs longer than this.
    pub timeout: Option<Duration>,
}

impl CommandSpec {
    /// Creates a command with no arguments.
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            stdin: None,
            timeout: None,
        }
    }

    /// Appends one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Streams `path` to standard input.
    #[must_use]
    pub fn stdin_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.stdin = Some(path.into());
        self
    }

    /// Sets (or clears) the execution timeout.
    #[must_use]
    pub const fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                write!(f, " {arg:?}")?;
            } else {
                write!(f, " {arg}")?;
            }
        }
        if let Some(stdin) = &self.stdin {
            write!(f, " < {}", stdin.display())?;
        }
        Ok(())
    }
}

/// Captured result of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, or `None` if the process was terminated by a signal.
    pub exit_code: Option<i32>,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

impl CommandOutput {
    /// Whether the command exited with status 0.
    #[must_use]
    pub const fn success(&self) -> bool {
        matches!(self.exit_code, Some(0))
    }
}

/// Errors raised while running an external command.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    /// The program could not be started.
    #[error("Failed to spawn `{command}`: {source}")]
    Spawn {
        /// Rendered command line.
        command: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The standard input file could not be opened.
    #[error("Failed to open stdin file {path}: {source}")]
    Stdin {
        /// File that was to be streamed.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Waiting on the program or reading its output failed.
    #[error("Failed to collect output of `{command}`: {source}")]
    Wait {
        /// Rendered command line.
        command: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The program exited non-zero and the caller did not allow it.
    #[error("`{command}` exited with {}: {}", exit_label(.code), .stderr.trim())]
    NonZeroExit {
        /// Rendered command line.
        command: String,
        /// Exit code, `None` when killed by a signal.
        code: Option<i32>,
        /// Captured standard error.
        stderr: String,
    },

    /// The program ran past its timeout and was killed.
    #[error("`{command}` timed out after {timeout:?}")]
    TimedOut {
        /// Rendered command line.
        command: String,
        /// The timeout that elapsed.
        timeout: Duration,
    },
}

fn exit_label(code: &Option<i32>) -> String {
    code.map_or_else(|| "signal".to_string(), |c| format!("status {c}"))
}

/// Executes external commands.
///
/// Implementations must be `Send + Sync` so a single runner can be shared
/// by reference across every pipeline stage.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Runs `command` to completion, capturing its output.
    ///
    /// When `allow_non_zero_exit` is `false`, a non-zero exit is returned
    /// as [`RunnerError::NonZeroExit`]. When `true`, it is returned as
    /// ordinary [`CommandOutput`].
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError`] if the command cannot be started, times out,
    /// or (when not allowed) exits non-zero.
    async fn execute(
        &self,
        command: &CommandSpec,
        allow_non_zero_exit: bool,
    ) -> Result<CommandOutput, RunnerError>;
}

/// Converts a finished command's output into the caller's expected shape,
/// raising non-zero exits unless they are allowed.
///
/// # Errors
///
/// Returns [`RunnerError::NonZeroExit`] when the output is unsuccessful and
/// `allow_non_zero_exit` is `false`.
pub fn check_exit(
    command: &CommandSpec,
    output: CommandOutput,
    allow_non_zero_exit: bool,
) -> Result<CommandOutput, RunnerError> {
    if output.success() || allow_non_zero_exit {
        return Ok(output);
    }
    Err(RunnerError::NonZeroExit {
        command: command.to_string(),
        code: output.exit_code,
        stderr: output.stderr,
    })
}
