//! In-memory [`CommandRunner`] for tests.
//!
//! [`FakeRunner`] matches each command's rendered command line against
//! substring rules registered with [`FakeRunner::on`] or
//! [`FakeRunner::once`] and replays the first matching response. Commands
//! that match no rule succeed with empty output. Every invocation is
//! recorded, so tests can assert on what ran and in which order.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use crate::{CommandOutput, CommandRunner, CommandSpec, RunnerError, check_exit};

/// What a matched command does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FakeResponse {
    /// Finish with the given output after `delay`.
    Exit {
        /// Output to return.
        output: CommandOutput,
        /// Simulated run time (honours the command's timeout).
        delay: Duration,
    },
    /// Panic inside `execute`, simulating an unexpected fault.
    Panic(String),
}

impl FakeResponse {
    /// Exit 0 with no output.
    #[must_use]
    pub fn ok() -> Self {
        Self::exit(0, "", "")
    }

    /// Exit 0 printing `stdout`.
    #[must_use]
    pub fn stdout(stdout: &str) -> Self {
        Self::exit(0, stdout, "")
    }

    /// Exit with `code`, printing `stderr`.
    #[must_use]
    pub fn fail(code: i32, stderr: &str) -> Self {
        Self::exit(code, "", stderr)
    }

    /// Exit with arbitrary output.
    #[must_use]
    pub fn exit(code: i32, stdout: &str, stderr: &str) -> Self {
        Self::Exit {
            output: CommandOutput {
                exit_code: Some(code),
                stdout: stdout.to_string(),
                stderr: stderr.to_string(),
            },
            delay: Duration::ZERO,
        }
    }

    /// Sets the simulated run time. Has no effect on [`FakeResponse::Panic`].
    #[must_use]
    pub fn after(self, delay: Duration) -> Self {
        match self {
            Self::Exit { output, .. } => Self::Exit { output, delay },
            panic @ Self::Panic(_) => panic,
        }
    }
}

struct Rule {
    pattern: String,
    response: FakeResponse,
    remaining: Option<usize>,
}

/// Scripted [`CommandRunner`] that never spawns a process.
#[derive(Default)]
pub struct FakeRunner {
    rules: Mutex<Vec<Rule>>,
    calls: Mutex<Vec<CommandSpec>>,
}

impl FakeRunner {
    /// Creates a runner where every command succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Responds with `response` to every command containing `pattern`.
    pub fn on(&self, pattern: &str, response: FakeResponse) -> &Self {
        self.push_rule(pattern, response, None)
    }

    /// Responds with `response` to the next command containing `pattern`
    /// only.
    pub fn once(&self, pattern: &str, response: FakeResponse) -> &Self {
        self.push_rule(pattern, response, Some(1))
    }

    fn push_rule(&self, pattern: &str, response: FakeResponse, remaining: Option<usize>) -> &Self {
        self.rules
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Rule {
                pattern: pattern.to_string(),
                response,
                remaining,
            });
        self
    }

    /// Every command executed so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of executed commands whose command line contains `pattern`.
    #[must_use]
    pub fn count_matching(&self, pattern: &str) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|spec| spec.to_string().contains(pattern))
            .count()
    }

    fn respond(&self, line: &str) -> FakeResponse {
        let mut rules = self.rules.lock().unwrap_or_else(PoisonError::into_inner);
        let rule = rules
            .iter_mut()
            .find(|rule| rule.remaining != Some(0) && line.contains(&rule.pattern));

        match rule {
            Some(rule) => {
                if let Some(remaining) = rule.remaining.as_mut() {
                    *remaining -= 1;
                }
                rule.response.clone()
            }
            None => FakeResponse::ok(),
        }
    }
}

#[async_trait]
impl CommandRunner for FakeRunner {
    async fn execute(
        &self,
        command: &CommandSpec,
        allow_non_zero_exit: bool,
    ) -> Result<CommandOutput, RunnerError> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(command.clone());

        let line = command.to_string();
        match self.respond(&line) {
            FakeResponse::Panic(message) => panic!("{message}"),
            FakeResponse::Exit { output, delay } => {
                if let Some(timeout) = command.timeout.filter(|t| *t < delay) {
                    tokio::time::sleep(timeout).await;
                    return Err(RunnerError::TimedOut {
                        command: line,
                        timeout,
                    });
                }
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                check_exit(command, output, allow_non_zero_exit)
            }
        }
    }
}
