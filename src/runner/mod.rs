//! External command execution with normalised results.
//!
//! A [`CommandRunner`] turns a [`CommandLine`] into a [`CommandResult`]. The
//! exit code decides success, with two exceptions applied by [`settle`]: a
//! timed-out command yields a result without an exit code, and a file
//! transfer that exits non-zero is tolerated with a warning.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use thiserror::Error;

use crate::report::{DeployEvent, Reporter};

mod command;
mod process;

pub use command::{CommandKind, CommandLine};
pub use process::ProcessCommandRunner;

/// How a command invocation concluded.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CommandStatus {
    /// The process exited with status zero.
    Completed,
    /// The timeout elapsed before the process exited. The process was left
    /// running.
    TimedOut,
    /// A file transfer exited non-zero and was treated as success.
    TransferTolerated,
}

/// Normalised outcome of a command that did not fail.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandResult {
    /// Exit code reported by the process; absent after a timeout.
    pub exit_code: Option<i32>,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
    /// Classification of the outcome.
    pub status: CommandStatus,
}

impl CommandResult {
    /// Returns `true` when the process exited with status zero.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.exit_code, Some(0))
    }
}

/// Raised when a command exits with a non-zero status.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("{command} exited with status {status_text}: {stderr}")]
pub struct ExecutionError {
    /// Shell-like rendering of the failed command.
    pub command: String,
    /// Exit status as reported by the OS.
    pub exit_code: Option<i32>,
    /// Human readable representation of the exit status.
    pub status_text: String,
    /// Standard output captured before the failure.
    pub stdout: String,
    /// Standard error captured before the failure.
    pub stderr: String,
}

/// Errors surfaced by a [`CommandRunner`].
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum CommandError {
    /// Raised when a command cannot be spawned.
    #[error("failed to spawn {program}: {message}")]
    Spawn {
        /// Program that failed to start.
        program: String,
        /// Operating system error string.
        message: String,
    },
    /// Raised when a command ran and exited non-zero.
    #[error(transparent)]
    Execution(#[from] Box<ExecutionError>),
}

/// Future returned by [`CommandRunner::run`].
pub type RunnerFuture<'a> =
    Pin<Box<dyn Future<Output = Result<CommandResult, CommandError>> + Send + 'a>>;

/// Abstraction over command execution so strategies can be driven by fakes.
pub trait CommandRunner: Send + Sync {
    /// Runs `command`, streaming its output to the runner's reporter.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::Spawn`] when the process cannot be started and
    /// [`CommandError::Execution`] when it exits non-zero, unless the command
    /// is a file transfer.
    fn run<'a>(&'a self, command: &'a CommandLine) -> RunnerFuture<'a>;
}

/// Runner shared between a strategy and its packager.
pub type SharedRunner = Arc<dyn CommandRunner>;

impl<R: CommandRunner + ?Sized> CommandRunner for Arc<R> {
    fn run<'a>(&'a self, command: &'a CommandLine) -> RunnerFuture<'a> {
        (**self).run(command)
    }
}

/// Process output before the exit-code policy is applied.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RawOutput {
    /// Exit code, when the process exited.
    pub exit_code: Option<i32>,
    /// Standard output captured so far.
    pub stdout: String,
    /// Standard error captured so far.
    pub stderr: String,
    /// Whether the timeout elapsed before the process exited.
    pub timed_out: bool,
}

/// Applies the exit-code policy shared by every runner.
///
/// # Errors
///
/// Returns [`CommandError::Execution`] when the command exited non-zero and
/// is not a file transfer. The captured stderr is reported first.
pub fn settle(
    command: &CommandLine,
    raw: RawOutput,
    reporter: &dyn Reporter,
) -> Result<CommandResult, CommandError> {
    let RawOutput {
        exit_code,
        stdout,
        stderr,
        timed_out,
    } = raw;

    if timed_out {
        reporter.report(DeployEvent::CommandTimedOut {
            command: command.to_string(),
            timeout_secs: command.timeout().map_or(0, |timeout| timeout.as_secs()),
        });
        return Ok(CommandResult {
            exit_code: None,
            stdout,
            stderr,
            status: CommandStatus::TimedOut,
        });
    }

    if exit_code == Some(0) {
        return Ok(CommandResult {
            exit_code,
            stdout,
            stderr,
            status: CommandStatus::Completed,
        });
    }

    if command.is_file_transfer() {
        reporter.report(DeployEvent::TransferTolerated {
            command: command.to_string(),
            exit_code,
        });
        return Ok(CommandResult {
            exit_code,
            stdout,
            stderr,
            status: CommandStatus::TransferTolerated,
        });
    }

    reporter.report(DeployEvent::CommandFailed {
        command: command.to_string(),
        exit_code,
        stderr: stderr.clone(),
    });
    let status_text = exit_code.map_or_else(|| String::from("unknown"), |code| code.to_string());
    Err(CommandError::Execution(Box::new(ExecutionError {
        command: command.to_string(),
        exit_code,
        status_text,
        stdout,
        stderr,
    })))
}
