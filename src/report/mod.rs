//! Structured progress reporting for deployments.
//!
//! Components never log through a global. Each one receives a
//! [`SharedReporter`] and emits [`DeployEvent`] values through it, so the
//! binary can forward them to `tracing` while tests record and assert on the
//! exact event stream.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

/// Pipeline phases in execution order.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Phase {
    /// Archive the source tree, optionally after a pre-build.
    Package,
    /// Create and boot a cloud instance.
    Provision,
    /// Copy the archive to the target and unpack it.
    Transfer,
    /// Install the container runtime and compose tool.
    Configure,
    /// Bring the compose stack up.
    Start,
}

impl Phase {
    /// Every phase, in the order a deployment runs them.
    pub const ALL: [Self; 5] = [
        Self::Package,
        Self::Provision,
        Self::Transfer,
        Self::Configure,
        Self::Start,
    ];

    /// Lower-case name used in log lines and error messages.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Package => "package",
            Self::Provision => "provision",
            Self::Transfer => "transfer",
            Self::Configure => "configure",
            Self::Start => "start",
        }
    }

    /// One-based position of the phase within the pipeline.
    #[must_use]
    pub const fn ordinal(self) -> usize {
        match self {
            Self::Package => 1,
            Self::Provision => 2,
            Self::Transfer => 3,
            Self::Configure => 4,
            Self::Start => 5,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output stream a captured line was read from.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Stream {
    /// Standard output.
    Stdout,
    /// Standard error.
    Stderr,
}

/// Events emitted while a deployment runs.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum DeployEvent {
    /// A phase is about to execute.
    PhaseStarted {
        /// Strategy driving the pipeline.
        strategy: &'static str,
        /// Phase being started.
        phase: Phase,
    },
    /// A phase does not apply to the active strategy.
    PhaseSkipped {
        /// Strategy driving the pipeline.
        strategy: &'static str,
        /// Phase being skipped.
        phase: Phase,
    },
    /// Human-readable progress inside a phase.
    Progress {
        /// Message shown to the operator.
        message: String,
    },
    /// An external command is about to be spawned.
    CommandStarted {
        /// Shell-like rendering of the command.
        command: String,
    },
    /// One line of output read from a running command.
    Output {
        /// Stream the line came from.
        stream: Stream,
        /// Line contents without the trailing newline.
        line: String,
    },
    /// A command outlived its timeout and was left running.
    CommandTimedOut {
        /// Shell-like rendering of the command.
        command: String,
        /// Timeout that elapsed, in seconds.
        timeout_secs: u64,
    },
    /// A file-transfer command exited non-zero and was treated as success.
    TransferTolerated {
        /// Shell-like rendering of the command.
        command: String,
        /// Exit code reported by the transfer tool.
        exit_code: Option<i32>,
    },
    /// A command failed; its stderr is attached before the error propagates.
    CommandFailed {
        /// Shell-like rendering of the command.
        command: String,
        /// Exit code reported by the process, if any.
        exit_code: Option<i32>,
        /// Captured standard error.
        stderr: String,
    },
    /// The whole pipeline finished.
    Completed {
        /// Strategy that drove the pipeline.
        strategy: &'static str,
    },
}

/// Sink for deployment events.
pub trait Reporter: Send + Sync {
    /// Records or forwards a single event.
    fn report(&self, event: DeployEvent);
}

/// Reporter shared between the strategy, its runner, and its packager.
pub type SharedReporter = Arc<dyn Reporter>;

/// Forwards events to `tracing`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn report(&self, event: DeployEvent) {
        match event {
            DeployEvent::PhaseStarted { strategy, phase } => {
                info!(strategy, phase = %phase, "step {}/5: {phase}", phase.ordinal());
            }
            DeployEvent::PhaseSkipped { strategy, phase } => {
                debug!(strategy, phase = %phase, "skipping {phase}: not used by {strategy}");
            }
            DeployEvent::Progress { message } => info!("{message}"),
            DeployEvent::CommandStarted { command } => debug!(%command, "executing"),
            DeployEvent::Output { stream, line } => match stream {
                Stream::Stdout => info!(target: "harbour::output", "{line}"),
                Stream::Stderr => warn!(target: "harbour::output", "{line}"),
            },
            DeployEvent::CommandTimedOut {
                command,
                timeout_secs,
            } => warn!(%command, timeout_secs, "command still running after timeout"),
            DeployEvent::TransferTolerated { command, exit_code } => {
                warn!(%command, ?exit_code, "file transfer reported a non-zero exit; continuing");
            }
            DeployEvent::CommandFailed {
                command,
                exit_code,
                stderr,
            } => error!(%command, ?exit_code, "command failed: {}", stderr.trim()),
            DeployEvent::Completed { strategy } => info!(strategy, "deployment complete"),
        }
    }
}

/// Discards every event.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullReporter;

impl Reporter for NullReporter {
    fn report(&self, _event: DeployEvent) {}
}

/// Convenience for emitting a [`DeployEvent::Progress`] line.
pub fn progress(reporter: &dyn Reporter, message: impl Into<String>) {
    reporter.report(DeployEvent::Progress {
        message: message.into(),
    });
}
