//! Structured command lines.
//!
//! Local processes are spawned from an argument vector, never through a
//! shell. The `Display` rendering exists for logs and assertions only.

use std::borrow::Cow;
use std::fmt;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use shell_escape::unix::escape;

/// Program names recognised as file-transfer tools.
const TRANSFER_PROGRAMS: &[&str] = &["scp"];

/// Classifies a command for exit-code policy.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum CommandKind {
    /// Exit code is authoritative.
    #[default]
    General,
    /// File copy whose non-zero exit is tolerated.
    Transfer,
}

/// A program, its arguments, and where and how long to run it.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandLine {
    program: String,
    args: Vec<String>,
    working_dir: Option<Utf8PathBuf>,
    timeout: Option<Duration>,
    kind: CommandKind,
}

impl CommandLine {
    /// Starts a general command for `program`.
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
            timeout: None,
            kind: CommandKind::General,
        }
    }

    /// Starts a command tagged as a file transfer.
    #[must_use]
    pub fn transfer(program: impl Into<String>) -> Self {
        Self {
            kind: CommandKind::Transfer,
            ..Self::new(program)
        }
    }

    /// Appends one argument.
    #[must_use]
    pub fn arg(mut self, value: impl Into<String>) -> Self {
        self.args.push(value.into());
        self
    }

    /// Appends several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(values.into_iter().map(Into::into));
        self
    }

    /// Runs the command from `dir`.
    #[must_use]
    pub fn in_dir(mut self, dir: impl Into<Utf8PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Sets an optional timeout; `None` waits indefinitely.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Program to execute.
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Arguments passed to the program.
    #[must_use]
    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    /// Working directory, when one was set.
    #[must_use]
    pub fn working_dir(&self) -> Option<&Utf8Path> {
        self.working_dir.as_deref()
    }

    /// Timeout after which the runner stops waiting.
    #[must_use]
    pub const fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Kind assigned at construction.
    #[must_use]
    pub const fn kind(&self) -> CommandKind {
        self.kind
    }

    /// Returns `true` for commands covered by the transfer exit-code
    /// exception: those tagged as transfers and those whose program is a
    /// known copy tool.
    #[must_use]
    pub fn is_file_transfer(&self) -> bool {
        if self.kind == CommandKind::Transfer {
            return true;
        }
        Utf8Path::new(&self.program)
            .file_name()
            .is_some_and(|name| TRANSFER_PROGRAMS.contains(&name))
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(dir) = &self.working_dir {
            write!(f, "cd {} && ", escape(Cow::from(dir.as_str())))?;
        }
        f.write_str(&escape(Cow::from(self.program.as_str())))?;
        for arg in &self.args {
            write!(f, " {}", escape(Cow::from(arg.as_str())))?;
        }
        Ok(())
    }
}
