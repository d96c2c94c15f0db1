//! Runner that spawns real processes with tokio.

use std::process::Stdio;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::report::{DeployEvent, SharedReporter, Stream};

use super::{CommandError, CommandLine, CommandRunner, RawOutput, RunnerFuture, settle};

/// Real command runner that streams output to a reporter while capturing it.
#[derive(Clone)]
pub struct ProcessCommandRunner {
    reporter: SharedReporter,
}

impl ProcessCommandRunner {
    /// Creates a runner that forwards every output line to `reporter`.
    #[must_use]
    pub fn new(reporter: SharedReporter) -> Self {
        Self { reporter }
    }

    async fn execute(&self, command: &CommandLine) -> Result<RawOutput, CommandError> {
        self.reporter.report(DeployEvent::CommandStarted {
            command: command.to_string(),
        });

        let mut process = Command::new(command.program());
        process
            .args(command.arguments())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = command.working_dir() {
            process.current_dir(dir);
        }

        let mut child = process.spawn().map_err(|err| CommandError::Spawn {
            program: command.program().to_owned(),
            message: err.to_string(),
        })?;

        let stdout = Arc::new(Mutex::new(String::new()));
        let stderr = Arc::new(Mutex::new(String::new()));
        let stdout_task = child.stdout.take().map(|pipe| {
            forward_lines(pipe, Stream::Stdout, Arc::clone(&stdout), self.reporter.clone())
        });
        let stderr_task = child.stderr.take().map(|pipe| {
            forward_lines(pipe, Stream::Stderr, Arc::clone(&stderr), self.reporter.clone())
        });

        let wait_error = |err: std::io::Error| CommandError::Spawn {
            program: command.program().to_owned(),
            message: err.to_string(),
        };

        let status = match command.timeout() {
            Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
                Ok(status) => status.map_err(wait_error)?,
                Err(_) => {
                    // The readers stay attached to the live process; return
                    // what has been captured so far.
                    return Ok(RawOutput {
                        exit_code: None,
                        stdout: stdout.lock().await.clone(),
                        stderr: stderr.lock().await.clone(),
                        timed_out: true,
                    });
                }
            },
            None => child.wait().await.map_err(wait_error)?,
        };

        for task in [stdout_task, stderr_task].into_iter().flatten() {
            task.await.ok();
        }

        Ok(RawOutput {
            exit_code: status.code(),
            stdout: stdout.lock().await.clone(),
            stderr: stderr.lock().await.clone(),
            timed_out: false,
        })
    }
}

impl std::fmt::Debug for ProcessCommandRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessCommandRunner").finish_non_exhaustive()
    }
}

impl CommandRunner for ProcessCommandRunner {
    fn run<'a>(&'a self, command: &'a CommandLine) -> RunnerFuture<'a> {
        Box::pin(async move {
            let raw = self.execute(command).await?;
            settle(command, raw, self.reporter.as_ref())
        })
    }
}

fn forward_lines<R>(
    pipe: R,
    stream: Stream,
    sink: Arc<Mutex<String>>,
    reporter: SharedReporter,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(pipe);
        let mut buffer = Vec::new();
        loop {
            buffer.clear();
            match reader.read_until(b'\n', &mut buffer).await {
                Ok(0) | Err(_) => break,
                Ok(_) => {
                    let text = String::from_utf8_lossy(&buffer);
                    sink.lock().await.push_str(&text);
                    reporter.report(DeployEvent::Output {
                        stream,
                        line: text.trim_end_matches(['\n', '\r']).to_owned(),
                    });
                }
            }
        }
    })
}
