//! Test support utilities shared across unit and integration tests.

use std::collections::{BTreeSet, VecDeque};
use std::env;
use std::ffi::OsString;
use std::net::IpAddr;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard as StdMutexGuard, PoisonError};

use thiserror::Error;
use tokio::sync::{Mutex, MutexGuard};

use crate::provision::{
    BackendFuture, InstanceHandle, ProvisionRequest, ProvisionStep, ProvisionedTarget,
    ProvisioningBackend,
};
use crate::report::{DeployEvent, NullReporter, Reporter, SharedReporter};
use crate::runner::{CommandLine, CommandRunner, RawOutput, RunnerFuture, settle};
use crate::target::HostnamePattern;

fn lock<T>(mutex: &StdMutex<T>) -> StdMutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Reporter that records every event for later assertions.
#[derive(Clone, Debug, Default)]
pub struct RecordingReporter {
    events: Arc<StdMutex<Vec<DeployEvent>>>,
}

impl RecordingReporter {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the recorder as a shared reporter. Clones observe the same
    /// event list.
    #[must_use]
    pub fn shared(&self) -> SharedReporter {
        Arc::new(self.clone())
    }

    /// Returns a snapshot of all events recorded so far.
    #[must_use]
    pub fn events(&self) -> Vec<DeployEvent> {
        lock(&self.events).clone()
    }

    /// Returns the text of every progress event.
    #[must_use]
    pub fn progress_messages(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                DeployEvent::Progress { message } => Some(message),
                _ => None,
            })
            .collect()
    }
}

impl Reporter for RecordingReporter {
    fn report(&self, event: DeployEvent) {
        lock(&self.events).push(event);
    }
}

#[derive(Debug, Default)]
struct Script {
    rules: Vec<(String, RawOutput)>,
    queue: VecDeque<RawOutput>,
    invocations: Vec<CommandLine>,
}

/// Scripted command runner that never spawns processes.
///
/// Each invocation is answered by the most recently added rule whose
/// fragment occurs in the rendered command, then by the FIFO queue, and
/// finally by a silent success. Answers pass through the same exit-code
/// policy as the real runner.
#[derive(Clone)]
pub struct ScriptedRunner {
    script: Arc<StdMutex<Script>>,
    reporter: SharedReporter,
}

impl std::fmt::Debug for ScriptedRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedRunner")
            .field("script", &self.script)
            .finish_non_exhaustive()
    }
}

impl Default for ScriptedRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedRunner {
    /// Creates a runner with no rules that discards events.
    #[must_use]
    pub fn new() -> Self {
        Self::with_reporter(Arc::new(NullReporter))
    }

    /// Creates a runner that reports policy events to `reporter`.
    #[must_use]
    pub fn with_reporter(reporter: SharedReporter) -> Self {
        Self {
            script: Arc::new(StdMutex::new(Script::default())),
            reporter,
        }
    }

    /// Answers commands containing `fragment` with `code` and `stdout`.
    pub fn respond_to(&self, fragment: &str, code: i32, stdout: &str) {
        self.add_rule(
            fragment,
            RawOutput {
                exit_code: Some(code),
                stdout: stdout.to_owned(),
                ..RawOutput::default()
            },
        );
    }

    /// Fails commands containing `fragment` with `code` and `stderr`.
    pub fn fail_on(&self, fragment: &str, code: i32, stderr: &str) {
        self.add_rule(
            fragment,
            RawOutput {
                exit_code: Some(code),
                stderr: stderr.to_owned(),
                ..RawOutput::default()
            },
        );
    }

    /// Reports a timeout for commands containing `fragment`.
    pub fn time_out_on(&self, fragment: &str) {
        self.add_rule(
            fragment,
            RawOutput {
                timed_out: true,
                ..RawOutput::default()
            },
        );
    }

    /// Queues an answer for the next command that matches no rule.
    pub fn push_output(&self, code: Option<i32>, stdout: &str, stderr: &str) {
        lock(&self.script).queue.push_back(RawOutput {
            exit_code: code,
            stdout: stdout.to_owned(),
            stderr: stderr.to_owned(),
            timed_out: false,
        });
    }

    /// Returns every command run so far.
    #[must_use]
    pub fn invocations(&self) -> Vec<CommandLine> {
        lock(&self.script).invocations.clone()
    }

    /// Returns the shell-like rendering of every command run so far.
    #[must_use]
    pub fn commands(&self) -> Vec<String> {
        self.invocations()
            .iter()
            .map(ToString::to_string)
            .collect()
    }

    fn add_rule(&self, fragment: &str, output: RawOutput) {
        lock(&self.script).rules.push((fragment.to_owned(), output));
    }

    fn answer(&self, command: &CommandLine) -> RawOutput {
        let rendered = command.to_string();
        let mut script = lock(&self.script);
        script.invocations.push(command.clone());
        let matched = script
            .rules
            .iter()
            .rev()
            .find(|(fragment, _)| rendered.contains(fragment.as_str()))
            .map(|(_, output)| output.clone());
        matched
            .or_else(|| script.queue.pop_front())
            .unwrap_or_else(|| RawOutput {
                exit_code: Some(0),
                ..RawOutput::default()
            })
    }
}

impl CommandRunner for ScriptedRunner {
    fn run<'a>(&'a self, command: &'a CommandLine) -> RunnerFuture<'a> {
        Box::pin(async move {
            let raw = self.answer(command);
            settle(command, raw, self.reporter.as_ref())
        })
    }
}

/// Error returned by [`ScriptedProvisioner`].
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("scripted {step} failure")]
pub struct ScriptedProvisionError {
    /// Step configured to fail.
    pub step: ProvisionStep,
}

#[derive(Debug, Default)]
struct ProvisionerState {
    calls: Vec<String>,
    failing: Option<ProvisionStep>,
    terminate_fails: bool,
}

/// Provisioning backend with scripted outcomes.
#[derive(Clone, Debug)]
pub struct ScriptedProvisioner {
    address: IpAddr,
    pattern: HostnamePattern,
    state: Arc<StdMutex<ProvisionerState>>,
}

impl ScriptedProvisioner {
    /// Creates a backend whose instances come up at `address`.
    #[must_use]
    pub fn new(address: IpAddr) -> Self {
        Self {
            address,
            pattern: HostnamePattern::RawAddress,
            state: Arc::new(StdMutex::new(ProvisionerState::default())),
        }
    }

    /// Uses `pattern` to render hostnames.
    #[must_use]
    pub fn with_pattern(mut self, pattern: HostnamePattern) -> Self {
        self.pattern = pattern;
        self
    }

    /// Makes `step` fail on every call.
    pub fn fail_at(&self, step: ProvisionStep) {
        lock(&self.state).failing = Some(step);
    }

    /// Makes termination fail.
    pub fn fail_terminate(&self) {
        lock(&self.state).terminate_fails = true;
    }

    /// Returns the names of backend calls made so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        lock(&self.state).calls.clone()
    }

    fn record(&self, call: &str, step: Option<ProvisionStep>) -> Result<(), ScriptedProvisionError> {
        let mut state = lock(&self.state);
        state.calls.push(call.to_owned());
        match step {
            Some(current) if state.failing == Some(current) => {
                Err(ScriptedProvisionError { step: current })
            }
            _ => Ok(()),
        }
    }
}

impl ProvisioningBackend for ScriptedProvisioner {
    type Error = ScriptedProvisionError;

    fn create<'a>(
        &'a self,
        request: &'a ProvisionRequest,
    ) -> BackendFuture<'a, InstanceHandle, Self::Error> {
        Box::pin(async move {
            self.record("create", Some(ProvisionStep::Create))?;
            Ok(InstanceHandle {
                id: format!("{}-id", request.instance_name),
                region: request.region.clone(),
            })
        })
    }

    fn start<'a>(&'a self, _handle: &'a InstanceHandle) -> BackendFuture<'a, (), Self::Error> {
        Box::pin(async move { self.record("start", Some(ProvisionStep::Start)) })
    }

    fn wait_until_running<'a>(
        &'a self,
        _handle: &'a InstanceHandle,
    ) -> BackendFuture<'a, (), Self::Error> {
        Box::pin(async move { self.record("wait_until_running", Some(ProvisionStep::WaitUntilRunning)) })
    }

    fn describe<'a>(
        &'a self,
        handle: &'a InstanceHandle,
    ) -> BackendFuture<'a, ProvisionedTarget, Self::Error> {
        Box::pin(async move {
            self.record("describe", Some(ProvisionStep::Describe))?;
            Ok(ProvisionedTarget {
                instance_id: handle.id.clone(),
                public_address: self.address,
            })
        })
    }

    fn terminate<'a>(&'a self, _handle: &'a InstanceHandle) -> BackendFuture<'a, (), Self::Error> {
        Box::pin(async move {
            self.record("terminate", None)?;
            if lock(&self.state).terminate_fails {
                return Err(ScriptedProvisionError {
                    step: ProvisionStep::Create,
                });
            }
            Ok(())
        })
    }

    fn hostname_pattern(&self) -> HostnamePattern {
        self.pattern.clone()
    }
}

/// Global mutex used to serialise environment mutation in tests.
pub static ENV_LOCK: Mutex<()> = Mutex::const_new(());

/// Guard that holds the env mutex and restores variables on drop.
pub struct EnvGuard {
    previous: Vec<(String, Option<OsString>)>,
    _guard: MutexGuard<'static, ()>,
}

impl EnvGuard {
    /// Sets multiple environment variables while holding a global mutex.
    pub async fn set_vars(pairs: &[(&str, &str)]) -> Self {
        debug_assert!(
            {
                let mut seen = BTreeSet::new();
                pairs.iter().all(|(key, _)| seen.insert(*key))
            },
            "duplicate environment variable keys passed to EnvGuard::set_vars"
        );

        let guard = ENV_LOCK.lock().await;
        let mut previous = Vec::with_capacity(pairs.len());
        for (key, value) in pairs {
            let old = env::var_os(key);
            // SAFETY: Environment mutation is serialised by `ENV_LOCK`, preventing races.
            unsafe { env::set_var(key, value) };
            previous.push(((*key).to_owned(), old));
        }

        Self {
            previous,
            _guard: guard,
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, old) in &self.previous {
            // SAFETY: Environment mutation is serialised by holding `_guard`.
            unsafe {
                match old {
                    Some(val) => env::set_var(key, val),
                    None => env::remove_var(key),
                }
            }
        }
    }
}
