//! Core library for the harbour deployment tool.
//!
//! harbour packages an application that ships a compose manifest under
//! `deploy/`, then runs it on this machine, on a fixed host reached over SSH,
//! or on a Scaleway instance provisioned for the purpose. Each target is a
//! [`DeploymentStrategy`] driving the same five phases (package, provision,
//! transfer, configure, start); the [`Deployer`] facade holds the selected
//! strategy and forwards calls to it.
//!
//! External commands go through a [`CommandRunner`] and every step reports
//! through an injected [`Reporter`], so the whole pipeline can be exercised
//! with the scripted doubles in [`test_support`].

pub mod config;
pub mod deployer;
pub mod package;
pub mod provision;
pub mod report;
pub mod runner;
pub mod scaleway;
pub mod strategy;
pub mod target;
pub mod test_support;

pub use config::{ConfigLoadError, DeploymentConfig, MissingField};
pub use deployer::Deployer;
pub use package::{Artifact, BuildError, PackageError, PackageOptions, Packager};
pub use provision::{
    InstanceHandle, ProvisionRequest, ProvisionedTarget, ProvisioningBackend, ProvisioningError,
    TeardownPolicy,
};
pub use report::{DeployEvent, Phase, Reporter, SharedReporter, TracingReporter};
pub use runner::{
    CommandError, CommandLine, CommandResult, CommandRunner, CommandStatus, ExecutionError,
    ProcessCommandRunner, SharedRunner,
};
pub use scaleway::{ScalewayBackend, ScalewayBackendError};
pub use strategy::{
    CloudStrategy, DeployError, DeploymentState, DeploymentStrategy, LocalStrategy,
    RemoteStrategy, StrategyKind,
};
pub use target::{HostnamePattern, RemoteTarget};
