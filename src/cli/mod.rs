//! Command-line interface definitions for the `harbour` binary.
//!
//! This module centralises the clap parser structures so both the main binary
//! and the build script can reuse them when generating the manual page.

use clap::{Parser, ValueEnum};

/// Top-level CLI for the `harbour` binary.
#[derive(Debug, Parser)]
#[command(
    name = "harbour",
    about = "Package a compose application and run it locally, on a host, or on a new cloud instance",
    arg_required_else_help = true
)]
pub(crate) enum Cli {
    /// Package, ship, and start the application.
    #[command(name = "deploy", about = "Package, ship, and start the application")]
    Deploy(DeployCommand),
}

/// Where `harbour deploy` runs the application.
#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub(crate) enum TargetKind {
    /// Run `compose up` on this machine.
    Local,
    /// Ship to the configured host over SSH.
    Remote,
    /// Provision a Scaleway instance and ship to it.
    Cloud,
}

/// Arguments for the `harbour deploy` subcommand.
#[derive(Debug, Parser)]
pub(crate) struct DeployCommand {
    /// Deployment strategy.
    #[arg(long, value_enum, value_name = "TARGET")]
    pub(crate) target: TargetKind,
    /// Local application directory containing `deploy/`.
    ///
    /// Overrides `source_path` from configuration.
    #[arg(long, value_name = "PATH")]
    pub(crate) source: Option<String>,
    /// Remote host for the `remote` target. Overrides `host` from
    /// configuration.
    #[arg(long, value_name = "HOST")]
    pub(crate) host: Option<String>,
    /// Run the local build, drop the prebuilt service, and recreate
    /// containers.
    #[arg(long)]
    pub(crate) force_rebuild: bool,
}
