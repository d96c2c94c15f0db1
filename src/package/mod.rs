//! Turns a local source tree into a single transferable archive.
//!
//! With `force_rebuild` the packager first runs the project's build tool,
//! discards `node_modules`, and removes the prebuilt service from the
//! compose manifest so the target does not rebuild it.

use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;

use crate::report::{SharedReporter, progress};
use crate::runner::{CommandError, CommandLine, SharedRunner};

mod archive;
pub mod manifest;

/// Options controlling a single packaging run.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PackageOptions {
    /// Run the build tool and strip the prebuilt service first.
    pub force_rebuild: bool,
    /// Build tool executable, for example `npm`.
    pub build_bin: String,
    /// Compose service removed after a successful build.
    pub prebuilt_service: String,
    /// Directory that receives the archive.
    pub staging_dir: Utf8PathBuf,
    /// Timeout applied to each build command.
    pub timeout: Option<Duration>,
}

/// A packaged archive ready for transfer.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Artifact {
    /// Absolute path of the archive on the local machine.
    pub path: Utf8PathBuf,
    /// Archive file name, `<source name>.tar.gz`.
    pub file_name: String,
    /// Run directory holding only this archive; removed with it.
    pub dir: Utf8PathBuf,
}

/// Raised when the pre-build step fails.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("pre-build step `{command}` failed: {source}")]
pub struct BuildError {
    /// Shell-like rendering of the failing build command.
    pub command: String,
    /// Underlying runner failure.
    #[source]
    pub source: CommandError,
}

/// Errors raised while packaging.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum PackageError {
    /// Raised when the source directory does not exist.
    #[error("source directory missing: {path}")]
    MissingSource {
        /// Path that was expected to be packaged.
        path: Utf8PathBuf,
    },
    /// Raised when the pre-build step fails.
    #[error(transparent)]
    Build(#[from] BuildError),
    /// Raised when the build output cannot be cleaned up.
    #[error("failed to clean {path}: {message}")]
    Workspace {
        /// Path that could not be removed.
        path: Utf8PathBuf,
        /// Operating system error string.
        message: String,
    },
    /// Raised when the compose manifest cannot be rewritten.
    #[error("failed to rewrite compose manifest {path}: {message}")]
    Manifest {
        /// Manifest path.
        path: Utf8PathBuf,
        /// Parse or I/O error string.
        message: String,
    },
    /// Raised when the archive cannot be written.
    #[error("failed to archive {path}: {message}")]
    Archive {
        /// Path involved in the failure.
        path: Utf8PathBuf,
        /// Underlying error string.
        message: String,
    },
}

/// Packages source trees using an injected runner for the build tool.
#[derive(Clone)]
pub struct Packager {
    runner: SharedRunner,
    reporter: SharedReporter,
}

impl std::fmt::Debug for Packager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Packager").finish_non_exhaustive()
    }
}

impl Packager {
    /// Creates a packager that runs build commands through `runner`.
    #[must_use]
    pub fn new(runner: SharedRunner, reporter: SharedReporter) -> Self {
        Self { runner, reporter }
    }

    /// Packages `source` according to `options`.
    ///
    /// # Errors
    ///
    /// Returns [`PackageError::MissingSource`] when `source` is not a
    /// directory, [`PackageError::Build`] when a build command fails, and
    /// [`PackageError::Manifest`] or [`PackageError::Archive`] when the
    /// filesystem work fails.
    pub async fn package(
        &self,
        source: &Utf8Path,
        options: &PackageOptions,
    ) -> Result<Artifact, PackageError> {
        if !source.is_dir() {
            return Err(PackageError::MissingSource {
                path: source.to_path_buf(),
            });
        }

        if options.force_rebuild {
            self.prebuild(source, options).await?;
            self.strip_prebuilt_service(source, &options.prebuilt_service)?;
        }

        let artifact = archive::write(source, &options.staging_dir).await?;
        progress(
            self.reporter.as_ref(),
            format!("packaged {source} into {}", artifact.path),
        );
        Ok(artifact)
    }

    async fn prebuild(&self, source: &Utf8Path, options: &PackageOptions) -> Result<(), PackageError> {
        let node_modules = source.join("node_modules");
        if !node_modules.exists() {
            self.build_step(source, options, &["install"]).await?;
        }
        self.build_step(source, options, &["run", "build"]).await?;

        if node_modules.exists() {
            tokio::fs::remove_dir_all(&node_modules)
                .await
                .map_err(|err| PackageError::Workspace {
                    path: node_modules.clone(),
                    message: err.to_string(),
                })?;
        }
        Ok(())
    }

    async fn build_step(
        &self,
        source: &Utf8Path,
        options: &PackageOptions,
        args: &[&str],
    ) -> Result<(), PackageError> {
        let command = CommandLine::new(options.build_bin.as_str())
            .args(args.iter().copied())
            .in_dir(source)
            .with_timeout(options.timeout);
        self.runner
            .run(&command)
            .await
            .map_err(|err| BuildError {
                command: command.to_string(),
                source: err,
            })?;
        Ok(())
    }

    fn strip_prebuilt_service(&self, source: &Utf8Path, service: &str) -> Result<(), PackageError> {
        let Some(path) = manifest::locate(source) else {
            progress(
                self.reporter.as_ref(),
                format!("no compose manifest under {source}/deploy; nothing to strip"),
            );
            return Ok(());
        };
        if manifest::drop_service(&path, service)? {
            progress(
                self.reporter.as_ref(),
                format!("removed prebuilt service {service} from {path}"),
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests;
