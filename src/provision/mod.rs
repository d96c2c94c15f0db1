//! Provisioning abstraction for cloud deployment targets.
//!
//! A [`ProvisioningBackend`] creates, boots, and describes one instance. The
//! [`provision`] function drives those calls in order and applies the
//! caller's [`TeardownPolicy`] when a step after creation fails.

use std::fmt::{self, Display};
use std::future::Future;
use std::net::IpAddr;
use std::pin::Pin;

use thiserror::Error;

use crate::config::{DeploymentConfig, MissingField};
use crate::report::{Reporter, progress};
use crate::target::HostnamePattern;

/// Parameters required to create a new instance.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ProvisionRequest {
    /// Provider image identifier.
    pub image_id: String,
    /// Commercial type or flavour to request (for example `DEV1-S`).
    pub instance_type: String,
    /// Name recorded on the instance.
    pub instance_name: String,
    /// Target zone (for example `fr-par-1`).
    pub region: String,
    /// Project identifier used for billing and ownership.
    pub project_id: String,
    /// Optional security group attached at creation.
    pub security_group_id: Option<String>,
    /// Optional key pair label recorded on the instance.
    pub key_pair_name: Option<String>,
}

impl ProvisionRequest {
    /// Starts a builder for a [`ProvisionRequest`].
    #[must_use]
    pub fn builder() -> ProvisionRequestBuilder {
        ProvisionRequestBuilder::new()
    }

    /// Builds a request from the cloud fields of `config`.
    ///
    /// # Errors
    ///
    /// Returns [`MissingField`] naming the first absent required field.
    pub fn from_config(config: &DeploymentConfig) -> Result<Self, MissingField> {
        Self::builder()
            .image_id(config.image_id.clone().unwrap_or_default())
            .instance_type(config.instance_type.clone().unwrap_or_default())
            .instance_name(config.instance_name.clone().unwrap_or_default())
            .region(config.region.clone().unwrap_or_default())
            .project_id(config.project_id.clone().unwrap_or_default())
            .security_group_id(config.security_group_id.clone())
            .key_pair_name(config.key_pair_name.clone())
            .build()
    }

    /// Validates the request, naming the first empty required field.
    ///
    /// # Errors
    ///
    /// Returns [`MissingField`] when any required string is empty.
    pub fn validate(&self) -> Result<(), MissingField> {
        let required = [
            (&self.image_id, "image_id"),
            (&self.instance_type, "instance_type"),
            (&self.instance_name, "instance_name"),
            (&self.region, "region"),
            (&self.project_id, "project_id"),
        ];
        for (value, field) in required {
            if value.is_empty() {
                return Err(MissingField { field });
            }
        }
        Ok(())
    }
}

/// Builder for [`ProvisionRequest`] that trims inputs and validates on build.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ProvisionRequestBuilder {
    image_id: String,
    instance_type: String,
    instance_name: String,
    region: String,
    project_id: String,
    security_group_id: Option<String>,
    key_pair_name: Option<String>,
}

impl ProvisionRequestBuilder {
    /// Creates an empty builder; fields must be populated before build.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the image identifier.
    #[must_use]
    pub fn image_id(mut self, value: impl Into<String>) -> Self {
        self.image_id = value.into();
        self
    }

    /// Sets the instance type.
    #[must_use]
    pub fn instance_type(mut self, value: impl Into<String>) -> Self {
        self.instance_type = value.into();
        self
    }

    /// Sets the instance name.
    #[must_use]
    pub fn instance_name(mut self, value: impl Into<String>) -> Self {
        self.instance_name = value.into();
        self
    }

    /// Sets the zone.
    #[must_use]
    pub fn region(mut self, value: impl Into<String>) -> Self {
        self.region = value.into();
        self
    }

    /// Sets the project identifier.
    #[must_use]
    pub fn project_id(mut self, value: impl Into<String>) -> Self {
        self.project_id = value.into();
        self
    }

    /// Sets the optional security group.
    #[must_use]
    pub fn security_group_id(mut self, value: Option<String>) -> Self {
        self.security_group_id = value;
        self
    }

    /// Sets the optional key pair label.
    #[must_use]
    pub fn key_pair_name(mut self, value: Option<String>) -> Self {
        self.key_pair_name = value;
        self
    }

    /// Builds and validates the request. Blank optional values are dropped.
    ///
    /// # Errors
    ///
    /// Returns [`MissingField`] when any required field is empty after
    /// trimming.
    pub fn build(self) -> Result<ProvisionRequest, MissingField> {
        let request = ProvisionRequest {
            image_id: self.image_id.trim().to_owned(),
            instance_type: self.instance_type.trim().to_owned(),
            instance_name: self.instance_name.trim().to_owned(),
            region: self.region.trim().to_owned(),
            project_id: self.project_id.trim().to_owned(),
            security_group_id: trimmed(self.security_group_id),
            key_pair_name: trimmed(self.key_pair_name),
        };
        request.validate()?;
        Ok(request)
    }
}

fn trimmed(value: Option<String>) -> Option<String> {
    value
        .map(|inner| inner.trim().to_owned())
        .filter(|inner| !inner.is_empty())
}

/// Handle returned by a backend once an instance has been created.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InstanceHandle {
    /// Provider specific identifier for the instance.
    pub id: String,
    /// Zone in which the instance was created.
    pub region: String,
}

/// A running instance reachable at a public address.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ProvisionedTarget {
    /// Provider specific identifier for the instance.
    pub instance_id: String,
    /// Public address assigned by the provider.
    pub public_address: IpAddr,
}

/// Future returned by backend operations.
pub type BackendFuture<'a, T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'a>>;

/// Minimal interface implemented by cloud providers.
pub trait ProvisioningBackend: Send + Sync {
    /// Provider specific error type returned by the backend.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Creates a new instance tagged with the requested name.
    fn create<'a>(
        &'a self,
        request: &'a ProvisionRequest,
    ) -> BackendFuture<'a, InstanceHandle, Self::Error>;

    /// Powers the instance on.
    fn start<'a>(&'a self, handle: &'a InstanceHandle) -> BackendFuture<'a, (), Self::Error>;

    /// Resolves once the provider reports the instance as running and
    /// reachable.
    fn wait_until_running<'a>(
        &'a self,
        handle: &'a InstanceHandle,
    ) -> BackendFuture<'a, (), Self::Error>;

    /// Reads the instance's public address.
    fn describe<'a>(
        &'a self,
        handle: &'a InstanceHandle,
    ) -> BackendFuture<'a, ProvisionedTarget, Self::Error>;

    /// Destroys the instance.
    fn terminate<'a>(&'a self, handle: &'a InstanceHandle) -> BackendFuture<'a, (), Self::Error>;

    /// Pattern that turns a public address into the hostname used for SSH.
    fn hostname_pattern(&self) -> HostnamePattern;
}

/// Provisioning step that failed.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProvisionStep {
    /// Instance creation.
    Create,
    /// Power-on request.
    Start,
    /// Waiting for the running state.
    WaitUntilRunning,
    /// Reading the public address.
    Describe,
}

impl Display for ProvisionStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Create => "create",
            Self::Start => "start",
            Self::WaitUntilRunning => "wait until running",
            Self::Describe => "describe",
        })
    }
}

/// What to do with a created instance when a later provisioning step fails.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum TeardownPolicy {
    /// Leave the instance for inspection.
    #[default]
    Leave,
    /// Attempt to terminate the instance.
    Terminate,
}

impl TeardownPolicy {
    /// Maps the `teardown_on_failure` flag to a policy.
    #[must_use]
    pub const fn from_flag(teardown_on_failure: bool) -> Self {
        if teardown_on_failure {
            Self::Terminate
        } else {
            Self::Leave
        }
    }
}

/// Raised when a provider call fails.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("provisioning failed during {step}: {message}")]
pub struct ProvisioningError {
    /// Step that failed.
    pub step: ProvisionStep,
    /// Instance created before the failure, if any.
    pub instance_id: Option<String>,
    /// Provider error text, with a teardown note when one applies.
    pub message: String,
}

/// Creates, starts, waits for, and describes one instance.
///
/// # Errors
///
/// Returns [`ProvisioningError`] naming the failed step. When `policy` is
/// [`TeardownPolicy::Terminate`] and an instance exists, termination is
/// attempted and its outcome is appended to the message.
pub async fn provision<B>(
    backend: &B,
    request: &ProvisionRequest,
    policy: TeardownPolicy,
    reporter: &dyn Reporter,
) -> Result<ProvisionedTarget, ProvisioningError>
where
    B: ProvisioningBackend + ?Sized,
{
    let handle = backend
        .create(request)
        .await
        .map_err(|err| ProvisioningError {
            step: ProvisionStep::Create,
            instance_id: None,
            message: err.to_string(),
        })?;
    progress(
        reporter,
        format!("created instance {} ({}) in {}", request.instance_name, handle.id, handle.region),
    );

    match boot(backend, &handle).await {
        Ok(target) => {
            progress(
                reporter,
                format!("instance {} running at {}", target.instance_id, target.public_address),
            );
            Ok(target)
        }
        Err((step, err)) => {
            let message = match policy {
                TeardownPolicy::Leave => err.to_string(),
                TeardownPolicy::Terminate => terminate_with_note(backend, &handle, &err).await,
            };
            Err(ProvisioningError {
                step,
                instance_id: Some(handle.id.clone()),
                message,
            })
        }
    }
}

async fn boot<B>(
    backend: &B,
    handle: &InstanceHandle,
) -> Result<ProvisionedTarget, (ProvisionStep, B::Error)>
where
    B: ProvisioningBackend + ?Sized,
{
    backend
        .start(handle)
        .await
        .map_err(|err| (ProvisionStep::Start, err))?;
    backend
        .wait_until_running(handle)
        .await
        .map_err(|err| (ProvisionStep::WaitUntilRunning, err))?;
    backend
        .describe(handle)
        .await
        .map_err(|err| (ProvisionStep::Describe, err))
}

async fn terminate_with_note<B, E>(backend: &B, handle: &InstanceHandle, err: &E) -> String
where
    B: ProvisioningBackend + ?Sized,
    E: Display,
{
    let teardown_error = backend.terminate(handle).await.err();
    append_teardown_note(err.to_string(), &handle.id, teardown_error.as_ref())
}

fn append_teardown_note<E: Display>(
    message: String,
    instance_id: &str,
    teardown_error: Option<&E>,
) -> String {
    if let Some(teardown) = teardown_error {
        format!("{message} (teardown of {instance_id} also failed: {teardown})")
    } else {
        format!("{message} (instance {instance_id} terminated)")
    }
}

#[cfg(test)]
mod tests;
