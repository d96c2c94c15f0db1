//! Scaleway backend implementation of the provisioning lifecycle.

mod error;
mod lifecycle;
mod types;

use std::time::Duration;

use scaleway_rs::ScalewayApi;

use crate::config::DeploymentConfig;
use crate::provision::{
    BackendFuture, InstanceHandle, ProvisionRequest, ProvisionedTarget, ProvisioningBackend,
};
use crate::target::HostnamePattern;

pub use error::ScalewayBackendError;

/// DNS zone under which Scaleway publishes instance hostnames.
pub const DEFAULT_HOSTNAME_SUFFIX: &str = "instances.scw.cloud";

const POLL_INTERVAL: Duration = Duration::from_secs(5);
const WAIT_TIMEOUT: Duration = Duration::from_secs(300);

/// Backend that provisions instances through the Scaleway Instances API.
#[derive(Clone)]
pub struct ScalewayBackend {
    api: ScalewayApi,
    secret_key: String,
    hostname_suffix: String,
    ssh_port: u16,
    poll_interval: Duration,
    wait_timeout: Duration,
}

impl std::fmt::Debug for ScalewayBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScalewayBackend")
            .field("hostname_suffix", &self.hostname_suffix)
            .field("ssh_port", &self.ssh_port)
            .finish_non_exhaustive()
    }
}

impl ScalewayBackend {
    /// Constructs a backend from the deployment configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ScalewayBackendError::Config`] when no secret key is
    /// configured.
    pub fn from_config(config: &DeploymentConfig) -> Result<Self, ScalewayBackendError> {
        let secret_key =
            DeploymentConfig::require(config.secret_access_key.as_deref(), "secret_access_key")?
                .to_owned();
        let hostname_suffix = config
            .public_hostname_suffix
            .clone()
            .unwrap_or_else(|| DEFAULT_HOSTNAME_SUFFIX.to_owned());
        Ok(Self {
            api: ScalewayApi::new(&secret_key),
            secret_key,
            hostname_suffix: hostname_suffix.trim().to_owned(),
            ssh_port: config.port,
            poll_interval: POLL_INTERVAL,
            wait_timeout: WAIT_TIMEOUT,
        })
    }

    /// Overrides the polling interval used while waiting on the API.
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Overrides the overall wait timeout for boot and teardown.
    #[must_use]
    pub const fn with_wait_timeout(mut self, timeout: Duration) -> Self {
        self.wait_timeout = timeout;
        self
    }
}

impl ProvisioningBackend for ScalewayBackend {
    type Error = ScalewayBackendError;

    fn create<'a>(
        &'a self,
        request: &'a ProvisionRequest,
    ) -> BackendFuture<'a, InstanceHandle, Self::Error> {
        Box::pin(async move { self.create_instance_stopped(request).await })
    }

    fn start<'a>(&'a self, handle: &'a InstanceHandle) -> BackendFuture<'a, (), Self::Error> {
        Box::pin(async move {
            let snapshot = self.require_instance(handle).await?;
            self.power_on_if_needed(&handle.region, &snapshot).await
        })
    }

    fn wait_until_running<'a>(
        &'a self,
        handle: &'a InstanceHandle,
    ) -> BackendFuture<'a, (), Self::Error> {
        Box::pin(async move { self.wait_for_running(handle).await })
    }

    fn describe<'a>(
        &'a self,
        handle: &'a InstanceHandle,
    ) -> BackendFuture<'a, ProvisionedTarget, Self::Error> {
        Box::pin(async move {
            let snapshot = self.require_instance(handle).await?;
            let public_address =
                snapshot
                    .public_address()
                    .ok_or_else(|| ScalewayBackendError::MissingPublicIp {
                        instance_id: handle.id.clone(),
                    })?;
            Ok(ProvisionedTarget {
                instance_id: handle.id.clone(),
                public_address,
            })
        })
    }

    fn terminate<'a>(&'a self, handle: &'a InstanceHandle) -> BackendFuture<'a, (), Self::Error> {
        Box::pin(async move {
            let Some(snapshot) = self.fetch_instance(handle).await? else {
                return Ok(());
            };
            if snapshot.allows("terminate") {
                self.api
                    .perform_instance_action_async(&handle.region, &handle.id, "terminate")
                    .await?;
            } else {
                self.api
                    .delete_instance_async(&handle.region, &handle.id)
                    .await?;
            }
            self.wait_until_gone(handle).await
        })
    }

    fn hostname_pattern(&self) -> HostnamePattern {
        if self.hostname_suffix.is_empty() {
            HostnamePattern::RawAddress
        } else {
            HostnamePattern::Dashed {
                suffix: self.hostname_suffix.clone(),
            }
        }
    }
}
