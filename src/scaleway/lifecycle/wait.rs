//! Readiness and teardown wait helpers for the Scaleway backend.

use std::net::IpAddr;
use std::time::{Duration, Instant};

use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};

use crate::provision::InstanceHandle;

use super::super::{ScalewayBackend, ScalewayBackendError};
use super::{InstanceSnapshot, Readiness, readiness};

const SSH_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

impl ScalewayBackend {
    pub(in crate::scaleway) async fn fetch_instance(
        &self,
        handle: &InstanceHandle,
    ) -> Result<Option<InstanceSnapshot>, ScalewayBackendError> {
        let mut servers = self
            .api
            .list_instances(&handle.region)
            .servers(&handle.id)
            .per_page(1)
            .run_async()
            .await?;

        Ok(servers.pop().map(InstanceSnapshot::from_server))
    }

    pub(in crate::scaleway) async fn require_instance(
        &self,
        handle: &InstanceHandle,
    ) -> Result<InstanceSnapshot, ScalewayBackendError> {
        self.fetch_instance(handle)
            .await?
            .ok_or_else(|| ScalewayBackendError::NotFound {
                instance_id: handle.id.clone(),
            })
    }

    /// Polls until the provider reports `running` with a public address, then
    /// until the SSH port accepts connections.
    pub(in crate::scaleway) async fn wait_for_running(
        &self,
        handle: &InstanceHandle,
    ) -> Result<(), ScalewayBackendError> {
        let deadline = Instant::now() + self.wait_timeout;
        let mut saw_running = false;

        while Instant::now() <= deadline {
            let snapshot = self.fetch_instance(handle).await?;
            match readiness(snapshot.as_ref()) {
                Readiness::Ready(address) => {
                    return self.wait_for_ssh_ready(handle, address, deadline).await;
                }
                Readiness::RunningWithoutAddress => saw_running = true,
                Readiness::Pending => {}
            }
            sleep(self.poll_interval).await;
        }

        if saw_running {
            return Err(ScalewayBackendError::MissingPublicIp {
                instance_id: handle.id.clone(),
            });
        }

        Err(ScalewayBackendError::Timeout {
            action: String::from("running state"),
            instance_id: handle.id.clone(),
        })
    }

    async fn wait_for_ssh_ready(
        &self,
        handle: &InstanceHandle,
        address: IpAddr,
        deadline: Instant,
    ) -> Result<(), ScalewayBackendError> {
        while Instant::now() <= deadline {
            let connect =
                timeout(SSH_CONNECT_TIMEOUT, TcpStream::connect((address, self.ssh_port))).await;
            if matches!(connect, Ok(Ok(_))) {
                return Ok(());
            }
            sleep(self.poll_interval).await;
        }

        Err(ScalewayBackendError::Timeout {
            action: String::from("ssh readiness"),
            instance_id: handle.id.clone(),
        })
    }

    pub(in crate::scaleway) async fn wait_until_gone(
        &self,
        handle: &InstanceHandle,
    ) -> Result<(), ScalewayBackendError> {
        let deadline = Instant::now() + self.wait_timeout;
        while Instant::now() <= deadline {
            if self.fetch_instance(handle).await?.is_none() {
                return Ok(());
            }
            sleep(self.poll_interval).await;
        }

        Err(ScalewayBackendError::ResidualResource {
            instance_id: handle.id.clone(),
        })
    }
}
