//! Instance lifecycle helpers for the Scaleway backend.

use std::net::IpAddr;
use std::str::FromStr;
use std::sync::LazyLock;
use std::time::Duration;

mod create;
mod wait;

use crate::scaleway::types::{Action, InstanceId, InstanceState};

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
const SCALEWAY_INSTANCE_API_BASE: &str = "https://api.scaleway.com/instance/v1";

static HTTP_CLIENT: LazyLock<reqwest::Client> = LazyLock::new(|| {
    reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
});

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InstanceSnapshot {
    pub(crate) id: InstanceId,
    pub(crate) state: InstanceState,
    pub(crate) allowed_actions: Vec<Action>,
    pub(crate) public_ip: Option<String>,
}

impl InstanceSnapshot {
    fn from_server(server: scaleway_rs::ScalewayInstance) -> Self {
        Self {
            id: server.id.into(),
            state: server.state.into(),
            allowed_actions: server
                .allowed_actions
                .into_iter()
                .map(Action::from)
                .collect(),
            public_ip: server.public_ip.map(|ip| ip.address),
        }
    }

    pub(in crate::scaleway) fn allows(&self, action: &str) -> bool {
        self.allowed_actions
            .iter()
            .any(|allowed| allowed.as_str() == action)
    }

    pub(in crate::scaleway) fn public_address(&self) -> Option<IpAddr> {
        self.public_ip
            .as_deref()
            .and_then(|ip| IpAddr::from_str(ip).ok())
    }
}

/// Where a polled instance stands on the way to `running`.
#[derive(Clone, Debug, Eq, PartialEq)]
enum Readiness {
    /// Not listed yet or still booting.
    Pending,
    /// Running but without a usable public address.
    RunningWithoutAddress,
    /// Running at the given address.
    Ready(IpAddr),
}

fn readiness(snapshot: Option<&InstanceSnapshot>) -> Readiness {
    match snapshot {
        Some(server) if server.state.is_running() => server
            .public_address()
            .map_or(Readiness::RunningWithoutAddress, Readiness::Ready),
        _ => Readiness::Pending,
    }
}
