//! Instance creation and power-on for the Scaleway backend.
//!
//! Servers are created with `stopped: true` and powered on as a separate
//! step so a failed boot still leaves an identifiable instance behind.

use serde::{Deserialize, Serialize};

use crate::provision::{InstanceHandle, ProvisionRequest};

use super::super::{ScalewayBackend, ScalewayBackendError};
use super::InstanceSnapshot;

/// Tag applied to every server created by this tool.
const TOOL_TAG: &str = "harbour";

#[derive(Serialize)]
struct CreateServerRequest {
    name: String,
    commercial_type: String,
    image: String,
    project: String,
    routed_ip_enabled: bool,
    dynamic_ip_required: bool,
    tags: Vec<String>,
    stopped: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    security_group: Option<String>,
}

#[derive(Deserialize)]
struct CreateServerResponse {
    server: scaleway_rs::ScalewayInstance,
}

impl ScalewayBackend {
    fn is_instance_type_error(
        api_err: &scaleway_rs::ScalewayApiError,
        request: &ProvisionRequest,
    ) -> bool {
        matches!(api_err.resource.as_deref(), Some("commercial_type"))
            || api_err
                .resource_id
                .as_deref()
                .is_some_and(|id| id == request.instance_type)
    }

    pub(in crate::scaleway) fn instance_tags(request: &ProvisionRequest) -> Vec<String> {
        let mut tags = vec![TOOL_TAG.to_owned(), request.instance_name.clone()];
        if let Some(key_pair) = &request.key_pair_name {
            tags.push(format!("key-pair={key_pair}"));
        }
        tags
    }

    pub(in crate::scaleway) async fn power_on_if_needed(
        &self,
        zone: &str,
        snapshot: &InstanceSnapshot,
    ) -> Result<(), ScalewayBackendError> {
        if snapshot.state.is_running() {
            return Ok(());
        }

        if snapshot.allows("poweron") {
            self.api
                .perform_instance_action_async(zone, snapshot.id.as_str(), "poweron")
                .await?;
            return Ok(());
        }

        Err(ScalewayBackendError::PowerOnNotAllowed {
            instance_id: snapshot.id.as_str().to_owned(),
            state: snapshot.state.as_str().to_owned(),
        })
    }

    /// Creates a Scaleway server in a stopped state.
    ///
    /// # Errors
    ///
    /// Returns [`ScalewayBackendError`] when the API request fails or the
    /// provider rejects the requested instance type.
    pub(in crate::scaleway) async fn create_instance_stopped(
        &self,
        request: &ProvisionRequest,
    ) -> Result<InstanceHandle, ScalewayBackendError> {
        let url = format!(
            "{}/zones/{}/servers",
            super::SCALEWAY_INSTANCE_API_BASE,
            request.region
        );
        let payload = CreateServerRequest {
            name: request.instance_name.clone(),
            commercial_type: request.instance_type.clone(),
            image: request.image_id.clone(),
            project: request.project_id.clone(),
            routed_ip_enabled: true,
            dynamic_ip_required: true,
            tags: Self::instance_tags(request),
            stopped: true,
            security_group: request.security_group_id.clone(),
        };

        let response = super::HTTP_CLIENT
            .post(&url)
            .header("X-Auth-Token", &self.secret_key)
            .json(&payload)
            .send()
            .await
            .map_err(|err| ScalewayBackendError::Provider {
                message: err.to_string(),
            })?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|err| ScalewayBackendError::Provider {
                message: err.to_string(),
            })?;

        if status.is_success() {
            let parsed: CreateServerResponse =
                serde_json::from_slice(&body).map_err(|err| ScalewayBackendError::Provider {
                    message: err.to_string(),
                })?;
            return Ok(InstanceHandle {
                id: parsed.server.id,
                region: request.region.clone(),
            });
        }

        if let Ok(api_err) = serde_json::from_slice::<scaleway_rs::ScalewayApiError>(&body)
            && Self::is_instance_type_error(&api_err, request)
        {
            return Err(ScalewayBackendError::InstanceTypeUnavailable {
                instance_type: request.instance_type.clone(),
                zone: request.region.clone(),
            });
        }

        Err(ScalewayBackendError::Provider {
            message: String::from_utf8_lossy(&body).into_owned(),
        })
    }
}
