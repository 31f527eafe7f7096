//! Microsoft Sentinel incidents API.

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, error};
use url::Url;

use crate::auth::AccessToken;
use crate::config::WorkspaceConfig;
use crate::http::{self, CLIENT_REQUEST_ID_HEADER};
use crate::{Error, Result};

pub const INCIDENTS_API_VERSION: &str = "2024-01-01-preview";

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    value: Vec<Value>,
}

/// Name (GUID) of an incident resource, used to address its alerts.
pub fn incident_name(incident: &Value) -> Option<&str> {
    incident.get("name").and_then(Value::as_str)
}

#[derive(Clone)]
pub struct IncidentsClient {
    client: reqwest::Client,
    management_url: Url,
}

impl IncidentsClient {
    pub fn new(client: reqwest::Client, management_url: Url) -> Self {
        Self {
            client,
            management_url,
        }
    }

    fn incidents_url(&self, workspace: &WorkspaceConfig, tail: &[&str]) -> Result<Url> {
        if !workspace.is_complete() {
            return Err(Error::Config(
                "Sentinel workspace is not configured".to_string(),
            ));
        }
        let mut segments = vec![
            "subscriptions",
            workspace.subscription_id.as_str(),
            "resourceGroups",
            workspace.resource_group_name.as_str(),
            "providers",
            "Microsoft.OperationalInsights",
            "workspaces",
            workspace.workspace_name.as_str(),
            "providers",
            "Microsoft.SecurityInsights",
            "incidents",
        ];
        segments.extend_from_slice(tail);
        http::endpoint(&self.management_url, &segments)
    }

    /// List incidents in the workspace. An empty list is not an error.
    pub async fn list_incidents(
        &self,
        token: &AccessToken,
        workspace: &WorkspaceConfig,
    ) -> Result<Vec<Value>> {
        let url = self.incidents_url(workspace, &[])?;
        debug!("Fetching incidents");
        let request = self.client.get(url);
        let incidents = self.send_list(request, token).await?;
        debug!("Found {} incident(s)", incidents.len());
        Ok(incidents)
    }

    /// List the alerts attached to one incident. An empty list is not an error.
    pub async fn list_incident_alerts(
        &self,
        token: &AccessToken,
        workspace: &WorkspaceConfig,
        incident_id: &str,
    ) -> Result<Vec<Value>> {
        let url = self.incidents_url(workspace, &[incident_id, "alerts"])?;
        debug!("Fetching alerts for incident {}", incident_id);
        // The alerts listing is a POST action on the incident resource
        let request = self.client.post(url);
        let alerts = self.send_list(request, token).await?;
        debug!("Found {} alert(s)", alerts.len());
        Ok(alerts)
    }

    async fn send_list(
        &self,
        request: reqwest::RequestBuilder,
        token: &AccessToken,
    ) -> Result<Vec<Value>> {
        let response = request
            .query(&[("api-version", INCIDENTS_API_VERSION)])
            .bearer_auth(token.secret())
            .header(CLIENT_REQUEST_ID_HEADER, http::new_request_id())
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = http::error_body(response).await;
            error!("API Request Failed. Response Status: {}", status);
            error!("Response Body: {}", body);
            return Err(Error::QueryExecution(body));
        }

        let list: ListResponse = response.json().await?;
        Ok(list.value)
    }
}
