//! Authenticated query execution.
//!
//! Each executor acquires a token for its service and then runs the query.
//! A failed token step returns before any query request is sent.

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info};

use crate::auth::{AccessToken, AzureAdClient, DEFENDER_RESOURCE, MANAGEMENT_RESOURCE};
use crate::config::{Config, DefenderConfig, SentinelConfig};
use crate::defender::DefenderClient;
use crate::http;
use crate::incidents::IncidentsClient;
use crate::workspace::{LogAnalyticsClient, QueryOutcome, TableSchema};
use crate::Result;

/// Something that can run a KQL query end to end.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QueryBackend: Send + Sync {
    /// Service name used in logs and tool descriptions.
    fn service(&self) -> &'static str;

    async fn execute(&self, kql: &str) -> Result<QueryOutcome>;
}

fn token_client(config: &Config, client: reqwest::Client) -> AzureAdClient {
    let auth = AzureAdClient::new(client, config.endpoints.login_url.clone());
    if config.http.token_cache_enabled {
        auth.with_token_cache()
    } else {
        auth
    }
}

/// Microsoft Sentinel: Log Analytics queries, table schemas and incidents.
#[derive(Clone)]
pub struct SentinelExecutor {
    auth: AzureAdClient,
    workspace: LogAnalyticsClient,
    incidents: IncidentsClient,
    config: SentinelConfig,
}

impl SentinelExecutor {
    pub fn new(
        auth: AzureAdClient,
        workspace: LogAnalyticsClient,
        incidents: IncidentsClient,
        config: SentinelConfig,
    ) -> Self {
        Self {
            auth,
            workspace,
            incidents,
            config,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let client = http::build_client(&config.http)?;
        Ok(Self::with_client(config, client))
    }

    /// Build on a shared HTTP client.
    pub fn with_client(config: &Config, client: reqwest::Client) -> Self {
        let management_url = config.endpoints.management_url.clone();
        Self::new(
            token_client(config, client.clone()),
            LogAnalyticsClient::new(client.clone(), management_url.clone()),
            IncidentsClient::new(client, management_url),
            config.sentinel.clone(),
        )
    }

    /// Token for the management API, reused across calls that make up one
    /// operation.
    pub async fn access_token(&self) -> Result<AccessToken> {
        self.auth
            .acquire_token(&self.config.credentials, MANAGEMENT_RESOURCE)
            .await
    }

    pub async fn table_schema(&self, table_name: &str) -> Result<TableSchema> {
        let token = self.access_token().await?;
        self.workspace
            .table_schema(&token, &self.config.workspace, table_name)
            .await
    }

    /// Incidents in the workspace, newest first as the API returns them.
    pub async fn list_incidents(&self, token: &AccessToken) -> Result<Vec<Value>> {
        let incidents = self
            .incidents
            .list_incidents(token, &self.config.workspace)
            .await?;
        info!("Fetched {} incident(s)", incidents.len());
        Ok(incidents)
    }

    pub async fn list_incident_alerts(
        &self,
        token: &AccessToken,
        incident_id: &str,
    ) -> Result<Vec<Value>> {
        let alerts = self
            .incidents
            .list_incident_alerts(token, &self.config.workspace, incident_id)
            .await?;
        debug!("Incident {} has {} alert(s)", incident_id, alerts.len());
        Ok(alerts)
    }

    pub async fn run_query(&self, token: &AccessToken, kql: &str) -> Result<QueryOutcome> {
        self.workspace
            .run_query(token, &self.config.workspace, kql)
            .await
    }
}

#[async_trait]
impl QueryBackend for SentinelExecutor {
    fn service(&self) -> &'static str {
        "Microsoft Sentinel"
    }

    async fn execute(&self, kql: &str) -> Result<QueryOutcome> {
        let token = self.access_token().await?;
        self.run_query(&token, kql).await
    }
}

/// Microsoft Defender for Endpoint advanced hunting.
#[derive(Clone)]
pub struct DefenderExecutor {
    auth: AzureAdClient,
    hunting: DefenderClient,
    config: DefenderConfig,
}

impl DefenderExecutor {
    pub fn new(auth: AzureAdClient, hunting: DefenderClient, config: DefenderConfig) -> Self {
        Self {
            auth,
            hunting,
            config,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let client = http::build_client(&config.http)?;
        Ok(Self::with_client(config, client))
    }

    pub fn with_client(config: &Config, client: reqwest::Client) -> Self {
        Self::new(
            token_client(config, client.clone()),
            DefenderClient::new(client, config.endpoints.defender_url.clone()),
            config.defender.clone(),
        )
    }
}

#[async_trait]
impl QueryBackend for DefenderExecutor {
    fn service(&self) -> &'static str {
        "Microsoft Defender for Endpoint"
    }

    async fn execute(&self, kql: &str) -> Result<QueryOutcome> {
        let token = self
            .auth
            .acquire_token(&self.config.credentials, DEFENDER_RESOURCE)
            .await?;
        self.hunting.run_query(&token, kql).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_credentials_fail_before_any_request() {
        // Endpoints point nowhere; an attempted request would surface as Http
        let config = Config::from_lookup(|key| match key {
            "AZURE_LOGIN_URL" | "AZURE_MANAGEMENT_URL" => Some("http://127.0.0.1:9".to_string()),
            _ => None,
        })
        .unwrap();
        let executor = SentinelExecutor::from_config(&config).unwrap();

        let err = executor.execute("Syslog | take 1").await.unwrap_err();
        assert!(matches!(err, crate::Error::Authentication(_)));
    }
}
