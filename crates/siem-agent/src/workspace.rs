//! Log Analytics workspace client.
//!
//! Runs KQL against a workspace through Azure Resource Manager and looks up
//! table schemas.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error};
use url::Url;

use crate::auth::AccessToken;
use crate::config::WorkspaceConfig;
use crate::http::{self, CLIENT_REQUEST_ID_HEADER};
use crate::{Error, Result};

pub const QUERY_API_VERSION: &str = "2017-10-01";
pub const TABLES_API_VERSION: &str = "2025-07-01";

/// One result table as returned by the query engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct QueryTable {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub columns: Vec<QueryColumn>,
    #[serde(default)]
    pub rows: Vec<Vec<Value>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueryColumn {
    pub name: String,
    #[serde(rename = "type", default)]
    pub column_type: String,
}

/// Result of a query: the first table, or an explicit "no tables" marker.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutcome {
    Table(QueryTable),
    NoTables,
}

impl QueryOutcome {
    /// Keep the first table; the engine may return more and they are dropped.
    pub fn from_tables(tables: Vec<QueryTable>) -> Self {
        match tables.into_iter().next() {
            Some(table) => QueryOutcome::Table(table),
            None => QueryOutcome::NoTables,
        }
    }
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    tables: Vec<QueryTable>,
}

/// Column schema of a workspace table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TableSchema {
    pub table: String,
    pub columns: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct TableResource {
    properties: TableProperties,
}

#[derive(Debug, Deserialize)]
struct TableProperties {
    schema: SchemaBody,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SchemaBody {
    name: String,
    #[serde(default)]
    columns: Vec<Value>,
    #[serde(default)]
    standard_columns: Vec<Value>,
}

#[derive(Clone)]
pub struct LogAnalyticsClient {
    client: reqwest::Client,
    management_url: Url,
}

impl LogAnalyticsClient {
    pub fn new(client: reqwest::Client, management_url: Url) -> Self {
        Self {
            client,
            management_url,
        }
    }

    fn workspace_url(&self, workspace: &WorkspaceConfig, tail: &[&str]) -> Result<Url> {
        if !workspace.is_complete() {
            return Err(Error::Config(
                "Log Analytics workspace (SUBSCRIPTION_ID, RESOURCE_GROUP_NAME, WORKSPACE_NAME) is not configured"
                    .to_string(),
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
        ];
        segments.extend_from_slice(tail);
        http::endpoint(&self.management_url, &segments)
    }

    /// Execute a KQL query and return the first result table.
    pub async fn run_query(
        &self,
        token: &AccessToken,
        workspace: &WorkspaceConfig,
        kql: &str,
    ) -> Result<QueryOutcome> {
        let url = self.workspace_url(workspace, &["query"])?;
        let request_id = http::new_request_id();
        debug!("Generated KQL Query (request id {}):\n{}", request_id, kql);

        let response = self
            .client
            .post(url)
            .query(&[("api-version", QUERY_API_VERSION)])
            .bearer_auth(token.secret())
            .header(CLIENT_REQUEST_ID_HEADER, &request_id)
            .json(&serde_json::json!({ "query": kql }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = http::error_body(response).await;
            error!("KQL query failed. Response Status: {}", status);
            error!("Response Body: {}", body);
            return Err(Error::QueryExecution(body));
        }

        let payload: QueryResponse = response.json().await?;
        debug!("KQL query returned {} table(s)", payload.tables.len());
        Ok(QueryOutcome::from_tables(payload.tables))
    }

    /// Fetch the column schema of `table_name`, custom columns first.
    pub async fn table_schema(
        &self,
        token: &AccessToken,
        workspace: &WorkspaceConfig,
        table_name: &str,
    ) -> Result<TableSchema> {
        let url = self.workspace_url(workspace, &["tables", table_name])?;

        let response = self
            .client
            .get(url)
            .query(&[("api-version", TABLES_API_VERSION)])
            .bearer_auth(token.secret())
            .header(CLIENT_REQUEST_ID_HEADER, http::new_request_id())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = http::error_body(response).await;
            error!("Table schema request failed. Response Status: {}", status);
            error!("Response Body: {}", body);
            return Err(Error::QueryExecution(body));
        }

        let resource: TableResource = response.json().await.map_err(|e| {
            Error::UnexpectedResponse(format!("table resource has no schema: {}", e))
        })?;
        let schema = resource.properties.schema;

        let mut columns = schema.columns;
        columns.extend(schema.standard_columns);

        Ok(TableSchema {
            table: schema.name,
            columns,
        })
    }
}
