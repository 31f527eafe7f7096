//! Agent Tools Module
//!
//! SIEM investigation tools exposed to LLM agents through Rig's `Tool` trait.
//! Every tool reports its result in-band as a [`ToolOutcome`]; failures never
//! surface as a tool error.

pub mod defender;
pub mod entity;
pub mod query;
pub mod sentinel;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::task::JoinError;
use tracing::{debug, error};

use crate::executor::QueryBackend;
use crate::kql::KqlQuery;
use crate::workspace::{QueryOutcome, QueryTable, TableSchema};
use crate::Error;

pub use defender::{DeviceEventsTool, DeviceInfoTool, DeviceLogonEventsTool, DeviceNetworkEventsTool};
pub use entity::AnalyzeIpEntityTool;
pub use query::{ExecuteKqlQueryTool, TableSchemaTool};
pub use sentinel::{CommonSecurityLogTool, SecurityIncidentTool, SigninLogsTool, SyslogTool};

pub const NO_TABLES_MESSAGE: &str = "Query returned no tables.";
pub const NO_INCIDENTS_MESSAGE: &str = "No incidents found.";

/// Tools report every failure through [`ToolOutcome::Error`], so `call` cannot fail.
pub type ToolError = std::convert::Infallible;

/// Query payload: the first result table or a "no data" message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum QueryResult {
    Table(QueryTable),
    Message(String),
}

impl From<QueryOutcome> for QueryResult {
    fn from(outcome: QueryOutcome) -> Self {
        match outcome {
            QueryOutcome::Table(table) => QueryResult::Table(table),
            QueryOutcome::NoTables => QueryResult::Message(NO_TABLES_MESSAGE.to_string()),
        }
    }
}

/// Success payloads. Variant order matters for deserialization: the incident
/// shape is a superset of the query shape.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Success {
    Incident {
        incident: Value,
        alerts: Vec<Value>,
        kql_query_result: QueryResult,
    },
    Schema {
        table_schema: TableSchema,
    },
    Query {
        kql_query_result: QueryResult,
    },
}

/// Result returned to the agent by every tool.
///
/// Serializes as `{"status":"success", ...}` or
/// `{"status":"error","error_message":"..."}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolOutcome {
    Success(Success),
    Error { error_message: String },
}

impl ToolOutcome {
    pub fn query(outcome: QueryOutcome) -> Self {
        ToolOutcome::Success(Success::Query {
            kql_query_result: outcome.into(),
        })
    }

    pub fn message(message: impl Into<String>) -> Self {
        ToolOutcome::Success(Success::Query {
            kql_query_result: QueryResult::Message(message.into()),
        })
    }

    pub fn schema(table_schema: TableSchema) -> Self {
        ToolOutcome::Success(Success::Schema { table_schema })
    }

    pub fn error(message: impl Into<String>) -> Self {
        ToolOutcome::Error {
            error_message: message.into(),
        }
    }

    /// Map a failure to the message the agent sees. Query errors carry the
    /// provider's response body unchanged.
    pub fn from_error(err: &Error) -> Self {
        match err {
            Error::Authentication(detail) => {
                Self::error(format!("Failed to obtain access token: {}", detail))
            }
            Error::QueryExecution(body) => Self::error(body.clone()),
            other => Self::error(other.to_string()),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ToolOutcome::Success(_))
    }
}

/// Arguments for tools keyed on an IP address.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct IpLookupArgs {
    /// IP address to investigate, e.g. "34.99.24.149".
    pub ip_address: String,
    /// Lookback window in days (1-365). Defaults to 7.
    #[serde(default)]
    pub days: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct LookbackArgs {
    /// Lookback window in days (1-365). Defaults to 7.
    #[serde(default)]
    pub days: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct KqlQueryArgs {
    /// Complete KQL query to run against the workspace.
    pub kql_query: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TableSchemaArgs {
    /// Log Analytics table name, e.g. "SigninLogs".
    pub table_name: String,
}

/// JSON schema of `T` in the form tool definitions expect.
pub fn parameters_schema<T: JsonSchema>() -> Value {
    let mut schema = serde_json::to_value(schemars::schema_for!(T))
        .unwrap_or_else(|_| serde_json::json!({ "type": "object" }));
    if let Some(object) = schema.as_object_mut() {
        object.remove("$schema");
        object.remove("title");
    }
    schema
}

/// Build a query and run it on `backend`.
pub(crate) async fn run_query(
    backend: Arc<dyn QueryBackend>,
    query: crate::Result<KqlQuery>,
) -> crate::Result<ToolOutcome> {
    let query = query?;
    debug!("Running query on {} against {:?}", backend.service(), query.tables());
    let outcome = backend.execute(query.as_str()).await?;
    Ok(ToolOutcome::query(outcome))
}

/// Collapse the result of a spawned tool task into an outcome.
pub(crate) fn settle(
    tool: &str,
    joined: std::result::Result<crate::Result<ToolOutcome>, JoinError>,
) -> ToolOutcome {
    match joined {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(e)) => {
            error!("Tool {} failed: {}", tool, e);
            ToolOutcome::from_error(&e)
        }
        Err(e) => {
            error!("Tool {} task did not complete: {}", tool, e);
            ToolOutcome::error(format!("Unexpected error in {}: {}", tool, e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workspace::QueryColumn;
    use serde_json::json;

    #[test]
    fn test_no_tables_serialization() {
        let outcome = ToolOutcome::query(QueryOutcome::NoTables);
        assert_eq!(
            serde_json::to_value(&outcome).unwrap(),
            json!({"status": "success", "kql_query_result": "Query returned no tables."})
        );
    }

    #[test]
    fn test_table_serialization() {
        let outcome = ToolOutcome::query(QueryOutcome::Table(QueryTable {
            name: "PrimaryResult".to_string(),
            columns: vec![QueryColumn {
                name: "IPAddress".to_string(),
                column_type: "string".to_string(),
            }],
            rows: vec![vec![json!("34.99.24.149")]],
        }));
        assert_eq!(
            serde_json::to_value(&outcome).unwrap(),
            json!({
                "status": "success",
                "kql_query_result": {
                    "name": "PrimaryResult",
                    "columns": [{"name": "IPAddress", "type": "string"}],
                    "rows": [["34.99.24.149"]]
                }
            })
        );
    }

    #[test]
    fn test_error_shapes() {
        let body = r#"{"error":{"code":"SemanticError"}}"#;
        assert_eq!(
            serde_json::to_value(ToolOutcome::from_error(&Error::QueryExecution(body.to_string())))
                .unwrap(),
            json!({"status": "error", "error_message": body})
        );

        let auth = ToolOutcome::from_error(&Error::Authentication("HTTP 401".to_string()));
        match auth {
            ToolOutcome::Error { error_message } => {
                assert!(error_message.starts_with("Failed to obtain access token"))
            }
            _ => panic!("expected an error outcome"),
        }
    }

    #[test]
    fn test_incident_outcome_round_trips() {
        let outcome = ToolOutcome::Success(Success::Incident {
            incident: json!({"name": "abc"}),
            alerts: vec![],
            kql_query_result: QueryResult::Message(NO_TABLES_MESSAGE.to_string()),
        });
        let text = serde_json::to_string(&outcome).unwrap();
        let parsed: ToolOutcome = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed, outcome);
    }

    #[test]
    fn test_parameters_schema_for_ip_lookup() {
        let schema = parameters_schema::<IpLookupArgs>();
        assert_eq!(schema["type"], "object");
        assert!(schema["properties"]["ip_address"].is_object());
        assert!(schema["properties"]["days"].is_object());
        assert_eq!(schema["required"], json!(["ip_address"]));
        assert!(schema.get("$schema").is_none());
    }

    fn explode() -> crate::Result<ToolOutcome> {
        panic!("boom")
    }

    #[tokio::test]
    async fn test_panicked_task_becomes_error_outcome() {
        let joined = tokio::spawn(async { explode() }).await;
        assert!(!settle("test_tool", joined).is_success());
    }
}
