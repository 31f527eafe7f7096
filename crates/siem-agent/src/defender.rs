//! Defender for Endpoint advanced hunting.
//!
//! The hunting API answers with a `Schema` list and `Results` as one object
//! per row. Responses are reshaped into the same [`QueryTable`] the Log
//! Analytics client returns so both backends look identical to the tools.

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, error};
use url::Url;

use crate::auth::AccessToken;
use crate::http::{self, CLIENT_REQUEST_ID_HEADER};
use crate::workspace::{QueryColumn, QueryOutcome, QueryTable};
use crate::{Error, Result};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct HuntingResponse {
    #[serde(default)]
    schema: Vec<HuntingColumn>,
    #[serde(default)]
    results: Vec<Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct HuntingColumn {
    name: String,
    #[serde(rename = "Type", default)]
    column_type: String,
}

impl HuntingResponse {
    fn into_outcome(self) -> QueryOutcome {
        if self.schema.is_empty() {
            return QueryOutcome::NoTables;
        }
        let rows: Vec<Vec<Value>> = self
            .results
            .iter()
            .map(|record| {
                self.schema
                    .iter()
                    .map(|column| record.get(&column.name).cloned().unwrap_or(Value::Null))
                    .collect::<Vec<Value>>()
            })
            .collect();
        let columns: Vec<QueryColumn> = self
            .schema
            .into_iter()
            .map(|column| QueryColumn {
                name: column.name,
                column_type: column.column_type,
            })
            .collect();
        QueryOutcome::Table(QueryTable {
            name: "PrimaryResult".to_string(),
            columns,
            rows,
        })
    }
}

#[derive(Clone)]
pub struct DefenderClient {
    client: reqwest::Client,
    api_url: Url,
}

impl DefenderClient {
    pub fn new(client: reqwest::Client, api_url: Url) -> Self {
        Self { client, api_url }
    }

    /// Run an advanced hunting query.
    pub async fn run_query(&self, token: &AccessToken, kql: &str) -> Result<QueryOutcome> {
        let url = http::endpoint(&self.api_url, &["api", "advancedqueries", "run"])?;
        let request_id = http::new_request_id();
        debug!("Generated hunting query (request id {}):\n{}", request_id, kql);

        let response = self
            .client
            .post(url)
            .bearer_auth(token.secret())
            .header(CLIENT_REQUEST_ID_HEADER, &request_id)
            .json(&serde_json::json!({ "Query": kql }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = http::error_body(response).await;
            error!("Hunting query failed. Response Status: {}", status);
            error!("Response Body: {}", body);
            return Err(Error::QueryExecution(body));
        }

        let payload: HuntingResponse = response.json().await?;
        debug!("Hunting query returned {} row(s)", payload.results.len());
        Ok(payload.into_outcome())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_rows_follow_schema_order() {
        let response: HuntingResponse = serde_json::from_value(json!({
            "Schema": [
                {"Name": "Timestamp", "Type": "DateTime"},
                {"Name": "DeviceName", "Type": "String"},
                {"Name": "RemoteIP", "Type": "String"}
            ],
            "Results": [
                {"DeviceName": "host-1", "Timestamp": "2024-05-01T00:00:00Z", "RemoteIP": "10.0.0.5"},
                {"Timestamp": "2024-05-02T00:00:00Z", "DeviceName": "host-2"}
            ]
        }))
        .unwrap();

        let QueryOutcome::Table(table) = response.into_outcome() else {
            panic!("expected a table");
        };
        assert_eq!(table.columns.len(), 3);
        assert_eq!(table.columns[1].name, "DeviceName");
        assert_eq!(table.columns[1].column_type, "String");
        assert_eq!(
            table.rows[0],
            vec![json!("2024-05-01T00:00:00Z"), json!("host-1"), json!("10.0.0.5")]
        );
        assert_eq!(table.rows[1][2], Value::Null);
    }

    #[test]
    fn test_zero_rows_is_an_empty_table() {
        let response: HuntingResponse = serde_json::from_value(json!({
            "Schema": [{"Name": "DeviceId", "Type": "String"}],
            "Results": []
        }))
        .unwrap();
        match response.into_outcome() {
            QueryOutcome::Table(table) => assert!(table.rows.is_empty()),
            QueryOutcome::NoTables => panic!("schema present, expected a table"),
        }
    }

    #[test]
    fn test_missing_schema_is_no_tables() {
        let response: HuntingResponse = serde_json::from_value(json!({})).unwrap();
        assert_eq!(response.into_outcome(), QueryOutcome::NoTables);
    }
}
