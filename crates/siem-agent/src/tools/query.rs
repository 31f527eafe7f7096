//! Free-form query and schema tools.

use rig::completion::ToolDefinition;
use rig::tool::Tool as RigTool;
use std::sync::Arc;
use tracing::{debug, info};

use super::{parameters_schema, settle, KqlQueryArgs, TableSchemaArgs, ToolError, ToolOutcome};
use crate::executor::{QueryBackend, SentinelExecutor};
use crate::kql::{source_tables, TableName};
use crate::Error;

/// Runs a caller-written KQL query unmodified.
#[derive(Clone)]
pub struct ExecuteKqlQueryTool {
    backend: Arc<dyn QueryBackend>,
}

impl ExecuteKqlQueryTool {
    pub fn new(backend: Arc<dyn QueryBackend>) -> Self {
        Self { backend }
    }
}

impl RigTool for ExecuteKqlQueryTool {
    const NAME: &'static str = "execute_kql_query";

    type Error = ToolError;
    type Args = KqlQueryArgs;
    type Output = ToolOutcome;

    async fn definition(&self, _prompt: String) -> ToolDefinition {
        ToolDefinition {
            name: Self::NAME.to_string(),
            description: format!(
                "Run an arbitrary Kusto Query Language (KQL) query against {} and return the first \
                 result table. Check column names with get_log_analytics_table_schema first and \
                 keep result sets small with `take` or `summarize`.",
                self.backend.service()
            ),
            parameters: parameters_schema::<KqlQueryArgs>(),
        }
    }

    async fn call(&self, args: Self::Args) -> Result<Self::Output, Self::Error> {
        info!("{} called", Self::NAME);
        let backend = self.backend.clone();
        let joined = tokio::spawn(async move {
            if args.kql_query.trim().is_empty() {
                return Err(Error::Validation("kql_query must not be empty".to_string()));
            }
            debug!("Query reads {:?}", source_tables(&args.kql_query));
            let outcome = backend.execute(&args.kql_query).await?;
            Ok(ToolOutcome::query(outcome))
        })
        .await;
        Ok(settle(Self::NAME, joined))
    }
}

/// Column schema of a Log Analytics table.
#[derive(Clone)]
pub struct TableSchemaTool {
    sentinel: Arc<SentinelExecutor>,
}

impl TableSchemaTool {
    pub fn new(sentinel: Arc<SentinelExecutor>) -> Self {
        Self { sentinel }
    }
}

impl RigTool for TableSchemaTool {
    const NAME: &'static str = "get_log_analytics_table_schema";

    type Error = ToolError;
    type Args = TableSchemaArgs;
    type Output = ToolOutcome;

    async fn definition(&self, _prompt: String) -> ToolDefinition {
        ToolDefinition {
            name: Self::NAME.to_string(),
            description: "Look up the columns (name, type, description) of a Log Analytics table, \
                          including its standard columns. Use before writing a query against an \
                          unfamiliar table."
                .to_string(),
            parameters: parameters_schema::<TableSchemaArgs>(),
        }
    }

    async fn call(&self, args: Self::Args) -> Result<Self::Output, Self::Error> {
        info!("{} called for {}", Self::NAME, args.table_name);
        let sentinel = self.sentinel.clone();
        let joined = tokio::spawn(async move {
            let table = TableName::new(&args.table_name)?;
            let schema = sentinel.table_schema(table.as_str()).await?;
            Ok(ToolOutcome::schema(schema))
        })
        .await;
        Ok(settle(Self::NAME, joined))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::executor::MockQueryBackend;
    use crate::workspace::QueryOutcome;

    #[tokio::test]
    async fn test_query_is_forwarded_unmodified() {
        let kql = "SecurityAlert\n| where Severity == 'High'\n| take 5";
        let mut backend = MockQueryBackend::new();
        backend.expect_service().return_const("Microsoft Sentinel");
        backend
            .expect_execute()
            .withf(move |sent| sent == kql)
            .times(1)
            .returning(|_| Ok(QueryOutcome::NoTables));

        let tool = ExecuteKqlQueryTool::new(Arc::new(backend));
        let outcome = tool
            .call(KqlQueryArgs {
                kql_query: kql.to_string(),
            })
            .await
            .unwrap();
        assert!(outcome.is_success());
    }

    #[tokio::test]
    async fn test_blank_query_is_rejected() {
        let mut backend = MockQueryBackend::new();
        backend.expect_execute().times(0);

        let tool = ExecuteKqlQueryTool::new(Arc::new(backend));
        let outcome = tool
            .call(KqlQueryArgs {
                kql_query: "   ".to_string(),
            })
            .await
            .unwrap();
        assert!(!outcome.is_success());
    }

    #[tokio::test]
    async fn test_definition_names_the_service() {
        let mut backend = MockQueryBackend::new();
        backend.expect_service().return_const("Microsoft Sentinel");
        let tool = ExecuteKqlQueryTool::new(Arc::new(backend));

        let definition = tool.definition(String::new()).await;
        assert_eq!(definition.name, "execute_kql_query");
        assert!(definition.description.contains("Microsoft Sentinel"));
    }

    #[tokio::test]
    async fn test_invalid_table_name_is_reported() {
        let config = Config::from_lookup(|_| None).unwrap();
        let tool = TableSchemaTool::new(Arc::new(SentinelExecutor::from_config(&config).unwrap()));

        let outcome = tool
            .call(TableSchemaArgs {
                table_name: "Syslog | take 1".to_string(),
            })
            .await
            .unwrap();
        match outcome {
            ToolOutcome::Error { error_message } => {
                assert!(error_message.contains("not a valid table name"))
            }
            other => panic!("expected an error, got {:?}", other),
        }
    }
}
