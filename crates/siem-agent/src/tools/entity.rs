//! Cross-table entity analysis.

use rig::completion::ToolDefinition;
use rig::tool::Tool as RigTool;
use std::sync::Arc;
use tracing::info;

use super::{parameters_schema, run_query, settle, IpLookupArgs, ToolError, ToolOutcome};
use crate::executor::QueryBackend;
use crate::kql::{queries, Lookback};

/// Everything the workspace knows about one IP address, in a single query.
///
/// The union across `CommonSecurityLog`, `SigninLogs` and `Syslog` is done
/// by the query engine; this tool sends one request and returns one table.
#[derive(Clone)]
pub struct AnalyzeIpEntityTool {
    backend: Arc<dyn QueryBackend>,
}

impl AnalyzeIpEntityTool {
    pub fn new(backend: Arc<dyn QueryBackend>) -> Self {
        Self { backend }
    }
}

impl RigTool for AnalyzeIpEntityTool {
    const NAME: &'static str = "analyze_ip_entity";

    type Error = ToolError;
    type Args = IpLookupArgs;
    type Output = ToolOutcome;

    async fn definition(&self, _prompt: String) -> ToolDefinition {
        ToolDefinition {
            name: Self::NAME.to_string(),
            description: "Investigate an IP address across CommonSecurityLog, SigninLogs and Syslog \
                          at once. Returns the matching rows of all three tables merged and sorted \
                          newest first. Start here when an alert names a suspicious IP."
                .to_string(),
            parameters: parameters_schema::<IpLookupArgs>(),
        }
    }

    async fn call(&self, args: Self::Args) -> Result<Self::Output, Self::Error> {
        info!(
            "{} called for {} ({:?} days)",
            Self::NAME,
            args.ip_address,
            args.days
        );
        let backend = self.backend.clone();
        let joined = tokio::spawn(async move {
            let query = Lookback::from_optional(args.days)
                .and_then(|lookback| queries::ip_entity(&args.ip_address, lookback));
            run_query(backend, query).await
        })
        .await;
        Ok(settle(Self::NAME, joined))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::MockQueryBackend;
    use crate::workspace::QueryOutcome;

    #[tokio::test]
    async fn test_single_round_trip_with_union() {
        let mut backend = MockQueryBackend::new();
        backend.expect_service().return_const("Microsoft Sentinel");
        backend
            .expect_execute()
            .withf(|kql| {
                kql.matches("34.99.24.149").count() == 1
                    && kql.contains("let from_day = ago(3d);")
                    && kql.contains("| union SigninLogsPart, SyslogPart")
            })
            .times(1)
            .returning(|_| Ok(QueryOutcome::NoTables));

        let tool = AnalyzeIpEntityTool::new(Arc::new(backend));
        let outcome = tool
            .call(IpLookupArgs {
                ip_address: "34.99.24.149".to_string(),
                days: Some(3),
            })
            .await
            .unwrap();
        assert_eq!(outcome, ToolOutcome::query(QueryOutcome::NoTables));
    }

    #[tokio::test]
    async fn test_lookback_over_a_year_is_rejected() {
        let mut backend = MockQueryBackend::new();
        backend.expect_execute().times(0);

        let tool = AnalyzeIpEntityTool::new(Arc::new(backend));
        let outcome = tool
            .call(IpLookupArgs {
                ip_address: "34.99.24.149".to_string(),
                days: Some(400),
            })
            .await
            .unwrap();
        assert!(!outcome.is_success());
    }
}
