//! Defender for Endpoint advanced hunting tools.
//!
//! All four tools take an IP address and run against the hunting API, so
//! their backend is normally a [`crate::executor::DefenderExecutor`].

use rig::completion::ToolDefinition;
use rig::tool::Tool as RigTool;
use std::sync::Arc;
use tracing::info;

use super::{parameters_schema, run_query, settle, IpLookupArgs, ToolError, ToolOutcome};
use crate::executor::QueryBackend;
use crate::kql::{queries, Lookback};

#[derive(Clone)]
pub struct DeviceInfoTool {
    backend: Arc<dyn QueryBackend>,
}

impl DeviceInfoTool {
    pub fn new(backend: Arc<dyn QueryBackend>) -> Self {
        Self { backend }
    }
}

impl RigTool for DeviceInfoTool {
    const NAME: &'static str = "get_mde_device_info_table";

    type Error = ToolError;
    type Args = IpLookupArgs;
    type Output = ToolOutcome;

    async fn definition(&self, _prompt: String) -> ToolDefinition {
        ToolDefinition {
            name: Self::NAME.to_string(),
            description: "Fetch Defender for Endpoint DeviceInfo rows for machines that reported the \
                          given IP address: device name, OS, onboarding and exposure details."
                .to_string(),
            parameters: parameters_schema::<IpLookupArgs>(),
        }
    }

    async fn call(&self, args: Self::Args) -> Result<Self::Output, Self::Error> {
        info!("{} called for {}", Self::NAME, args.ip_address);
        let backend = self.backend.clone();
        let joined = tokio::spawn(async move {
            let query = Lookback::from_optional(args.days)
                .and_then(|lookback| queries::device_info(&args.ip_address, lookback));
            run_query(backend, query).await
        })
        .await;
        Ok(settle(Self::NAME, joined))
    }
}

#[derive(Clone)]
pub struct DeviceEventsTool {
    backend: Arc<dyn QueryBackend>,
}

impl DeviceEventsTool {
    pub fn new(backend: Arc<dyn QueryBackend>) -> Self {
        Self { backend }
    }
}

impl RigTool for DeviceEventsTool {
    const NAME: &'static str = "get_mde_device_events_table";

    type Error = ToolError;
    type Args = IpLookupArgs;
    type Output = ToolOutcome;

    async fn definition(&self, _prompt: String) -> ToolDefinition {
        ToolDefinition {
            name: Self::NAME.to_string(),
            description: "Fetch Defender for Endpoint DeviceEvents (security-relevant endpoint \
                          events such as exploit protection and antivirus detections) involving \
                          the given IP address."
                .to_string(),
            parameters: parameters_schema::<IpLookupArgs>(),
        }
    }

    async fn call(&self, args: Self::Args) -> Result<Self::Output, Self::Error> {
        info!("{} called for {}", Self::NAME, args.ip_address);
        let backend = self.backend.clone();
        let joined = tokio::spawn(async move {
            let query = Lookback::from_optional(args.days)
                .and_then(|lookback| queries::device_events(&args.ip_address, lookback));
            run_query(backend, query).await
        })
        .await;
        Ok(settle(Self::NAME, joined))
    }
}

#[derive(Clone)]
pub struct DeviceNetworkEventsTool {
    backend: Arc<dyn QueryBackend>,
}

impl DeviceNetworkEventsTool {
    pub fn new(backend: Arc<dyn QueryBackend>) -> Self {
        Self { backend }
    }
}

impl RigTool for DeviceNetworkEventsTool {
    const NAME: &'static str = "get_mde_device_network_events_table";

    type Error = ToolError;
    type Args = IpLookupArgs;
    type Output = ToolOutcome;

    async fn definition(&self, _prompt: String) -> ToolDefinition {
        ToolDefinition {
            name: Self::NAME.to_string(),
            description: "Fetch Defender for Endpoint DeviceNetworkEvents: network connections \
                          made or received by endpoints where the given IP address is the remote \
                          or local address."
                .to_string(),
            parameters: parameters_schema::<IpLookupArgs>(),
        }
    }

    async fn call(&self, args: Self::Args) -> Result<Self::Output, Self::Error> {
        info!("{} called for {}", Self::NAME, args.ip_address);
        let backend = self.backend.clone();
        let joined = tokio::spawn(async move {
            let query = Lookback::from_optional(args.days)
                .and_then(|lookback| queries::device_network_events(&args.ip_address, lookback));
            run_query(backend, query).await
        })
        .await;
        Ok(settle(Self::NAME, joined))
    }
}

#[derive(Clone)]
pub struct DeviceLogonEventsTool {
    backend: Arc<dyn QueryBackend>,
}

impl DeviceLogonEventsTool {
    pub fn new(backend: Arc<dyn QueryBackend>) -> Self {
        Self { backend }
    }
}

impl RigTool for DeviceLogonEventsTool {
    const NAME: &'static str = "get_mde_device_logon_events_table";

    type Error = ToolError;
    type Args = IpLookupArgs;
    type Output = ToolOutcome;

    async fn definition(&self, _prompt: String) -> ToolDefinition {
        ToolDefinition {
            name: Self::NAME.to_string(),
            description: "Fetch Defender for Endpoint DeviceLogonEvents for logons that originated \
                          from the given IP address."
                .to_string(),
            parameters: parameters_schema::<IpLookupArgs>(),
        }
    }

    async fn call(&self, args: Self::Args) -> Result<Self::Output, Self::Error> {
        info!("{} called for {}", Self::NAME, args.ip_address);
        let backend = self.backend.clone();
        let joined = tokio::spawn(async move {
            let query = Lookback::from_optional(args.days)
                .and_then(|lookback| queries::device_logon_events(&args.ip_address, lookback));
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
    use crate::workspace::{QueryColumn, QueryOutcome, QueryTable};
    use serde_json::json;

    fn device_table() -> QueryTable {
        QueryTable {
            name: "PrimaryResult".to_string(),
            columns: vec![QueryColumn {
                name: "DeviceName".to_string(),
                column_type: "String".to_string(),
            }],
            rows: vec![vec![json!("host-1")]],
        }
    }

    #[tokio::test]
    async fn test_device_info_returns_table() {
        let mut backend = MockQueryBackend::new();
        backend
            .expect_service()
            .return_const("Microsoft Defender for Endpoint");
        backend
            .expect_execute()
            .withf(|kql| kql.starts_with("let target_ip = \"10.1.2.3\";") && kql.contains("DeviceInfo"))
            .times(1)
            .returning(|_| Ok(QueryOutcome::Table(device_table())));

        let tool = DeviceInfoTool::new(Arc::new(backend));
        let outcome = tool
            .call(IpLookupArgs {
                ip_address: "10.1.2.3".to_string(),
                days: Some(14),
            })
            .await
            .unwrap();

        let value = serde_json::to_value(outcome).unwrap();
        assert_eq!(value["status"], "success");
        assert_eq!(value["kql_query_result"]["rows"], json!([["host-1"]]));
    }

    fn backend_for(table: &'static str) -> Arc<dyn QueryBackend> {
        let mut backend = MockQueryBackend::new();
        backend
            .expect_service()
            .return_const("Microsoft Defender for Endpoint");
        backend
            .expect_execute()
            .withf(move |kql| kql.contains(table))
            .times(1)
            .returning(|_| Ok(QueryOutcome::NoTables));
        Arc::new(backend)
    }

    fn args() -> IpLookupArgs {
        IpLookupArgs {
            ip_address: "10.1.2.3".to_string(),
            days: None,
        }
    }

    #[tokio::test]
    async fn test_each_tool_targets_its_table() {
        let events = DeviceEventsTool::new(backend_for("\nDeviceEvents\n"));
        assert!(events.call(args()).await.unwrap().is_success());

        let network = DeviceNetworkEventsTool::new(backend_for("\nDeviceNetworkEvents\n"));
        assert!(network.call(args()).await.unwrap().is_success());

        let logon = DeviceLogonEventsTool::new(backend_for("\nDeviceLogonEvents\n"));
        assert!(logon.call(args()).await.unwrap().is_success());
    }
}
