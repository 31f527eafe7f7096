//! Microsoft Sentinel table tools.

use rig::completion::ToolDefinition;
use rig::tool::Tool as RigTool;
use std::sync::Arc;
use tracing::{debug, info};

use super::{
    parameters_schema, run_query, settle, IpLookupArgs, LookbackArgs, QueryResult, Success,
    ToolError, ToolOutcome, NO_INCIDENTS_MESSAGE,
};
use crate::executor::{QueryBackend, SentinelExecutor};
use crate::incidents::incident_name;
use crate::kql::{queries, Lookback};
use crate::Error;

/// Sign-in activity from Entra ID for an IP address.
#[derive(Clone)]
pub struct SigninLogsTool {
    backend: Arc<dyn QueryBackend>,
}

impl SigninLogsTool {
    pub fn new(backend: Arc<dyn QueryBackend>) -> Self {
        Self { backend }
    }
}

impl RigTool for SigninLogsTool {
    const NAME: &'static str = "get_signin_logs_table";

    type Error = ToolError;
    type Args = IpLookupArgs;
    type Output = ToolOutcome;

    async fn definition(&self, _prompt: String) -> ToolDefinition {
        ToolDefinition {
            name: Self::NAME.to_string(),
            description: "Fetch SigninLogs rows whose client IP address contains the given address, \
                          newest first. Use this to see which accounts signed in from an IP."
                .to_string(),
            parameters: parameters_schema::<IpLookupArgs>(),
        }
    }

    async fn call(&self, args: Self::Args) -> Result<Self::Output, Self::Error> {
        info!("{} called for {}", Self::NAME, args.ip_address);
        let backend = self.backend.clone();
        let joined = tokio::spawn(async move {
            let query = Lookback::from_optional(args.days)
                .and_then(|lookback| queries::signin_logs(&args.ip_address, lookback));
            run_query(backend, query).await
        })
        .await;
        Ok(settle(Self::NAME, joined))
    }
}

/// Firewall and proxy events from third-party appliances for an IP address.
#[derive(Clone)]
pub struct CommonSecurityLogTool {
    backend: Arc<dyn QueryBackend>,
}

impl CommonSecurityLogTool {
    pub fn new(backend: Arc<dyn QueryBackend>) -> Self {
        Self { backend }
    }
}

impl RigTool for CommonSecurityLogTool {
    const NAME: &'static str = "get_common_security_log_table";

    type Error = ToolError;
    type Args = IpLookupArgs;
    type Output = ToolOutcome;

    async fn definition(&self, _prompt: String) -> ToolDefinition {
        ToolDefinition {
            name: Self::NAME.to_string(),
            description: "Fetch the newest CommonSecurityLog rows where the IP address is the source \
                          or destination. The table holds network traffic logged by firewalls and \
                          other third-party network appliances."
                .to_string(),
            parameters: parameters_schema::<IpLookupArgs>(),
        }
    }

    async fn call(&self, args: Self::Args) -> Result<Self::Output, Self::Error> {
        info!("{} called for {}", Self::NAME, args.ip_address);
        let backend = self.backend.clone();
        let joined = tokio::spawn(async move {
            let query = Lookback::from_optional(args.days)
                .and_then(|lookback| queries::common_security_log(&args.ip_address, lookback));
            run_query(backend, query).await
        })
        .await;
        Ok(settle(Self::NAME, joined))
    }
}

#[derive(Clone)]
pub struct SyslogTool {
    backend: Arc<dyn QueryBackend>,
}

impl SyslogTool {
    pub fn new(backend: Arc<dyn QueryBackend>) -> Self {
        Self { backend }
    }
}

impl RigTool for SyslogTool {
    const NAME: &'static str = "get_syslog_table";

    type Error = ToolError;
    type Args = LookbackArgs;
    type Output = ToolOutcome;

    async fn definition(&self, _prompt: String) -> ToolDefinition {
        ToolDefinition {
            name: Self::NAME.to_string(),
            description: "Fetch the newest Syslog rows collected from Linux hosts.".to_string(),
            parameters: parameters_schema::<LookbackArgs>(),
        }
    }

    async fn call(&self, args: Self::Args) -> Result<Self::Output, Self::Error> {
        info!("{} called", Self::NAME);
        let backend = self.backend.clone();
        let joined = tokio::spawn(async move {
            let query = Lookback::from_optional(args.days).and_then(queries::syslog);
            run_query(backend, query).await
        })
        .await;
        Ok(settle(Self::NAME, joined))
    }
}

/// The latest incident with its alerts and `SecurityIncident` record.
#[derive(Clone)]
pub struct SecurityIncidentTool {
    sentinel: Arc<SentinelExecutor>,
}

impl SecurityIncidentTool {
    pub fn new(sentinel: Arc<SentinelExecutor>) -> Self {
        Self { sentinel }
    }

    async fn latest_incident(
        sentinel: Arc<SentinelExecutor>,
        lookback: Lookback,
    ) -> crate::Result<ToolOutcome> {
        let token = sentinel.access_token().await?;
        let incidents = sentinel.list_incidents(&token).await?;
        let Some(incident) = incidents.into_iter().next() else {
            info!("No incidents in the workspace");
            return Ok(ToolOutcome::message(NO_INCIDENTS_MESSAGE));
        };

        let name = incident_name(&incident)
            .ok_or_else(|| Error::UnexpectedResponse("incident has no name".to_string()))?
            .to_string();
        debug!("Using incident {}", name);

        let alerts = sentinel.list_incident_alerts(&token, &name).await?;
        info!("Incident {} has {} alert(s)", name, alerts.len());

        let query = queries::security_incident(&name, lookback)?;
        let outcome = sentinel.run_query(&token, query.as_str()).await?;

        Ok(ToolOutcome::Success(Success::Incident {
            incident,
            alerts,
            kql_query_result: QueryResult::from(outcome),
        }))
    }
}

impl RigTool for SecurityIncidentTool {
    const NAME: &'static str = "get_security_incident_table";

    type Error = ToolError;
    type Args = LookbackArgs;
    type Output = ToolOutcome;

    async fn definition(&self, _prompt: String) -> ToolDefinition {
        ToolDefinition {
            name: Self::NAME.to_string(),
            description: "Fetch the most recent Sentinel incident together with its alerts and its \
                          latest SecurityIncident table row."
                .to_string(),
            parameters: parameters_schema::<LookbackArgs>(),
        }
    }

    async fn call(&self, args: Self::Args) -> Result<Self::Output, Self::Error> {
        info!("{} called", Self::NAME);
        let sentinel = self.sentinel.clone();
        let joined = tokio::spawn(async move {
            let lookback = Lookback::from_optional(args.days)?;
            Self::latest_incident(sentinel, lookback).await
        })
        .await;
        Ok(settle(Self::NAME, joined))
    }
}
