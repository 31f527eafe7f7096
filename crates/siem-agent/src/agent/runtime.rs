//! Agent Runtime
//!
//! Builds a Rig agent with the SIEM tools attached and runs prompts against it.

use rig::agent::AgentBuilder;
use rig::completion::{Chat, CompletionModel};
use rig::providers::{anthropic, openai};
use rig::tool::Tool as RigTool;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

use super::provider::{LLMConfig, ProviderKind};
use crate::executor::{DefenderExecutor, QueryBackend, SentinelExecutor};
use crate::tools::{
    AnalyzeIpEntityTool, CommonSecurityLogTool, DeviceEventsTool, DeviceInfoTool,
    DeviceLogonEventsTool, DeviceNetworkEventsTool, ExecuteKqlQueryTool, SecurityIncidentTool,
    SigninLogsTool, SyslogTool, TableSchemaTool,
};
use crate::{Error, Result};

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com";

pub const SYSTEM_INSTRUCTION: &str = "\
You are a security analyst working a SIEM investigation for a SOC team.
You have tools that query Microsoft Sentinel (Log Analytics) and Microsoft Defender for Endpoint.

Rules:
- Base every statement on data returned by the tools. Do not invent log entries, hosts or accounts.
- When a tool returns an error, report the error message and do not guess what the data would have been.
- \"Query returned no tables.\" means the query ran and found nothing.
- Prefer analyze_ip_entity when an investigation starts from an IP address, then drill into single tables.
- Check a table's columns with get_log_analytics_table_schema before writing your own KQL.
- If required information such as an IP address or time range is missing, ask for it.

Report concisely: what was queried, what was found, and what should be checked next.";

macro_rules! tool_types {
    ($($variant:ident($tool:ty)),+ $(,)?) => {
        /// Enum to store the different tool types
        #[derive(Clone)]
        pub enum ToolType {
            $($variant($tool)),+
        }

        $(
            impl From<$tool> for ToolType {
                fn from(tool: $tool) -> Self {
                    ToolType::$variant(tool)
                }
            }
        )+

        impl ToolType {
            pub fn name(&self) -> &'static str {
                match self {
                    $(ToolType::$variant(_) => <$tool as RigTool>::NAME),+
                }
            }

            fn attach<M: CompletionModel>(&self, builder: AgentBuilder<M>) -> AgentBuilder<M> {
                match self {
                    $(ToolType::$variant(tool) => builder.tool(tool.clone())),+
                }
            }
        }
    };
}

tool_types! {
    ExecuteKqlQuery(ExecuteKqlQueryTool),
    TableSchema(TableSchemaTool),
    SigninLogs(SigninLogsTool),
    CommonSecurityLog(CommonSecurityLogTool),
    Syslog(SyslogTool),
    SecurityIncident(SecurityIncidentTool),
    DeviceInfo(DeviceInfoTool),
    DeviceEvents(DeviceEventsTool),
    DeviceNetworkEvents(DeviceNetworkEventsTool),
    DeviceLogonEvents(DeviceLogonEventsTool),
    AnalyzeIpEntity(AnalyzeIpEntityTool),
}

/// Agent runtime for SIEM investigations
pub struct AgentRuntime {
    llm_config: LLMConfig,
    preamble: String,
    tools: BTreeMap<&'static str, ToolType>,
}

impl AgentRuntime {
    pub fn new(llm_config: LLMConfig) -> Result<Self> {
        // Fail on an unknown provider before any tool is registered
        llm_config.provider_kind()?;
        Ok(Self {
            llm_config,
            preamble: SYSTEM_INSTRUCTION.to_string(),
            tools: BTreeMap::new(),
        })
    }

    pub fn with_preamble(mut self, preamble: impl Into<String>) -> Self {
        self.preamble = preamble.into();
        self
    }

    /// Add a tool to the runtime, replacing one with the same name
    pub fn add_tool<T>(&mut self, tool: T)
    where
        T: Into<ToolType>,
    {
        let tool = tool.into();
        self.tools.insert(tool.name(), tool);
    }

    /// Register every Sentinel and Defender tool.
    pub fn with_siem_tools(
        mut self,
        sentinel: Arc<SentinelExecutor>,
        defender: Arc<DefenderExecutor>,
    ) -> Self {
        let sentinel_backend: Arc<dyn QueryBackend> = sentinel.clone();
        let defender_backend: Arc<dyn QueryBackend> = defender;

        self.add_tool(ExecuteKqlQueryTool::new(sentinel_backend.clone()));
        self.add_tool(TableSchemaTool::new(sentinel.clone()));
        self.add_tool(SigninLogsTool::new(sentinel_backend.clone()));
        self.add_tool(CommonSecurityLogTool::new(sentinel_backend.clone()));
        self.add_tool(SyslogTool::new(sentinel_backend.clone()));
        self.add_tool(SecurityIncidentTool::new(sentinel));
        self.add_tool(AnalyzeIpEntityTool::new(sentinel_backend));
        self.add_tool(DeviceInfoTool::new(defender_backend.clone()));
        self.add_tool(DeviceEventsTool::new(defender_backend.clone()));
        self.add_tool(DeviceNetworkEventsTool::new(defender_backend.clone()));
        self.add_tool(DeviceLogonEventsTool::new(defender_backend));
        self
    }

    /// Keep only the named tools.
    pub fn retain_tools(&mut self, names: &[String]) -> Result<()> {
        if let Some(unknown) = names
            .iter()
            .find(|name| !self.tools.contains_key(name.as_str()))
        {
            return Err(Error::Config(format!(
                "unknown tool '{}'; available: {}",
                unknown,
                self.tool_names().join(", ")
            )));
        }
        self.tools
            .retain(|name, _| names.iter().any(|wanted| wanted == name));
        Ok(())
    }

    pub fn tool_names(&self) -> Vec<&'static str> {
        self.tools.keys().copied().collect()
    }

    fn configure<M: CompletionModel>(&self, mut builder: AgentBuilder<M>) -> AgentBuilder<M> {
        builder = builder.preamble(&self.preamble);
        if let Some(temperature) = self.llm_config.temperature {
            builder = builder.temperature(f64::from(temperature));
        }
        if let Some(max_tokens) = self.llm_config.max_tokens {
            builder = builder.max_tokens(u64::from(max_tokens));
        }
        for (name, tool) in &self.tools {
            builder = tool.attach(builder);
            debug!("Added tool: {}", name);
        }
        builder
    }

    fn api_key(&self, env_var: &str) -> Result<String> {
        match &self.llm_config.api_key {
            Some(key) => Ok(key.clone()),
            None => std::env::var(env_var).map_err(|_| {
                Error::Config(format!("set LLM_API_KEY or {} to use this provider", env_var))
            }),
        }
    }

    /// Send one prompt to the agent and return its reply.
    pub async fn ask(&self, prompt: &str) -> Result<String> {
        let provider = self.llm_config.provider_kind()?;
        let model = self.llm_config.model_id();
        info!(
            "Running agent ({} / {}) with {} tool(s)",
            provider,
            model,
            self.tools.len()
        );
        debug!("Prompt: {}", prompt);

        match provider {
            ProviderKind::Anthropic => {
                let key = self.api_key("ANTHROPIC_API_KEY")?;
                let client = anthropic::Client::new(
                    &key,
                    ANTHROPIC_API_URL,
                    None,
                    anthropic::ANTHROPIC_VERSION_LATEST,
                );
                let agent = self.configure(client.agent(&model)).build();
                agent
                    .chat(prompt, vec![])
                    .await
                    .map_err(|e| Error::Agent(format!("Anthropic chat failed: {}", e)))
            }
            ProviderKind::OpenAI => {
                let key = self.api_key("OPENAI_API_KEY")?;
                let client = openai::Client::new(&key);
                let agent = self.configure(client.agent(&model)).build();
                agent
                    .chat(prompt, vec![])
                    .await
                    .map_err(|e| Error::Agent(format!("OpenAI chat failed: {}", e)))
            }
            ProviderKind::Mock => Ok(self.mock_reply(prompt)),
        }
    }

    fn mock_reply(&self, prompt: &str) -> String {
        let excerpt: String = prompt.chars().take(80).collect();
        format!(
            "Mock analysis of: {}\n\nNo tools were called. Available tools: {}",
            excerpt,
            self.tool_names().join(", ")
        )
    }
}
