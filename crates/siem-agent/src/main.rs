//! `siem-agent` command line.
//!
//! Asks the agent a question, or calls a single tool directly and prints its
//! outcome as JSON.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use rig::tool::Tool as RigTool;
use std::convert::Infallible;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use siem_agent::agent::AgentRuntime;
use siem_agent::config::Config;
use siem_agent::executor::{DefenderExecutor, QueryBackend, SentinelExecutor};
use siem_agent::http;
use siem_agent::kql::{queries, KqlQuery, Limit, Lookback, TableName};
use siem_agent::tools::{
    AnalyzeIpEntityTool, CommonSecurityLogTool, DeviceEventsTool, DeviceInfoTool,
    DeviceLogonEventsTool, DeviceNetworkEventsTool, ExecuteKqlQueryTool, IpLookupArgs,
    KqlQueryArgs, LookbackArgs, SecurityIncidentTool, SigninLogsTool, SyslogTool,
    TableSchemaArgs, TableSchemaTool, ToolOutcome,
};

#[derive(Parser)]
#[command(author, version, about = "SIEM investigation tools for LLM agents", long_about = None)]
struct Cli {
    /// Log level (debug, info, warn, error); RUST_LOG takes precedence
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask the agent a question; it decides which tools to call
    Ask {
        prompt: String,

        /// Provider to use (anthropic, openai, mock)
        #[arg(short, long)]
        provider: Option<String>,

        /// Model to use
        #[arg(short, long)]
        model: Option<String>,

        /// Only offer these tools to the agent
        #[arg(short, long, value_delimiter = ',')]
        tools: Vec<String>,
    },

    /// Run a KQL query as written
    Query {
        kql: String,

        /// Run against Defender advanced hunting instead of Sentinel
        #[arg(long)]
        defender: bool,
    },

    /// Show a Log Analytics table's columns
    Schema { table: String },

    /// Sign-ins from an IP address
    Signin {
        ip: String,
        #[arg(short, long)]
        days: Option<u32>,
    },

    /// Firewall and proxy logs for an IP address
    CommonSecurityLog {
        ip: String,
        #[arg(short, long)]
        days: Option<u32>,
    },

    /// Newest Syslog rows
    Syslog {
        #[arg(short, long)]
        days: Option<u32>,
    },

    /// Latest incident with its alerts
    Incident {
        #[arg(short, long)]
        days: Option<u32>,
    },

    /// Defender DeviceInfo for an IP address
    DeviceInfo {
        ip: String,
        #[arg(short, long)]
        days: Option<u32>,
    },

    /// Defender DeviceEvents for an IP address
    DeviceEvents {
        ip: String,
        #[arg(short, long)]
        days: Option<u32>,
    },

    /// Defender DeviceNetworkEvents for an IP address
    DeviceNetworkEvents {
        ip: String,
        #[arg(short, long)]
        days: Option<u32>,
    },

    /// Defender DeviceLogonEvents for an IP address
    DeviceLogonEvents {
        ip: String,
        #[arg(short, long)]
        days: Option<u32>,
    },

    /// Everything CommonSecurityLog, SigninLogs and Syslog hold for an IP address
    AnalyzeIp {
        ip: String,
        #[arg(short, long)]
        days: Option<u32>,
    },

    /// Print a generated query without running it
    Render {
        #[arg(value_enum)]
        builder: Builder,

        #[arg(long)]
        ip: Option<String>,

        #[arg(short, long)]
        days: Option<u32>,

        /// Incident name for security-incident
        #[arg(long)]
        incident: Option<String>,

        /// Table for table-sample
        #[arg(long)]
        table: Option<String>,

        /// Row limit for table-sample
        #[arg(long, default_value_t = 10)]
        limit: u32,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Builder {
    CommonSecurityLog,
    Signin,
    Syslog,
    SecurityIncident,
    DeviceInfo,
    DeviceEvents,
    DeviceNetworkEvents,
    DeviceLogonEvents,
    IpEntity,
    TableSample,
}

fn outcome(result: std::result::Result<ToolOutcome, Infallible>) -> ToolOutcome {
    match result {
        Ok(outcome) => outcome,
        Err(never) => match never {},
    }
}

fn ip_args(ip: String, days: Option<u32>) -> IpLookupArgs {
    IpLookupArgs {
        ip_address: ip,
        days,
    }
}

fn render(
    builder: Builder,
    ip: Option<String>,
    days: Option<u32>,
    incident: Option<String>,
    table: Option<String>,
    limit: u32,
) -> Result<KqlQuery> {
    let lookback = Lookback::from_optional(days)?;
    let require_ip = || ip.clone().context("--ip is required for this builder");

    let query = match builder {
        Builder::CommonSecurityLog => queries::common_security_log(&require_ip()?, lookback)?,
        Builder::Signin => queries::signin_logs(&require_ip()?, lookback)?,
        Builder::Syslog => queries::syslog(lookback)?,
        Builder::SecurityIncident => {
            let incident = incident.context("--incident is required for security-incident")?;
            queries::security_incident(&incident, lookback)?
        }
        Builder::DeviceInfo => queries::device_info(&require_ip()?, lookback)?,
        Builder::DeviceEvents => queries::device_events(&require_ip()?, lookback)?,
        Builder::DeviceNetworkEvents => queries::device_network_events(&require_ip()?, lookback)?,
        Builder::DeviceLogonEvents => queries::device_logon_events(&require_ip()?, lookback)?,
        Builder::IpEntity => queries::ip_entity(&require_ip()?, lookback)?,
        Builder::TableSample => {
            let table = table.context("--table is required for table-sample")?;
            queries::table_sample(&TableName::new(&table)?, Limit::new(limit)?)?
        }
    };
    Ok(query)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("siem_agent={},warn", cli.log_level)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let command = match cli.command {
        Commands::Render {
            builder,
            ip,
            days,
            incident,
            table,
            limit,
        } => {
            let query = render(builder, ip, days, incident, table, limit)?;
            println!("{}", query);
            return Ok(());
        }
        command => command,
    };

    let mut config = Config::load().context("failed to load configuration")?;
    let client = http::build_client(&config.http)?;
    let sentinel = Arc::new(SentinelExecutor::with_client(&config, client.clone()));
    let defender = Arc::new(DefenderExecutor::with_client(&config, client));
    let sentinel_backend: Arc<dyn QueryBackend> = sentinel.clone();
    let defender_backend: Arc<dyn QueryBackend> = defender.clone();

    let result = match command {
        Commands::Ask {
            prompt,
            provider,
            model,
            tools,
        } => {
            if let Some(provider) = provider {
                config.llm.provider = provider;
            }
            if let Some(model) = model {
                config.llm.model = model;
            }
            let mut runtime = AgentRuntime::new(config.llm.clone())?.with_siem_tools(sentinel, defender);
            if !tools.is_empty() {
                runtime.retain_tools(&tools)?;
            }
            info!("Asking agent with tools: {}", runtime.tool_names().join(", "));
            let reply = runtime.ask(&prompt).await?;
            println!("{}", reply);
            return Ok(());
        }
        Commands::Query { kql, defender } => {
            let backend = if defender {
                defender_backend
            } else {
                sentinel_backend
            };
            outcome(
                ExecuteKqlQueryTool::new(backend)
                    .call(KqlQueryArgs { kql_query: kql })
                    .await,
            )
        }
        Commands::Schema { table } => outcome(
            TableSchemaTool::new(sentinel)
                .call(TableSchemaArgs { table_name: table })
                .await,
        ),
        Commands::Signin { ip, days } => {
            outcome(SigninLogsTool::new(sentinel_backend).call(ip_args(ip, days)).await)
        }
        Commands::CommonSecurityLog { ip, days } => outcome(
            CommonSecurityLogTool::new(sentinel_backend)
                .call(ip_args(ip, days))
                .await,
        ),
        Commands::Syslog { days } => {
            outcome(SyslogTool::new(sentinel_backend).call(LookbackArgs { days }).await)
        }
        Commands::Incident { days } => outcome(
            SecurityIncidentTool::new(sentinel)
                .call(LookbackArgs { days })
                .await,
        ),
        Commands::DeviceInfo { ip, days } => {
            outcome(DeviceInfoTool::new(defender_backend).call(ip_args(ip, days)).await)
        }
        Commands::DeviceEvents { ip, days } => {
            outcome(DeviceEventsTool::new(defender_backend).call(ip_args(ip, days)).await)
        }
        Commands::DeviceNetworkEvents { ip, days } => outcome(
            DeviceNetworkEventsTool::new(defender_backend)
                .call(ip_args(ip, days))
                .await,
        ),
        Commands::DeviceLogonEvents { ip, days } => outcome(
            DeviceLogonEventsTool::new(defender_backend)
                .call(ip_args(ip, days))
                .await,
        ),
        Commands::AnalyzeIp { ip, days } => outcome(
            AnalyzeIpEntityTool::new(sentinel_backend)
                .call(ip_args(ip, days))
                .await,
        ),
        Commands::Render { .. } => unreachable!("handled before configuration is loaded"),
    };

    println!("{}", serde_json::to_string_pretty(&result)?);
    if !result.is_success() {
        std::process::exit(1);
    }
    Ok(())
}
