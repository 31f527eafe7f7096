//! Per-table query builders.
//!
//! Every IP-keyed query binds its parameters once with `let` at the top and
//! the filters refer to the bound names, so a supplied value appears exactly
//! once in the query text.

use super::template::{render, KqlParams};
use super::value::{Limit, Lookback, TableName};
use super::KqlQuery;
use crate::{Error, Result};

const COMMON_SECURITY_LOG: &str = r#"
let target_ip = {{ target_ip }};
let from_day = ago({{ lookback }});
CommonSecurityLog
| where TimeGenerated >= from_day
| where SourceIP == target_ip or DestinationIP == target_ip
| sort by TimeGenerated desc
| take {{ limit }}
"#;

const SIGNIN_LOGS: &str = r#"
let target_ip = {{ target_ip }};
let from_day = ago({{ lookback }});
SigninLogs
| where TimeGenerated >= from_day
| where IPAddress contains target_ip
| sort by TimeGenerated desc
"#;

const SYSLOG: &str = r#"
let from_day = ago({{ lookback }});
Syslog
| where TimeGenerated >= from_day
| sort by TimeGenerated desc
| take {{ limit }}
"#;

const SECURITY_INCIDENT: &str = r#"
let target_incident = {{ incident_name }};
let from_day = ago({{ lookback }});
SecurityIncident
| where TimeGenerated >= from_day
| where IncidentName == target_incident
| summarize arg_max(TimeGenerated, *) by IncidentName
"#;

const DEVICE_INFO: &str = r#"
let target_ip = {{ target_ip }};
let from_day = ago({{ lookback }});
DeviceInfo
| where Timestamp >= from_day
| where IPAddresses contains target_ip
| sort by Timestamp desc
"#;

const DEVICE_EVENTS: &str = r#"
let target_ip = {{ target_ip }};
let from_day = ago({{ lookback }});
DeviceEvents
| where Timestamp >= from_day
| where RemoteIP == target_ip or LocalIP == target_ip
| sort by Timestamp desc
"#;

const DEVICE_NETWORK_EVENTS: &str = r#"
let target_ip = {{ target_ip }};
let from_day = ago({{ lookback }});
DeviceNetworkEvents
| where Timestamp >= from_day
| where RemoteIP == target_ip or LocalIP == target_ip
| sort by Timestamp desc
"#;

const DEVICE_LOGON_EVENTS: &str = r#"
let target_ip = {{ target_ip }};
let from_day = ago({{ lookback }});
DeviceLogonEvents
| where Timestamp >= from_day
| where RemoteIP == target_ip
| sort by Timestamp desc
"#;

const IP_ENTITY: &str = r#"
let target_ip = {{ target_ip }};
let from_day = ago({{ lookback }});

let CommonSecurityLogPart =
    CommonSecurityLog
    | where TimeGenerated >= from_day
    | where SourceIP == target_ip or DestinationIP == target_ip or RemoteIP == target_ip;

let SigninLogsPart =
    SigninLogs
    | where TimeGenerated >= from_day
    | where IPAddress == target_ip;

let SyslogPart =
    Syslog
    | where TimeGenerated >= from_day
    | where SyslogMessage has target_ip or Computer has target_ip;

CommonSecurityLogPart
| union SigninLogsPart, SyslogPart
| sort by TimeGenerated desc
"#;

const TABLE_SAMPLE: &str = r#"
{{ table }}
| take {{ limit }}
"#;

fn build(template: &str, params: KqlParams, tables: &[&str]) -> Result<KqlQuery> {
    let text = render(template, &params)?;
    Ok(KqlQuery::new(
        text,
        tables.iter().map(|table| table.to_string()).collect(),
    ))
}

/// A blank address would turn `contains` filters into match-all.
fn ip_params(ip_address: &str, lookback: Lookback) -> Result<KqlParams> {
    let ip_address = ip_address.trim();
    if ip_address.is_empty() {
        return Err(Error::Validation("ip_address must not be empty".to_string()));
    }
    Ok(KqlParams::new()
        .bind("target_ip", ip_address)
        .bind("lookback", lookback))
}

/// Third-party network appliance logs (firewalls, proxies) exchanged with `ip_address`.
pub fn common_security_log(ip_address: &str, lookback: Lookback) -> Result<KqlQuery> {
    build(
        COMMON_SECURITY_LOG,
        ip_params(ip_address, lookback)?.bind("limit", Limit::default()),
        &["CommonSecurityLog"],
    )
}

/// Entra ID sign-ins whose client address contains `ip_address`, newest first.
pub fn signin_logs(ip_address: &str, lookback: Lookback) -> Result<KqlQuery> {
    build(SIGNIN_LOGS, ip_params(ip_address, lookback)?, &["SigninLogs"])
}

pub fn syslog(lookback: Lookback) -> Result<KqlQuery> {
    build(
        SYSLOG,
        KqlParams::new()
            .bind("lookback", lookback)
            .bind("limit", Limit::default()),
        &["Syslog"],
    )
}

/// Latest state of one incident from the `SecurityIncident` table.
pub fn security_incident(incident_name: &str, lookback: Lookback) -> Result<KqlQuery> {
    build(
        SECURITY_INCIDENT,
        KqlParams::new()
            .bind("incident_name", incident_name)
            .bind("lookback", lookback),
        &["SecurityIncident"],
    )
}

pub fn device_info(ip_address: &str, lookback: Lookback) -> Result<KqlQuery> {
    build(DEVICE_INFO, ip_params(ip_address, lookback)?, &["DeviceInfo"])
}

pub fn device_events(ip_address: &str, lookback: Lookback) -> Result<KqlQuery> {
    build(DEVICE_EVENTS, ip_params(ip_address, lookback)?, &["DeviceEvents"])
}

pub fn device_network_events(ip_address: &str, lookback: Lookback) -> Result<KqlQuery> {
    build(
        DEVICE_NETWORK_EVENTS,
        ip_params(ip_address, lookback)?,
        &["DeviceNetworkEvents"],
    )
}

pub fn device_logon_events(ip_address: &str, lookback: Lookback) -> Result<KqlQuery> {
    build(
        DEVICE_LOGON_EVENTS,
        ip_params(ip_address, lookback)?,
        &["DeviceLogonEvents"],
    )
}

/// Everything `CommonSecurityLog`, `SigninLogs` and `Syslog` recorded about
/// `ip_address`, merged into one result in a single round trip.
pub fn ip_entity(ip_address: &str, lookback: Lookback) -> Result<KqlQuery> {
    build(
        IP_ENTITY,
        ip_params(ip_address, lookback)?,
        &["CommonSecurityLog", "SigninLogs", "Syslog"],
    )
}

pub fn table_sample(table: &TableName, limit: Limit) -> Result<KqlQuery> {
    build(
        TABLE_SAMPLE,
        KqlParams::new()
            .bind("table", table.clone())
            .bind("limit", limit),
        &[table.as_str()],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kql::parse::source_tables;

    const IP: &str = "34.99.24.149";

    #[test]
    fn test_signin_query_scenario() {
        let query = signin_logs(IP, Lookback::default()).unwrap();
        let text = query.as_str();
        assert!(text.contains("SigninLogs"));
        assert!(text.contains("ago(7d)"));
        assert!(text.contains(IP));
        assert!(text.contains("| where IPAddress contains target_ip"));
    }

    #[test]
    fn test_ip_entity_binds_ip_once_and_filters_every_source() {
        let query = ip_entity(IP, Lookback::days(3).unwrap()).unwrap();
        let text = query.as_str();

        assert_eq!(text.matches(IP).count(), 1);
        assert!(text.contains(&format!("let target_ip = \"{}\";", IP)));
        assert!(text.contains("let from_day = ago(3d);"));
        assert_eq!(text.matches("ago(").count(), 1);

        for part in ["CommonSecurityLogPart", "SigninLogsPart", "SyslogPart"] {
            let start = text.find(&format!("let {} =", part)).unwrap();
            let end = start + text[start..].find(';').unwrap();
            let body = &text[start..end];
            assert!(body.contains("target_ip"), "{} does not filter on the IP", part);
            assert!(body.contains("from_day"), "{} ignores the lookback", part);
        }
    }

    #[test]
    fn test_identical_parameters_give_identical_queries() {
        let first = ip_entity(IP, Lookback::default()).unwrap();
        let second = ip_entity(IP, Lookback::default()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_hostile_ip_stays_inside_the_literal() {
        let hostile = "1.2.3.4\";\nSecurityAlert | take 100000; let x = \"";
        let query = signin_logs(hostile, Lookback::default()).unwrap();
        assert_eq!(query.as_str().lines().count(), 6);
        assert_eq!(source_tables(query.as_str()), vec!["SigninLogs"]);
    }

    #[test]
    fn test_template_fidelity_for_every_builder() {
        let lookback = Lookback::default();
        let table = TableName::new("MyApp_CL").unwrap();
        let queries = vec![
            common_security_log(IP, lookback).unwrap(),
            signin_logs(IP, lookback).unwrap(),
            syslog(lookback).unwrap(),
            security_incident("73e01a99-5cd7-4139-a149-9f2736ff2ab5", lookback).unwrap(),
            device_info(IP, lookback).unwrap(),
            device_events(IP, lookback).unwrap(),
            device_network_events(IP, lookback).unwrap(),
            device_logon_events(IP, lookback).unwrap(),
            ip_entity(IP, lookback).unwrap(),
            table_sample(&table, Limit::new(5).unwrap()).unwrap(),
        ];

        for query in queries {
            assert_eq!(
                source_tables(query.as_str()),
                query.tables(),
                "round trip failed for:\n{}",
                query
            );
        }
    }

    #[test]
    fn test_common_security_log_uses_exact_match() {
        let query = common_security_log(IP, Lookback::default()).unwrap();
        assert!(query
            .as_str()
            .contains("| where SourceIP == target_ip or DestinationIP == target_ip"));
        assert!(query.as_str().ends_with("| take 10"));
    }

    #[test]
    fn test_table_sample() {
        let table = TableName::new("Syslog").unwrap();
        let query = table_sample(&table, Limit::new(3).unwrap()).unwrap();
        assert_eq!(query.as_str(), "Syslog\n| take 3");
    }

    #[test]
    fn test_blank_ip_is_rejected() {
        for blank in ["", "   ", "\t\n"] {
            let err = signin_logs(blank, Lookback::default()).unwrap_err();
            assert!(matches!(err, Error::Validation(_)));
        }
        assert!(ip_entity("", Lookback::default()).is_err());
        assert!(device_info(" ", Lookback::default()).is_err());
    }

    #[test]
    fn test_surrounding_whitespace_is_trimmed() {
        let query = signin_logs("  34.99.24.149 ", Lookback::default()).unwrap();
        assert!(query.as_str().contains("let target_ip = \"34.99.24.149\";"));
    }

    #[test]
    fn test_defender_queries_use_timestamp_column() {
        for query in [
            device_info(IP, Lookback::default()).unwrap(),
            device_events(IP, Lookback::default()).unwrap(),
            device_network_events(IP, Lookback::default()).unwrap(),
            device_logon_events(IP, Lookback::default()).unwrap(),
        ] {
            assert!(query.as_str().contains("| where Timestamp >= from_day"));
            assert!(!query.as_str().contains("TimeGenerated"));
        }
    }
}
