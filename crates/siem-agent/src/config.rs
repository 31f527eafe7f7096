use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

use crate::agent::LLMConfig;

pub const DEFAULT_LOGIN_URL: &str = "https://login.microsoftonline.com";
pub const DEFAULT_MANAGEMENT_URL: &str = "https://management.azure.com";
pub const DEFAULT_DEFENDER_URL: &str = "https://api.securitycenter.microsoft.com";

/// OAuth2 client-credentials identity for one service principal.
#[derive(Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClientCredentials {
    pub tenant_id: String,
    pub client_id: String,
    #[serde(default, skip_serializing)]
    pub client_secret: String,
}

impl ClientCredentials {
    pub fn is_complete(&self) -> bool {
        !self.tenant_id.is_empty() && !self.client_id.is_empty() && !self.client_secret.is_empty()
    }
}

impl fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

/// Coordinates of a Log Analytics workspace.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkspaceConfig {
    pub subscription_id: String,
    pub resource_group_name: String,
    pub workspace_name: String,
}

impl WorkspaceConfig {
    pub fn is_complete(&self) -> bool {
        !self.subscription_id.is_empty()
            && !self.resource_group_name.is_empty()
            && !self.workspace_name.is_empty()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SentinelConfig {
    pub credentials: ClientCredentials,
    pub workspace: WorkspaceConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DefenderConfig {
    pub credentials: ClientCredentials,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    pub login_url: Url,
    pub management_url: Url,
    pub defender_url: Url,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            login_url: Url::parse(DEFAULT_LOGIN_URL).expect("default login URL is valid"),
            management_url: Url::parse(DEFAULT_MANAGEMENT_URL)
                .expect("default management URL is valid"),
            defender_url: Url::parse(DEFAULT_DEFENDER_URL).expect("default Defender URL is valid"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    pub timeout_seconds: u64,
    pub token_cache_enabled: bool,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 30,
            token_cache_enabled: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    pub sentinel: SentinelConfig,
    pub defender: DefenderConfig,
    pub endpoints: EndpointConfig,
    pub http: HttpConfig,
    pub llm: LLMConfig,
}

impl Config {
    pub fn load() -> crate::Result<Self> {
        // Load environment variables from .env file if it exists
        let _ = dotenvy::dotenv();

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> crate::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).unwrap_or_default();
        let defaults = Self::default();

        let config = Config {
            sentinel: SentinelConfig {
                credentials: ClientCredentials {
                    tenant_id: var("SENTINEL_TENANT_ID"),
                    client_id: var("SENTINEL_CLIENT_ID"),
                    client_secret: var("SENTINEL_CLIENT_SECRET"),
                },
                workspace: WorkspaceConfig {
                    subscription_id: var("SUBSCRIPTION_ID"),
                    resource_group_name: var("RESOURCE_GROUP_NAME"),
                    workspace_name: var("WORKSPACE_NAME"),
                },
            },
            defender: DefenderConfig {
                credentials: ClientCredentials {
                    tenant_id: var("MDE_TENANT_ID"),
                    client_id: var("MDE_CLIENT_ID"),
                    client_secret: var("MDE_CLIENT_SECRET"),
                },
            },
            endpoints: EndpointConfig {
                login_url: parse_url(
                    "AZURE_LOGIN_URL",
                    lookup("AZURE_LOGIN_URL"),
                    defaults.endpoints.login_url,
                )?,
                management_url: parse_url(
                    "AZURE_MANAGEMENT_URL",
                    lookup("AZURE_MANAGEMENT_URL"),
                    defaults.endpoints.management_url,
                )?,
                defender_url: parse_url(
                    "DEFENDER_API_URL",
                    lookup("DEFENDER_API_URL"),
                    defaults.endpoints.defender_url,
                )?,
            },
            http: HttpConfig {
                timeout_seconds: match lookup("HTTP_TIMEOUT_SECONDS") {
                    Some(raw) => raw.trim().parse().map_err(|_| {
                        crate::Error::Config(format!(
                            "HTTP_TIMEOUT_SECONDS must be a positive integer, got '{}'",
                            raw
                        ))
                    })?,
                    None => defaults.http.timeout_seconds,
                },
                token_cache_enabled: lookup("TOKEN_CACHE_ENABLED")
                    .map(|raw| parse_flag(&raw))
                    .unwrap_or(defaults.http.token_cache_enabled),
            },
            llm: LLMConfig {
                provider: lookup("LLM_PROVIDER").unwrap_or(defaults.llm.provider),
                model: lookup("LLM_MODEL").unwrap_or(defaults.llm.model),
                api_key: lookup("LLM_API_KEY").filter(|key| !key.is_empty()),
                ..defaults.llm
            },
        };

        if config.http.timeout_seconds == 0 {
            return Err(crate::Error::Config(
                "HTTP_TIMEOUT_SECONDS must be greater than zero".to_string(),
            ));
        }

        // Missing credentials are reported in-band by the tools, not here
        if !config.sentinel.credentials.is_complete() {
            tracing::warn!("Sentinel credentials are incomplete. Sentinel tools will fail to authenticate.");
        }
        if !config.sentinel.workspace.is_complete() {
            tracing::warn!("Log Analytics workspace coordinates are incomplete.");
        }
        if !config.defender.credentials.is_complete() {
            tracing::warn!("MDE credentials are incomplete. Defender tools will fail to authenticate.");
        }

        Ok(config)
    }
}

fn parse_url(key: &str, raw: Option<String>, default: Url) -> crate::Result<Url> {
    match raw {
        Some(raw) if !raw.trim().is_empty() => Url::parse(raw.trim()).map_err(|e| {
            crate::Error::Config(format!("{} is not a valid URL ('{}'): {}", key, raw, e))
        }),
        _ => Ok(default),
    }
}

fn parse_flag(raw: &str) -> bool {
    !matches!(
        raw.trim().to_lowercase().as_str(),
        "false" | "0" | "no" | "off"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_environment_is_empty() {
        let config = Config::from_lookup(|_| None).unwrap();
        assert_eq!(config.endpoints.login_url.as_str(), "https://login.microsoftonline.com/");
        assert_eq!(config.endpoints.management_url.as_str(), "https://management.azure.com/");
        assert_eq!(config.http.timeout_seconds, 30);
        assert!(config.http.token_cache_enabled);
        assert!(!config.sentinel.credentials.is_complete());
        assert_eq!(config.llm.provider, "anthropic");
    }

    #[test]
    fn test_reads_sentinel_and_mde_settings() {
        let config = Config::from_lookup(lookup_from(&[
            ("SENTINEL_TENANT_ID", "tenant"),
            ("SENTINEL_CLIENT_ID", "client"),
            ("SENTINEL_CLIENT_SECRET", "secret"),
            ("SUBSCRIPTION_ID", "sub"),
            ("RESOURCE_GROUP_NAME", "rg"),
            ("WORKSPACE_NAME", "ws"),
            ("MDE_TENANT_ID", "mde-tenant"),
            ("MDE_CLIENT_ID", "mde-client"),
            ("MDE_CLIENT_SECRET", "mde-secret"),
            ("TOKEN_CACHE_ENABLED", "false"),
            ("HTTP_TIMEOUT_SECONDS", "5"),
        ]))
        .unwrap();

        assert!(config.sentinel.credentials.is_complete());
        assert_eq!(config.sentinel.workspace.workspace_name, "ws");
        assert_eq!(config.defender.credentials.tenant_id, "mde-tenant");
        assert!(!config.http.token_cache_enabled);
        assert_eq!(config.http.timeout_seconds, 5);
    }

    #[test]
    fn test_invalid_url_is_a_config_error() {
        let err = Config::from_lookup(lookup_from(&[("AZURE_LOGIN_URL", "not a url")])).unwrap_err();
        assert!(matches!(err, crate::Error::Config(_)));
    }

    #[test]
    fn test_zero_timeout_is_rejected() {
        let err = Config::from_lookup(lookup_from(&[("HTTP_TIMEOUT_SECONDS", "0")])).unwrap_err();
        assert!(matches!(err, crate::Error::Config(_)));
    }

    #[test]
    fn test_debug_output_redacts_secret() {
        let creds = ClientCredentials {
            tenant_id: "t".to_string(),
            client_id: "c".to_string(),
            client_secret: "super-secret".to_string(),
        };
        let rendered = format!("{:?}", creds);
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("<redacted>"));
    }
}
