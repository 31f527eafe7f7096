//! LLM Provider Configuration
//!
//! Selects the Rig provider an agent is built on.

use rig::providers::anthropic;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMConfig {
    pub provider: String,
    pub model: String,
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            provider: "anthropic".to_string(),
            model: "claude-3-5-sonnet".to_string(),
            api_key: None,
            temperature: Some(0.2),
            max_tokens: Some(4096),
        }
    }
}

impl LLMConfig {
    pub fn provider_kind(&self) -> Result<ProviderKind> {
        self.provider.parse()
    }

    /// Model identifier as the provider expects it.
    pub fn model_id(&self) -> String {
        match self.provider_kind() {
            Ok(ProviderKind::Anthropic) => anthropic_model_id(&self.model).to_string(),
            _ => self.model.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Anthropic,
    OpenAI,
    /// Canned replies without network access.
    Mock,
}

impl std::str::FromStr for ProviderKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "anthropic" | "claude" => Ok(ProviderKind::Anthropic),
            "openai" => Ok(ProviderKind::OpenAI),
            "mock" => Ok(ProviderKind::Mock),
            other => Err(Error::Config(format!(
                "unknown LLM provider '{}' (expected anthropic, openai or mock)",
                other
            ))),
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProviderKind::Anthropic => "anthropic",
            ProviderKind::OpenAI => "openai",
            ProviderKind::Mock => "mock",
        };
        f.write_str(name)
    }
}

/// Map short model aliases to Rig's model constants; other names pass through.
fn anthropic_model_id(model: &str) -> &str {
    match model {
        "claude-3-5-sonnet" => anthropic::CLAUDE_3_5_SONNET,
        "claude-3-7-sonnet" => anthropic::CLAUDE_3_7_SONNET,
        "claude-3-haiku" => anthropic::CLAUDE_3_HAIKU,
        "claude-3-opus" => anthropic::CLAUDE_3_OPUS,
        "claude-3-sonnet" => anthropic::CLAUDE_3_SONNET,
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_aliases() {
        assert_eq!("claude".parse::<ProviderKind>().unwrap(), ProviderKind::Anthropic);
        assert_eq!("OpenAI".parse::<ProviderKind>().unwrap(), ProviderKind::OpenAI);
        assert_eq!("mock".parse::<ProviderKind>().unwrap(), ProviderKind::Mock);
        assert!("gemini".parse::<ProviderKind>().is_err());
    }

    #[test]
    fn test_model_alias_mapping() {
        let config = LLMConfig::default();
        assert_eq!(config.model_id(), anthropic::CLAUDE_3_5_SONNET);

        let custom = LLMConfig {
            model: "claude-sonnet-4-0".to_string(),
            ..LLMConfig::default()
        };
        assert_eq!(custom.model_id(), "claude-sonnet-4-0");

        let openai = LLMConfig {
            provider: "openai".to_string(),
            model: "gpt-4o".to_string(),
            ..LLMConfig::default()
        };
        assert_eq!(openai.model_id(), "gpt-4o");
    }

    #[test]
    fn test_api_key_is_not_serialized() {
        let config = LLMConfig {
            api_key: Some("sk-secret".to_string()),
            ..LLMConfig::default()
        };
        let text = serde_json::to_string(&config).unwrap();
        assert!(!text.contains("sk-secret"));
    }
}
