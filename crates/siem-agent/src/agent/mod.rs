//! LLM Agent Runtime Module
//!
//! Attaches the SIEM tools to a Rig agent so a language model can run the
//! investigation.

pub mod provider;
pub mod runtime;

pub use provider::{LLMConfig, ProviderKind};
pub use runtime::{AgentRuntime, ToolType, SYSTEM_INSTRUCTION};
