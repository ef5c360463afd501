//! `LlmClient` trait: abstraction over LLM backends.
//!
//! Providers (Ollama, Anthropic) implement this trait so the oracles
//! can be configured to use any supported backend via the
//! `[llm] provider` config field.

use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;

use super::{AnthropicClient, CompletionOptions, LlmResponse, Message, OllamaClient};
use crate::config::LlmConfig;

/// Abstraction over LLM backends (Ollama, Anthropic).
///
/// Each provider translates the shared message type into its own
/// wire format and normalizes responses back into [`LlmResponse`].
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Sends a conversation to the LLM and returns the response.
    async fn complete(
        &self,
        system_prompt: &str,
        messages: &[Message],
        options: CompletionOptions,
    ) -> Result<LlmResponse>;

    /// Human-readable description of the provider and model.
    ///
    /// Used in status output, e.g. `"ollama (qwen2.5-coder:7b)"`.
    fn description(&self) -> String;
}

/// Builds the client named by `config.provider`.
pub fn from_config(config: &LlmConfig) -> Result<Arc<dyn LlmClient>> {
    match config.provider.as_str() {
        "ollama" => Ok(Arc::new(OllamaClient::new(config.clone()))),
        "anthropic" => {
            if config.api_key.is_empty() {
                bail!("llm.api_key is required for the anthropic provider");
            }
            Ok(Arc::new(AnthropicClient::new(config.clone())))
        }
        other => bail!("Unknown LLM provider: {other} (expected \"ollama\" or \"anthropic\")"),
    }
}
