//! Ollama API provider.
//!
//! Calls `POST {host}/api/chat` with an Ollama-native request format.
//!
//! Key differences from Anthropic:
//! - System prompt is sent as a `role: "system"` message (not a top-level field).
//! - JSON mode is native: `format: "json"` constrains the reply to one object.
//! - Sampling settings live under `options` (`temperature`, `num_predict`).
//! - Token usage: `prompt_eval_count` / `eval_count` (may be absent).
//! - Must set `stream: false` for synchronous responses.

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::client::LlmClient;
use super::{CompletionOptions, LlmResponse, Message};
use crate::config::LlmConfig;

/// Default Ollama API base URL.
const DEFAULT_OLLAMA_HOST: &str = "http://localhost:11434";

// ── Ollama API request types ─────────────────────────────

/// Ollama `/api/chat` request body.
#[derive(Debug, Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<Message>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<String>,
    options: OllamaOptions,
}

/// Ollama generation options.
#[derive(Debug, Serialize)]
struct OllamaOptions {
    num_predict: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

// ── Ollama API response types ────────────────────────────

/// Ollama `/api/chat` response.
#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: OllamaResponseMessage,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
}

/// Message in an Ollama response.
#[derive(Debug, Deserialize)]
struct OllamaResponseMessage {
    content: String,
}

// ── OllamaClient ────────────────────────────────────────

/// Client for the Ollama API.
pub struct OllamaClient {
    client: Client,
    config: LlmConfig,
    host: String,
}

impl OllamaClient {
    /// Creates a new Ollama client from configuration.
    ///
    /// If `config.host` is `None`, defaults to `http://localhost:11434`.
    pub fn new(config: LlmConfig) -> Self {
        let host = config
            .host
            .clone()
            .unwrap_or_else(|| DEFAULT_OLLAMA_HOST.to_string());
        // Strip trailing slash for consistent URL construction
        let host = host.trim_end_matches('/').to_string();
        Self {
            client: Client::new(),
            config,
            host,
        }
    }

    fn build_request(
        &self,
        system_prompt: &str,
        messages: &[Message],
        options: CompletionOptions,
    ) -> OllamaChatRequest {
        let mut ollama_messages = Vec::with_capacity(messages.len() + 1);
        if !system_prompt.is_empty() {
            ollama_messages.push(Message {
                role: "system".to_string(),
                content: system_prompt.to_string(),
            });
        }
        ollama_messages.extend_from_slice(messages);

        OllamaChatRequest {
            model: self.config.model.clone(),
            messages: ollama_messages,
            stream: false,
            format: options.json.then(|| "json".to_string()),
            options: OllamaOptions {
                num_predict: self.config.max_tokens_per_request,
                temperature: options.temperature,
            },
        }
    }
}

#[async_trait]
impl LlmClient for OllamaClient {
    async fn complete(
        &self,
        system_prompt: &str,
        messages: &[Message],
        options: CompletionOptions,
    ) -> Result<LlmResponse> {
        let request = self.build_request(system_prompt, messages, options);
        let url = format!("{}/api/chat", self.host);

        debug!(
            "Calling Ollama API ({}) with {} messages{}",
            self.config.model,
            messages.len(),
            if options.json { " (json)" } else { "" }
        );

        let response = self.client.post(&url).json(&request).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Ollama API error ({status}): {body}");
        }

        let resp: OllamaChatResponse = response.json().await?;

        let input_tokens = resp.prompt_eval_count.unwrap_or(0);
        let output_tokens = resp.eval_count.unwrap_or(0);

        info!("LLM response: {input_tokens} in / {output_tokens} out tokens");

        Ok(LlmResponse {
            text: resp.message.content,
            input_tokens,
            output_tokens,
        })
    }

    fn description(&self) -> String {
        format!("{} ({})", self.config.provider, self.config.model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(host: Option<&str>) -> LlmConfig {
        LlmConfig {
            provider: "ollama".to_string(),
            model: "llama3.2".to_string(),
            api_key: String::new(),
            max_tokens_per_request: 4096,
            host: host.map(String::from),
        }
    }

    // ── OllamaClient::description() ─────────────────────

    #[test]
    fn test_description() {
        let client = OllamaClient::new(config(None));
        assert_eq!(client.description(), "ollama (llama3.2)");
    }

    #[test]
    fn test_default_host() {
        let client = OllamaClient::new(config(None));
        assert_eq!(client.host, "http://localhost:11434");
    }

    #[test]
    fn test_custom_host() {
        let client = OllamaClient::new(config(Some("http://myserver:11434/")));
        // Trailing slash should be stripped
        assert_eq!(client.host, "http://myserver:11434");
    }

    // ── Request serialization ────────────────────────────

    #[test]
    fn test_request_system_prompt_first() {
        let client = OllamaClient::new(config(None));
        let request = client.build_request(
            "You generate commands.",
            &[Message::user("List files")],
            CompletionOptions::default(),
        );
        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.messages[0].role, "system");
        assert_eq!(request.messages[0].content, "You generate commands.");
        assert_eq!(request.messages[1].role, "user");
    }

    #[test]
    fn test_request_empty_system_prompt_omitted() {
        let client = OllamaClient::new(config(None));
        let request =
            client.build_request("", &[Message::user("hi")], CompletionOptions::default());
        assert_eq!(request.messages.len(), 1);
        assert_eq!(request.messages[0].role, "user");
    }

    #[test]
    fn test_request_serialization_json_mode() {
        let client = OllamaClient::new(config(None));
        let request = client.build_request("", &[], CompletionOptions::json(0.0));
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "llama3.2");
        assert_eq!(json["stream"], false);
        assert_eq!(json["format"], "json");
        assert_eq!(json["options"]["num_predict"], 4096);
        assert_eq!(json["options"]["temperature"], 0.0);
    }

    #[test]
    fn test_request_serialization_plain_mode() {
        let client = OllamaClient::new(config(None));
        let request = client.build_request("", &[], CompletionOptions::default());
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("format").is_none());
        assert!(json["options"].get("temperature").is_none());
    }

    // ── Response parsing ─────────────────────────────────

    #[test]
    fn test_response_parsing() {
        let json = r#"{
            "message": {"role": "assistant", "content": "{\"command\": \"ls -la\"}"},
            "done_reason": "stop",
            "prompt_eval_count": 100,
            "eval_count": 50
        }"#;
        let resp: OllamaChatResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.message.content, "{\"command\": \"ls -la\"}");
        assert_eq!(resp.prompt_eval_count, Some(100));
        assert_eq!(resp.eval_count, Some(50));
    }

    #[test]
    fn test_response_parsing_missing_optional_fields() {
        let json = r#"{
            "message": {"role": "assistant", "content": "Hi!"}
        }"#;
        let resp: OllamaChatResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.message.content, "Hi!");
        assert!(resp.prompt_eval_count.is_none());
        assert!(resp.eval_count.is_none());
    }
}
