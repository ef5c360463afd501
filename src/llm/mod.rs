pub mod anthropic;
pub mod client;
pub mod ollama;

use serde::{Deserialize, Serialize};

pub use anthropic::AnthropicClient;
pub use client::LlmClient;
pub use ollama::OllamaClient;

/// A single conversation turn.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// Per-call generation settings.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CompletionOptions {
    pub temperature: Option<f32>,
    /// Ask the backend to constrain output to a JSON object, where supported.
    pub json: bool,
}

impl CompletionOptions {
    pub fn json(temperature: f32) -> Self {
        Self {
            temperature: Some(temperature),
            json: true,
        }
    }
}

/// LLM response with metadata
#[derive(Debug)]
pub struct LlmResponse {
    pub text: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
}
