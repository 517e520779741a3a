use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE};

/// Role of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

/// A single message in a completion request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }
}

/// Sampling parameters shared by every request a generator sends
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompletionOptions {
    pub temperature: Option<f32>,
    pub max_tokens: Option<usize>,
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self {
            temperature: Some(DEFAULT_TEMPERATURE),
            max_tokens: Some(DEFAULT_MAX_TOKENS),
        }
    }
}

/// One round-trip to the model
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub options: CompletionOptions,
    /// Ask the provider for a JSON object response
    pub json_response: bool,
}

impl CompletionRequest {
    pub fn prompt(prompt: impl Into<String>, options: CompletionOptions) -> Self {
        Self {
            messages: vec![ChatMessage::user(prompt)],
            options,
            json_response: false,
        }
    }

    pub fn expecting_json(mut self) -> Self {
        self.json_response = true;
        self
    }
}

/// Response from a model
#[derive(Debug, Clone, PartialEq)]
pub struct ModelResponse {
    /// The actual response text
    pub content: String,
    /// Usage statistics if available
    pub usage: Option<TokenUsage>,
    /// Model that generated the response
    pub model_name: String,
}

/// Token usage statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenUsage {
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
    pub total_tokens: usize,
}
