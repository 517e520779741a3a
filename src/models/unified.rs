use anyhow::{Context as _, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

use super::traits::Model;
use super::types::{CompletionRequest, ModelResponse, TokenUsage};
use crate::app::ModelSettings;
use crate::constants::HTTP_REQUEST_TIMEOUT_SECS;
use crate::utils::InsightCacheError;

/// Model reached through an OpenAI-compatible proxy (LiteLLM)
///
/// The proxy handles provider routing and credentials, so every provider
/// goes through the same chat-completions call.
pub struct UnifiedModel {
    client: Client,
    proxy_url: String,
    model_name: String,
    master_key: Option<String>,
}

impl UnifiedModel {
    /// Create a model client from settings
    pub fn new(settings: &ModelSettings) -> Result<Self> {
        // Master key comes from the environment variable named in config
        let master_key = std::env::var(&settings.master_key_env).ok();

        Ok(Self {
            client: Client::builder()
                .timeout(Duration::from_secs(HTTP_REQUEST_TIMEOUT_SECS))
                .build()
                .context("Failed to build HTTP client")?,
            proxy_url: settings.proxy_url.trim_end_matches('/').to_string(),
            model_name: settings.name.clone(),
            master_key,
        })
    }

    pub fn proxy_url(&self) -> &str {
        &self.proxy_url
    }

    /// OpenAI-format request body
    fn request_body(&self, request: &CompletionRequest) -> Value {
        let mut body = json!({
            "model": self.model_name,
            "messages": request.messages,
            "stream": false,
        });

        if let Some(temp) = request.options.temperature {
            body["temperature"] = json!(temp);
        }
        if let Some(max_tokens) = request.options.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }
        if request.json_response {
            body["response_format"] = json!({ "type": "json_object" });
        }

        body
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.master_key {
            Some(key) => request.header("Authorization", format!("Bearer {}", key)),
            None => request,
        }
    }
}

#[async_trait]
impl Model for UnifiedModel {
    async fn complete(&self, request: &CompletionRequest) -> Result<ModelResponse> {
        let url = format!("{}/v1/chat/completions", self.proxy_url);
        let response = self
            .authorize(self.client.post(&url).json(&self.request_body(request)))
            .send()
            .await
            .with_context(|| format!("Failed to connect to model proxy at {}", self.proxy_url))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(InsightCacheError::ModelError(format!(
                "proxy returned {}: {}",
                status, error_text
            ))
            .into());
        }

        let completion: ChatCompletionResponse = response
            .json()
            .await
            .context("Failed to decode chat completion")?;
        parse_completion(completion, &self.model_name)
    }

    fn name(&self) -> &str {
        &self.model_name
    }

    async fn validate_connection(&self) -> Result<bool> {
        // Short timeout: this is a health check, not a generation
        let health_client = Client::builder()
            .timeout(Duration::from_secs(3))
            .build()?;

        let health_url = format!("{}/health", self.proxy_url);
        match self.authorize(health_client.get(&health_url)).send().await {
            Ok(response) => Ok(response.status().is_success()),
            Err(_) => Ok(false),
        }
    }
}

fn parse_completion(completion: ChatCompletionResponse, model_name: &str) -> Result<ModelResponse> {
    let content = completion
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .context("Model returned no choices")?;

    Ok(ModelResponse {
        content,
        usage: completion.usage.map(|u| TokenUsage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        }),
        model_name: model_name.to_string(),
    })
}

// Response structures for the proxy (OpenAI format)

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Debug, Deserialize)]
struct Message {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: usize,
    completion_tokens: usize,
    total_tokens: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::types::CompletionOptions;

    fn model() -> UnifiedModel {
        let settings = ModelSettings {
            proxy_url: "http://localhost:4000/".to_string(),
            ..ModelSettings::default()
        };
        UnifiedModel::new(&settings).unwrap()
    }

    #[test]
    fn test_request_body_shape() {
        let model = model();
        let request = CompletionRequest::prompt(
            "Summarize the board",
            CompletionOptions {
                temperature: Some(0.2),
                max_tokens: None,
            },
        )
        .expecting_json();

        let body = model.request_body(&request);
        assert_eq!(body["model"], json!(model.name()));
        assert_eq!(body["messages"][0]["role"], json!("user"));
        assert_eq!(body["messages"][0]["content"], json!("Summarize the board"));
        assert_eq!(body["response_format"]["type"], json!("json_object"));
        assert!(body.get("max_tokens").is_none());
        assert_eq!(model.proxy_url(), "http://localhost:4000");
    }

    #[test]
    fn test_parse_completion_takes_first_choice() {
        let raw = json!({
            "choices": [{ "message": { "content": "Focus on item 1." } }],
            "usage": { "prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15 }
        });
        let completion: ChatCompletionResponse = serde_json::from_value(raw).unwrap();
        let response = parse_completion(completion, "test/model").unwrap();

        assert_eq!(response.content, "Focus on item 1.");
        assert_eq!(response.usage.map(|u| u.total_tokens), Some(15));
    }

    #[test]
    fn test_parse_completion_without_choices_fails() {
        let completion: ChatCompletionResponse =
            serde_json::from_value(json!({ "choices": [] })).unwrap();
        assert!(parse_completion(completion, "test/model").is_err());
    }
}
