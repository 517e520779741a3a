use anyhow::Result;
use async_trait::async_trait;

use super::types::{CompletionRequest, ModelResponse};

/// Core trait that all model backends must implement
#[async_trait]
pub trait Model: Send + Sync {
    /// Send a completion request and wait for the full response
    async fn complete(&self, request: &CompletionRequest) -> Result<ModelResponse>;

    /// Get the name of the model
    fn name(&self) -> &str;

    /// Validate that the model is accessible
    async fn validate_connection(&self) -> Result<bool> {
        Ok(true)
    }
}
