// Gateway module for models - follows the Train Station Pattern
// All external access must go through this gateway

// Private submodules - not directly accessible from outside
mod timeout;
mod traits;
mod types;
mod unified;

// Public re-exports - the ONLY way to access model functionality
pub use timeout::TimeoutGenerator;
pub use traits::Model;
pub use types::{
    ChatMessage, CompletionOptions, CompletionRequest, MessageRole, ModelResponse, TokenUsage,
};
pub use unified::UnifiedModel;
