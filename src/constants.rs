/// Constants module to avoid magic numbers in the codebase

// Cache
pub const DEFAULT_CACHE_NAMESPACE: &str = "klaytic";
pub const INSIGHT_CACHE_KEY: &str = "insight";
pub const MOOD_CACHE_KEY: &str = "mood-message";
pub const CACHE_FILE_EXTENSION: &str = "entry";
pub const APP_DIR_NAME: &str = "insight-cache";

// Network Configuration
pub const DEFAULT_PROXY_URL: &str = "http://localhost:4000";
pub const DEFAULT_MASTER_KEY_ENV: &str = "LITELLM_MASTER_KEY";
pub const DEFAULT_MODEL_NAME: &str = "gemini/gemini-1.5-pro";

// Timeouts
pub const HTTP_REQUEST_TIMEOUT_SECS: u64 = 120;
pub const GENERATION_TIMEOUT_SECS: u64 = 60;

// Default Model Configuration
pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_MAX_TOKENS: usize = 1024;

// Mood message length hint passed to the model
pub const MOOD_MESSAGE_MAX_WORDS: usize = 20;
