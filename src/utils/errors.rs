use thiserror::Error;

/// Setup and configuration errors for insight-cache
#[derive(Error, Debug)]
pub enum InsightCacheError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Task file error: {0}")]
    TaskFileError(String),

    #[error("Model error: {0}")]
    ModelError(String),
}
