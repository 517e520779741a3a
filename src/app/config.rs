use anyhow::{Context, Result};
use directories::ProjectDirs;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cache::{Encoding, PendingPolicy};
use crate::constants::{
    APP_DIR_NAME, DEFAULT_CACHE_NAMESPACE, DEFAULT_MASTER_KEY_ENV, DEFAULT_MAX_TOKENS,
    DEFAULT_MODEL_NAME, DEFAULT_PROXY_URL, DEFAULT_TEMPERATURE, GENERATION_TIMEOUT_SECS,
};
use crate::models::CompletionOptions;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Cache storage configuration
    #[serde(default)]
    pub cache: CacheSettings,

    /// Model configuration
    #[serde(default)]
    pub model: ModelSettings,
}

/// Where cache entries live
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// One file per entry under the cache directory
    #[default]
    File,
    /// Process memory only
    Memory,
}

/// Cache settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Prefix for every stored key
    pub namespace: String,
    pub backend: BackendKind,
    /// Cache directory override for the file backend
    pub dir: Option<PathBuf>,
    pub encoding: Encoding,
    /// Behavior when the same generation is already running
    pub pending: PendingPolicy,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_CACHE_NAMESPACE.to_string(),
            backend: BackendKind::default(),
            dir: None,
            encoding: Encoding::default(),
            pending: PendingPolicy::default(),
        }
    }
}

impl CacheSettings {
    /// Cache directory for the file backend
    pub fn resolved_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.dir {
            return Ok(dir.clone());
        }
        // ~/.cache/insight-cache on Linux, ~/Library/Caches/insight-cache on macOS
        if let Some(proj_dirs) = ProjectDirs::from("", "", APP_DIR_NAME) {
            Ok(proj_dirs.cache_dir().to_path_buf())
        } else {
            let home = std::env::var("HOME").context("Could not determine home directory")?;
            Ok(PathBuf::from(home).join(".cache").join(APP_DIR_NAME))
        }
    }
}

/// Model settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    /// Model identifier as the proxy knows it (provider/model)
    pub name: String,
    /// Base URL of the OpenAI-compatible proxy
    pub proxy_url: String,
    /// Environment variable holding the proxy master key
    pub master_key_env: String,
    pub temperature: f32,
    pub max_tokens: usize,
    /// Per-generation timeout in seconds
    pub timeout_secs: u64,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            name: DEFAULT_MODEL_NAME.to_string(),
            proxy_url: DEFAULT_PROXY_URL.to_string(),
            master_key_env: DEFAULT_MASTER_KEY_ENV.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            timeout_secs: GENERATION_TIMEOUT_SECS,
        }
    }
}

impl ModelSettings {
    pub fn completion_options(&self) -> CompletionOptions {
        CompletionOptions {
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_tokens),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Configuration sources in increasing precedence
fn figment(explicit: Option<&Path>) -> Result<Figment> {
    let global_config = get_config_dir()?.join("config.toml");
    let local_config = PathBuf::from(".insight-cache/config.toml");

    let mut figment = Figment::from(Serialized::defaults(Config::default()));

    if global_config.exists() {
        figment = figment.merge(Toml::file(&global_config));
    }
    if local_config.exists() {
        figment = figment.merge(Toml::file(&local_config));
    }
    if let Some(path) = explicit {
        if !path.exists() {
            anyhow::bail!("Config file not found: {}", path.display());
        }
        figment = figment.merge(Toml::file(path));
    }

    // INSIGHT_CACHE_CACHE__NAMESPACE=... sets cache.namespace
    Ok(figment.merge(Env::prefixed("INSIGHT_CACHE_").split("__")))
}

/// Load configuration from multiple sources
pub fn load_config(explicit: Option<&Path>) -> Result<Config> {
    figment(explicit)?
        .extract()
        .context("Failed to load configuration")
}

/// Get the configuration directory
pub fn get_config_dir() -> Result<PathBuf> {
    if let Some(proj_dirs) = ProjectDirs::from("", "", APP_DIR_NAME) {
        Ok(proj_dirs.config_dir().to_path_buf())
    } else {
        let home = std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .context("Could not determine home directory")?;
        Ok(PathBuf::from(home).join(".config").join(APP_DIR_NAME))
    }
}

/// Save configuration to file
pub fn save_config(config: &Config, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_string = toml::to_string_pretty(config)?;
    std::fs::write(path, toml_string)
        .with_context(|| format!("Failed to write config to {}", path.display()))?;
    Ok(())
}

/// Create a default configuration file if it doesn't exist
///
/// Returns the path and whether a file was written.
pub fn init_config() -> Result<(PathBuf, bool)> {
    let config_file = get_config_dir()?.join("config.toml");
    if config_file.exists() {
        return Ok((config_file, false));
    }
    save_config(&Config::default(), &config_file)?;
    Ok((config_file, true))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.cache.namespace, "klaytic");
        assert_eq!(config.cache.backend, BackendKind::File);
        assert_eq!(config.cache.encoding, Encoding::Json);
        assert_eq!(config.cache.pending, PendingPolicy::Await);
        assert_eq!(config.model.timeout(), Duration::from_secs(GENERATION_TIMEOUT_SECS));
    }

    #[test]
    fn test_partial_toml_overrides_defaults() {
        let config: Config = Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::string(
                r#"
                [cache]
                backend = "memory"
                encoding = "compact"
                pending = "stale"

                [model]
                name = "ollama/llama3"
                "#,
            ))
            .extract()
            .unwrap();

        assert_eq!(config.cache.backend, BackendKind::Memory);
        assert_eq!(config.cache.encoding, Encoding::Compact);
        assert_eq!(config.cache.pending, PendingPolicy::Stale);
        assert_eq!(config.cache.namespace, "klaytic");
        assert_eq!(config.model.name, "ollama/llama3");
        assert_eq!(config.model.proxy_url, DEFAULT_PROXY_URL);
    }

    #[test]
    fn test_saved_config_loads_back() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.cache.namespace = "work".to_string();
        config.cache.dir = Some(temp_dir.path().join("cache"));
        save_config(&config, &path).unwrap();

        let loaded: Config = Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(&path))
            .extract()
            .unwrap();
        assert_eq!(loaded.cache.namespace, "work");
        assert_eq!(loaded.cache.resolved_dir().unwrap(), temp_dir.path().join("cache"));
    }

    #[test]
    fn test_missing_explicit_config_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let result = load_config(Some(&temp_dir.path().join("absent.toml")));
        assert!(result.is_err());
    }
}
