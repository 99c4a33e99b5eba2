//! @ai:module:intent Configuration structs for evalkit
//! @ai:module:layer infrastructure
//! @ai:module:public_api EvalkitConfig, ApiConfig, PathConfig, StoreConfig
//! @ai:module:stateless true

use crate::executor::ExecutorOptions;
use crate::rate_limiter::RateLimitConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// @ai:intent Main configuration for evalkit
/// @ai:effects pure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvalkitConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub executor: ExecutorOptions,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub paths: PathConfig,
}

/// @ai:intent Model provider configuration
/// @ai:effects pure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default)]
    pub temperature: f32,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Name of the environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

/// @ai:intent Remote store for experiment runs and evaluations
/// @ai:effects pure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_url")]
    pub base_url: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

/// @ai:intent Output directories
/// @ai:effects pure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathConfig {
    #[serde(default = "default_results_dir")]
    pub results_dir: PathBuf,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            max_tokens: default_max_tokens(),
            temperature: 0.0,
            base_url: default_base_url(),
            api_key_env: default_api_key_env(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            base_url: default_store_url(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl Default for PathConfig {
    fn default() -> Self {
        Self {
            results_dir: default_results_dir(),
        }
    }
}

fn default_model() -> String {
    "claude-sonnet-4-20250514".to_string()
}

fn default_max_tokens() -> u32 {
    1024
}

fn default_base_url() -> String {
    "https://api.anthropic.com".to_string()
}

fn default_api_key_env() -> String {
    "ANTHROPIC_API_KEY".to_string()
}

fn default_request_timeout() -> u64 {
    120
}

fn default_store_url() -> String {
    "http://localhost:6006".to_string()
}

fn default_results_dir() -> PathBuf {
    PathBuf::from("results")
}

impl EvalkitConfig {
    /// @ai:intent Load configuration from a TOML file
    /// @ai:pre path exists and is readable
    /// @ai:effects fs:read
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// @ai:intent Save configuration to a TOML file
    /// @ai:effects fs:write
    pub fn save(&self, path: &std::path::Path) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// @ai:intent Validate executor and rate-limit sections
    /// @ai:effects pure
    pub fn validate(&self) -> crate::error::Result<()> {
        self.executor.validate()?;
        self.rate_limit.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_round_trips_through_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("evalkit.toml");

        let config = EvalkitConfig::default();
        config.save(&path).unwrap();
        let loaded = EvalkitConfig::load(&path).unwrap();

        assert_eq!(loaded.api.model, config.api.model);
        assert_eq!(loaded.executor, config.executor);
        assert_eq!(loaded.rate_limit, config.rate_limit);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: EvalkitConfig = toml::from_str(
            r#"
[executor]
max_retries = 10
concurrency = 8

[rate_limit]
initial_per_second_request_rate = 2.0
"#,
        )
        .unwrap();

        assert_eq!(config.executor.max_retries, 10);
        assert_eq!(config.executor.concurrency, 8);
        assert_eq!(config.rate_limit.initial_per_second_request_rate, 2.0);
        assert_eq!(config.rate_limit.rate_reduction_factor, 0.5);
        assert_eq!(config.api.api_key_env, "ANTHROPIC_API_KEY");
    }

    #[test]
    fn test_load_rejects_invalid_executor_section() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("bad.toml");
        std::fs::write(&path, "[executor]\nconcurrency = 0\n").unwrap();

        assert!(EvalkitConfig::load(&path).is_err());
    }
}
