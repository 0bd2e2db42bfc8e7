//! Configuration Loader
//!
//! Environment-aware configuration loading. Sources are layered, later ones win:
//!
//! 1. `queue-metrics.toml` in the configuration directory (optional)
//! 2. `queue-metrics.{environment}.toml` in the same directory (optional)
//! 3. `QUEUE_METRICS__SECTION__FIELD` environment variables

use super::error::{ConfigResult, ConfigurationError};
use super::QueueMetricsConfig;
use config::{Config, Environment, File};
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const CONFIG_FILE_STEM: &str = "queue-metrics";
const ENV_PREFIX: &str = "QUEUE_METRICS";
const ENV_SEPARATOR: &str = "__";

/// Loads [`QueueMetricsConfig`] from files and the process environment
pub struct ConfigLoader {
    config_directory: PathBuf,
    environment: String,
    env_overrides: Option<HashMap<String, String>>,
}

impl ConfigLoader {
    /// Load configuration with environment auto-detection from `./config`
    pub fn load() -> ConfigResult<QueueMetricsConfig> {
        Self::new(Self::default_config_directory(), Self::detect_environment()).build()
    }

    /// Load configuration from a specific directory with explicit environment
    pub fn load_from_directory_with_env(
        config_directory: impl Into<PathBuf>,
        environment: &str,
    ) -> ConfigResult<QueueMetricsConfig> {
        Self::new(config_directory.into(), environment.to_string()).build()
    }

    pub fn new(config_directory: PathBuf, environment: String) -> Self {
        Self {
            config_directory,
            environment,
            env_overrides: None,
        }
    }

    /// Replace the process environment with an explicit variable map.
    ///
    /// Keys use the same `QUEUE_METRICS__SECTION__FIELD` form as real variables.
    pub fn with_env_overrides(mut self, overrides: HashMap<String, String>) -> Self {
        self.env_overrides = Some(overrides);
        self
    }

    /// Merge all sources, deserialize and validate
    pub fn build(self) -> ConfigResult<QueueMetricsConfig> {
        let base_file = self.config_file(None);
        let env_file = self.config_file(Some(&self.environment));

        debug!(
            environment = %self.environment,
            base_file = %base_file.display(),
            env_file = %env_file.display(),
            "Loading queue metrics configuration"
        );

        let environment_source = Environment::with_prefix(ENV_PREFIX)
            .prefix_separator(ENV_SEPARATOR)
            .separator(ENV_SEPARATOR)
            .try_parsing(true)
            .source(self.env_overrides);

        let merged = Config::builder()
            .add_source(File::from(base_file.as_path()).required(false))
            .add_source(File::from(env_file.as_path()).required(false))
            .add_source(environment_source)
            .build()
            .map_err(|e| {
                ConfigurationError::load_error(self.config_directory.display().to_string(), e)
            })?;

        let config: QueueMetricsConfig = merged
            .try_deserialize()
            .map_err(ConfigurationError::parse_error)?;

        config.validate()?;

        info!(
            environment = %self.environment,
            driver = config.storage.driver.as_str(),
            prefix = %config.storage.prefix,
            enabled = config.enabled,
            "Queue metrics configuration loaded"
        );

        Ok(config)
    }

    fn config_file(&self, environment: Option<&str>) -> PathBuf {
        let name = match environment {
            Some(env) => format!("{CONFIG_FILE_STEM}.{env}.toml"),
            None => format!("{CONFIG_FILE_STEM}.toml"),
        };
        self.config_directory.join(name)
    }

    pub fn config_directory(&self) -> &Path {
        &self.config_directory
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Detect current environment from environment variables
    pub fn detect_environment() -> String {
        env::var("QUEUE_METRICS_ENV")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string())
            .to_lowercase()
    }

    fn default_config_directory() -> PathBuf {
        if let Ok(dir) = env::var("QUEUE_METRICS_CONFIG_DIR") {
            return PathBuf::from(dir);
        }
        PathBuf::from("config")
    }
}
