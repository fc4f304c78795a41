//! Configuration management
//!
//! Run settings come from defaults, a JSON file, environment variables or an
//! inline JSON document, and are validated before a run starts.

use crate::{EtlConfig, Error, PipelineConfig, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_BATCH_SIZE: &str = "HYBRIDJOIN_BATCH_SIZE";
pub const ENV_PACE_MS: &str = "HYBRIDJOIN_PACE_MS";
pub const ENV_CHANNEL_CAPACITY: &str = "HYBRIDJOIN_CHANNEL_CAPACITY";
pub const ENV_MAX_ATTEMPTS: &str = "HYBRIDJOIN_MAX_ATTEMPTS";
pub const ENV_TRANSACTIONS: &str = "HYBRIDJOIN_TRANSACTIONS";
pub const ENV_MASTER_DATA: &str = "HYBRIDJOIN_MASTER_DATA";

/// Configuration source types
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigSource {
    /// JSON file
    File(PathBuf),
    /// `HYBRIDJOIN_*` environment variables layered over the current config
    Environment,
    /// JSON document
    Inline(String),
}

/// Holds the effective configuration built from one or more sources.
#[derive(Debug, Clone, Default)]
pub struct ConfigManager {
    current: EtlConfig,
    sources: Vec<ConfigSource>,
}

impl ConfigManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from source. Later sources override earlier ones.
    pub fn load_from_source(&mut self, source: ConfigSource) -> Result<()> {
        let config = match &source {
            ConfigSource::File(path) => Self::load_from_file(path)?,
            ConfigSource::Environment => Self::load_from_env(self.current.clone())?,
            ConfigSource::Inline(content) => Self::parse_config(content)?,
        };

        Self::validate_config(&config)?;
        self.current = config;
        self.sources.push(source);
        Ok(())
    }

    fn load_from_file(path: &Path) -> Result<EtlConfig> {
        let content = fs::read_to_string(path)?;
        Self::parse_config(&content)
    }

    fn parse_config(content: &str) -> Result<EtlConfig> {
        serde_json::from_str(content).map_err(|e| Error::Config(format!("JSON parse error: {}", e)))
    }

    fn load_from_env(mut config: EtlConfig) -> Result<EtlConfig> {
        if let Some(batch_size) = env_parse::<usize>(ENV_BATCH_SIZE)? {
            config.pipeline.batch_size = batch_size;
        }
        if let Some(pace_ms) = env_parse::<u64>(ENV_PACE_MS)? {
            config.pipeline.pace = Duration::from_millis(pace_ms);
        }
        if let Some(capacity) = env_parse::<usize>(ENV_CHANNEL_CAPACITY)? {
            config.pipeline.channel_capacity = capacity;
        }
        if let Some(attempts) = env_parse::<u32>(ENV_MAX_ATTEMPTS)? {
            config.pipeline.max_attempts = attempts;
        }
        if let Ok(path) = std::env::var(ENV_TRANSACTIONS) {
            config.transactions_path = PathBuf::from(path);
        }
        if let Ok(path) = std::env::var(ENV_MASTER_DATA) {
            config.master_data_path = PathBuf::from(path);
        }
        Ok(config)
    }

    pub fn validate_config(config: &EtlConfig) -> Result<()> {
        Self::validate_pipeline(&config.pipeline)?;

        if config.transactions_path.as_os_str().is_empty() {
            return Err(Error::Config("Transactions path must not be empty".into()));
        }
        if config.master_data_path.as_os_str().is_empty() {
            return Err(Error::Config("Master data path must not be empty".into()));
        }

        Ok(())
    }

    pub fn validate_pipeline(pipeline: &PipelineConfig) -> Result<()> {
        if pipeline.batch_size == 0 {
            return Err(Error::Config("Batch size must be greater than 0".into()));
        }
        if pipeline.channel_capacity == 0 {
            return Err(Error::Config(
                "Channel capacity must be greater than 0".into(),
            ));
        }
        if pipeline.max_attempts == 0 {
            return Err(Error::Config("Must allow at least 1 attempt".into()));
        }
        Ok(())
    }

    pub fn sources(&self) -> &[ConfigSource] {
        &self.sources
    }

    pub fn get_config(&self) -> EtlConfig {
        self.current.clone()
    }

    pub fn export_config(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.current)?)
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Result<Option<T>> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| Error::Config(format!("Invalid value `{}` for {}", raw, name))),
        Err(_) => Ok(None),
    }
}

/// Fluent builder over [`EtlConfig`].
#[derive(Debug, Clone, Default)]
pub struct ConfigBuilder {
    config: EtlConfig,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: EtlConfig) -> Self {
        Self { config }
    }

    pub fn batch_size(mut self, size: usize) -> Self {
        self.config.pipeline.batch_size = size;
        self
    }

    pub fn pace(mut self, pace: Duration) -> Self {
        self.config.pipeline.pace = pace;
        self
    }

    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.config.pipeline.channel_capacity = capacity;
        self
    }

    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.config.pipeline.max_attempts = attempts;
        self
    }

    pub fn transactions_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.transactions_path = path.into();
        self
    }

    pub fn master_data_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.master_data_path = path.into();
        self
    }

    pub fn build(self) -> Result<EtlConfig> {
        ConfigManager::validate_config(&self.config)?;
        Ok(self.config)
    }
}

/// Serde adapter storing a `Duration` as whole milliseconds.
pub mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
