//! Configuration.
//!
//! The pipeline is configured via a TOML file, with support for environment
//! variable interpolation using `${VAR_NAME}` syntax.
//!
//! # Example
//!
//! ```toml
//! [database]
//! url = "sqlite://costpipe.db"
//!
//! [aws]
//! region = "ap-northeast-1"
//! parameter_prefix = "/costpipe"
//!
//! [batch]
//! scheduler_interval_secs = 180
//! ```

use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static ENV_VAR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{([^}]+)\}").expect("env var regex is valid"));

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {1}: {0}")]
    Io(std::io::Error, std::path::PathBuf),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),

    #[error("Configuration validation error: {0}")]
    Validation(String),
}

/// Root configuration. Every section has defaults, so an empty file is a
/// valid local setup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub aws: AwsConfig,

    #[serde(default)]
    pub batch: BatchConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from a TOML file.
    ///
    /// Environment variables in the format `${VAR_NAME}` are expanded.
    /// Missing variables cause an error.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(e, path.as_ref().to_path_buf()))?;
        Self::from_toml(&contents)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let expanded = expand_env_vars(contents)?;
        let config: AppConfig = toml::from_str(&expanded)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.database.url.is_empty() {
            return Err(ConfigError::Validation("database.url must not be empty".into()));
        }
        if self.database.max_connections == 0 {
            return Err(ConfigError::Validation(
                "database.max_connections must be at least 1".into(),
            ));
        }
        if self.batch.pending_limit <= 0 {
            return Err(ConfigError::Validation(
                "batch.pending_limit must be positive".into(),
            ));
        }
        if self.batch.scheduler_interval_secs == 0 {
            return Err(ConfigError::Validation(
                "batch.scheduler_interval_secs must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// SQLite database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseConfig {
    /// SQLite connection URL. The file is created if it does not exist.
    #[serde(default = "default_database_url")]
    pub url: String,

    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
        }
    }
}

/// AWS access configuration: region, optional endpoint override for
/// localstack-style setups, and the credential backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AwsConfig {
    #[serde(default = "default_region")]
    pub region: String,

    /// Endpoint URL override applied to both S3 and SSM clients.
    #[serde(default)]
    pub endpoint_url: Option<String>,

    /// Prefix prepended to relative parameter paths in SSM.
    #[serde(default)]
    pub parameter_prefix: Option<String>,

    /// Where per-project access keys are read from.
    #[serde(default)]
    pub secrets_backend: SecretsBackend,
}

impl Default for AwsConfig {
    fn default() -> Self {
        Self {
            region: default_region(),
            endpoint_url: None,
            parameter_prefix: None,
            secrets_backend: SecretsBackend::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecretsBackend {
    /// AWS SSM Parameter Store.
    #[default]
    Ssm,
    /// Environment variables, keyed by parameter path (local development).
    Env,
}

/// Batch engine tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BatchConfig {
    /// Maximum PENDING files consumed per aggregation run.
    #[serde(default = "default_pending_limit")]
    pub pending_limit: i64,

    /// Seconds between scheduled all-projects ingestion runs.
    #[serde(default = "default_scheduler_interval")]
    pub scheduler_interval_secs: u64,

    /// Seconds between worker queue polls.
    #[serde(default = "default_worker_poll")]
    pub worker_poll_secs: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            pending_limit: default_pending_limit(),
            scheduler_interval_secs: default_scheduler_interval(),
            worker_poll_secs: default_worker_poll(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Log level (`trace`, `debug`, `info`, `warn`, `error`). `RUST_LOG`
    /// overrides this when set.
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Pretty,
    #[default]
    Compact,
    Json,
}

fn default_database_url() -> String {
    "sqlite://costpipe.db".to_string()
}

fn default_max_connections() -> u32 {
    5
}

fn default_region() -> String {
    "ap-northeast-1".to_string()
}

fn default_pending_limit() -> i64 {
    100
}

fn default_scheduler_interval() -> u64 {
    180
}

fn default_worker_poll() -> u64 {
    5
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Expand `${VAR_NAME}` references, skipping those inside TOML comments.
fn expand_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut result = String::with_capacity(input.len());

    for line in input.lines() {
        let comment_pos = line.find('#');
        let mut line_result = String::with_capacity(line.len());
        let mut last_end = 0;

        for cap in ENV_VAR_RE.captures_iter(line) {
            let Some(whole) = cap.get(0) else { continue };
            if let Some(pos) = comment_pos
                && whole.start() >= pos
            {
                continue;
            }

            line_result.push_str(&line[last_end..whole.start()]);
            let var_name = &cap[1];
            let value = std::env::var(var_name)
                .map_err(|_| ConfigError::EnvVarNotFound(var_name.to_string()))?;
            line_result.push_str(&value);
            last_end = whole.end();
        }

        line_result.push_str(&line[last_end..]);
        result.push_str(&line_result);
        result.push('\n');
    }

    if !input.ends_with('\n') {
        result.pop();
    }

    Ok(result)
}
