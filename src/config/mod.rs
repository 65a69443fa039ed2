//! Configuration Module
//!
//! Two layers of configuration:
//! - Daemon settings (`Config`): TOML file with `${VAR:-default}` substitution
//!   and `GEOCLUSTER__*` environment overrides
//! - Replicated cluster properties (`ClusterConfiguration`): the
//!   `cluster.properties` store assembled from configuration extensions

use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Environment, File, FileFormat};
use regex::Regex;
use serde::Deserialize;

pub use cluster::{ClusterConfiguration, ConfigState, CONFIG_FILE_NAME, INSTANCE_NAME_KEY};
pub use extensions::{
    standard_extensions, ConfigurationExtension, EnvironmentSource, KeyedExtension, MapSource,
    OverrideSource, Status, BROKER_URL_KEY, CONNECTION_KEY, EMBEDDED_BROKER_KEY,
    EMBEDDED_BROKER_PROPERTIES_KEY, GROUP_KEY, READ_ONLY_KEY, TOGGLE_MASTER_KEY,
    TOGGLE_PRODUCER_KEY, TOGGLE_SLAVE_KEY, TOPIC_NAME_KEY,
};
pub use properties::Properties;

mod cluster;
mod extensions;
mod properties;

/// Substitute environment variables in a string.
/// Supports `${VAR}` and `${VAR:-default}` syntax.
fn substitute_env_vars(content: &str) -> String {
    let Ok(re) = Regex::new(r"\$\{([^}:]+)(?::-([^}]*))?\}") else {
        return content.to_string();
    };
    re.replace_all(content, |caps: &regex::Captures| {
        let var_name = &caps[1];
        let default = caps.get(2).map(|m| m.as_str()).unwrap_or("");
        std::env::var(var_name).unwrap_or_else(|_| default.to_string())
    })
    .to_string()
}


/// Configuration error types
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file
    Io(std::io::Error),
    /// TOML parsing error
    Parse(toml::de::Error),
    /// Config crate error
    Config(config::ConfigError),
    /// Validation error
    Validation(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Config(e) => write!(f, "Config error: {}", e),
            ConfigError::Validation(msg) => write!(f, "Validation error: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Parse(e)
    }
}

impl From<config::ConfigError> for ConfigError {
    fn from(e: config::ConfigError) -> Self {
        ConfigError::Config(e)
    }
}

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Logging configuration
    pub log: LogConfig,
    /// Node directories and queues
    pub node: NodeConfig,
    /// Bounds on blocking operations
    pub timeouts: TimeoutConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level: error, warn, info, debug, trace
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Node configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Directory holding `cluster.properties` and the embedded broker properties
    #[serde(default = "default_config_dir")]
    pub config_dir: PathBuf,
    /// Data directory style documents are read from and written to
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Capacity of the inbound message queue between the bus and the consumer
    #[serde(default = "default_consumer_queue")]
    pub consumer_queue: usize,
}

fn default_config_dir() -> PathBuf {
    PathBuf::from("cluster")
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_consumer_queue() -> usize {
    1024
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            config_dir: default_config_dir(),
            data_dir: default_data_dir(),
            consumer_queue: default_consumer_queue(),
        }
    }
}

/// Timeouts for bus connection and domain-store calls
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Bound on establishing the bus connection
    #[serde(default = "default_connect_timeout", with = "humantime_serde")]
    pub connect: Duration,
    /// Bound on each domain-store call made while applying an event
    #[serde(default = "default_apply_timeout", with = "humantime_serde")]
    pub apply: Duration,
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_apply_timeout() -> Duration {
    Duration::from_secs(30)
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect: default_connect_timeout(),
            apply: default_apply_timeout(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file with environment variable overrides.
    ///
    /// Supports two forms of environment variable usage:
    /// 1. In-file substitution: `${VAR}` or `${VAR:-default}` syntax in the TOML file
    /// 2. Override via env vars: `GEOCLUSTER__` prefix with double underscores for nesting:
    ///    - `GEOCLUSTER__NODE__DATA_DIR=/srv/data` overrides `node.data_dir`
    ///    - `GEOCLUSTER__TIMEOUTS__APPLY=10s` overrides `timeouts.apply`
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder()
            .set_default("log.level", "info")?
            .set_default("node.config_dir", "cluster")?
            .set_default("node.data_dir", "data")?
            .set_default("node.consumer_queue", 1024)?
            .set_default("timeouts.connect", "5s")?
            .set_default("timeouts.apply", "30s")?;

        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let substituted = substitute_env_vars(&content);
                builder = builder.add_source(File::from_str(&substituted, FileFormat::Toml));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // File doesn't exist, use defaults
            }
            Err(e) => return Err(ConfigError::Io(e)),
        }

        let cfg = builder
            .add_source(
                Environment::with_prefix("GEOCLUSTER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = cfg.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration with environment variable overrides only (no file).
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(Path::new(""))
    }

    /// Parse configuration from a string (for testing, no env var support)
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.node.consumer_queue == 0 {
            return Err(ConfigError::Validation(
                "node.consumer_queue must be greater than 0".to_string(),
            ));
        }
        if self.timeouts.connect.is_zero() {
            return Err(ConfigError::Validation(
                "timeouts.connect must be greater than 0".to_string(),
            ));
        }
        if self.timeouts.apply.is_zero() {
            return Err(ConfigError::Validation(
                "timeouts.apply must be greater than 0".to_string(),
            ));
        }
        match self.log.level.to_lowercase().as_str() {
            "error" | "warn" | "info" | "debug" | "trace" => Ok(()),
            other => Err(ConfigError::Validation(format!(
                "unknown log level '{}'",
                other
            ))),
        }
    }
}
