use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// URI used when no `infinity` section is configured
pub const DEFAULT_URI: &str = "infinity:23817";

/// Name of the settings section holding the Infinity configuration
pub const INFINITY_SECTION: &str = "infinity";

/// Pool sizing and startup retry knobs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolOptions {
    /// Pool size used while waiting for the node at startup
    #[serde(default = "default_max_size")]
    pub max_size: usize,

    /// Pool size used when the pool is rebuilt after a failed liveness check
    #[serde(default = "default_refresh_max_size")]
    pub refresh_max_size: usize,

    /// Number of connect-and-probe rounds before giving up at startup
    #[serde(default = "default_retry_rounds")]
    pub retry_rounds: u32,

    /// Pause between startup rounds, in seconds
    #[serde(default = "default_retry_interval_secs")]
    pub retry_interval_secs: u64,
}

fn default_max_size() -> usize {
    4
}

fn default_refresh_max_size() -> usize {
    32
}

fn default_retry_rounds() -> u32 {
    24
}

fn default_retry_interval_secs() -> u64 {
    5
}

impl PoolOptions {
    pub fn retry_interval(&self) -> Duration {
        Duration::from_secs(self.retry_interval_secs)
    }

    /// Worst-case time spent sleeping before startup is declared failed
    ///
    /// Saturates at `Duration::MAX` for absurd intervals.
    pub fn startup_budget(&self) -> Duration {
        self.retry_interval().saturating_mul(self.retry_rounds)
    }
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            max_size: default_max_size(),
            refresh_max_size: default_refresh_max_size(),
            retry_rounds: default_retry_rounds(),
            retry_interval_secs: default_retry_interval_secs(),
        }
    }
}

/// The `infinity` settings section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InfinityConfig {
    /// `[scheme://]host[:port][/]`
    #[serde(default = "default_uri")]
    pub uri: String,

    #[serde(default)]
    pub pool: PoolOptions,
}

fn default_uri() -> String {
    DEFAULT_URI.to_string()
}

impl InfinityConfig {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            pool: PoolOptions::default(),
        }
    }
}

impl Default for InfinityConfig {
    fn default() -> Self {
        Self::new(DEFAULT_URI)
    }
}

/// Service settings
///
/// Holds an optional structured Infinity section (set from the environment
/// or by the embedding application) on top of the raw named sections of the
/// service configuration file.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    /// Structured Infinity configuration; takes precedence over the file section
    pub infinity: Option<InfinityConfig>,

    sections: serde_yaml::Mapping,
}

impl Settings {
    /// Create empty settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse settings from a YAML document whose top level is a mapping of sections
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let value: serde_yaml::Value =
            serde_yaml::from_str(yaml).context("Failed to parse YAML configuration")?;

        let sections = match value {
            serde_yaml::Value::Mapping(mapping) => mapping,
            serde_yaml::Value::Null => serde_yaml::Mapping::new(),
            _ => anyhow::bail!("YAML configuration must be a mapping of sections"),
        };

        Ok(Self {
            infinity: None,
            sections,
        })
    }

    /// Use a structured Infinity configuration instead of the file section
    pub fn with_infinity(mut self, config: InfinityConfig) -> Self {
        self.infinity = Some(config);
        self
    }

    /// Look up a named section, returning `default` when it is absent or empty
    pub fn get_base_config<T: DeserializeOwned>(&self, name: &str, default: T) -> Result<T> {
        match self.sections.get(name) {
            None | Some(serde_yaml::Value::Null) => Ok(default),
            Some(value) => serde_yaml::from_value(value.clone())
                .with_context(|| format!("Invalid '{}' section in configuration", name)),
        }
    }

    /// The Infinity configuration in effect
    ///
    /// The structured section wins; otherwise the `infinity` file section is
    /// used, defaulting to `{"uri": "infinity:23817"}`.
    pub fn infinity_config(&self) -> Result<InfinityConfig> {
        match &self.infinity {
            Some(config) => Ok(config.clone()),
            None => self.get_base_config(INFINITY_SECTION, InfinityConfig::default()),
        }
    }

    /// Apply environment overrides
    ///
    /// - INFINITY_URI
    /// - INFINITY_POOL_MAX_SIZE
    /// - INFINITY_RETRY_ROUNDS
    /// - INFINITY_RETRY_INTERVAL_SECS
    ///
    /// Unparseable numeric values are ignored.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        // Try to load .env file if it exists (don't fail if it doesn't)
        let _ = dotenvy::dotenv();

        let mut config = self.infinity_config()?;
        let mut changed = false;

        if let Ok(uri) = std::env::var("INFINITY_URI") {
            config.uri = uri;
            changed = true;
        }

        if let Ok(size) = std::env::var("INFINITY_POOL_MAX_SIZE") {
            if let Ok(val) = size.parse() {
                config.pool.max_size = val;
                changed = true;
            }
        }

        if let Ok(rounds) = std::env::var("INFINITY_RETRY_ROUNDS") {
            if let Ok(val) = rounds.parse() {
                config.pool.retry_rounds = val;
                changed = true;
            }
        }

        if let Ok(interval) = std::env::var("INFINITY_RETRY_INTERVAL_SECS") {
            if let Ok(val) = interval.parse() {
                config.pool.retry_interval_secs = val;
                changed = true;
            }
        }

        if changed {
            self.infinity = Some(config);
        }

        Ok(())
    }
}

/// Load settings from a YAML file
pub fn load_from_yaml<P: AsRef<Path>>(path: P) -> Result<Settings> {
    let content = std::fs::read_to_string(path.as_ref())
        .context(format!("Failed to read config file: {:?}", path.as_ref()))?;

    Settings::from_yaml_str(&content)
}

/// Load settings from environment variables only
pub fn load_from_env() -> Result<Settings> {
    let mut settings = Settings::new();
    settings.apply_env_overrides()?;
    Ok(settings)
}

/// Load settings from an optional YAML file, then apply environment overrides
pub fn load_config(config_path: Option<&str>) -> Result<Settings> {
    let mut settings = match config_path {
        Some(path) => load_from_yaml(path)?,
        None => Settings::new(),
    };

    settings.apply_env_overrides()?;
    Ok(settings)
}
