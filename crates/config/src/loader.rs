//! Configuration loading with precedence tracking

use crate::config::{Config, CollectorOverride, LogFormat};
use rmx_core::{Error, Result, CONFIG_DIR_NAME, CONFIG_FILE_NAME, RMX_CONFIG_VAR, RMX_ENV_PREFIX};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Source of configuration for debugging and precedence tracking
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// Built-in defaults
    Default,
    /// Configuration file
    ConfigFile(PathBuf),
    /// Environment variable
    EnvironmentVariable(String),
    /// Command line argument
    CommandLine,
}

/// A resolved configuration and every source that contributed to it
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: Config,
    pub sources: Vec<ConfigSource>,
}

/// Configuration loader that handles precedence
#[derive(Debug, Clone, Default)]
pub struct ConfigLoader {
    path: Option<PathBuf>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from an explicit file, which must exist
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    /// Load using the process environment
    pub fn load(&self) -> Result<LoadedConfig> {
        self.load_with_env(std::env::vars())
    }

    /// Load using the given environment variables instead of the process environment
    pub fn load_with_env<I>(&self, vars: I) -> Result<LoadedConfig>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let vars: HashMap<String, String> = vars.into_iter().collect();
        let mut config = Config::default();
        let mut sources = vec![ConfigSource::Default];

        if let Some(path) = self.resolve_path(&vars)? {
            config = Self::from_file(&path)?;
            tracing::debug!(path = %path.display(), "Loaded configuration file");
            sources.push(ConfigSource::ConfigFile(path));
        }

        let applied = apply_env_overrides(&mut config, &vars)?;
        sources.extend(applied.into_iter().map(ConfigSource::EnvironmentVariable));

        config.validate()?;
        Ok(LoadedConfig { config, sources })
    }

    /// Parse a JSON configuration file
    pub fn from_file(path: &Path) -> Result<Config> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::file_system(path, "read config file", e))?;
        serde_json::from_str(&content).map_err(|e| Error::Json {
            message: format!("invalid configuration in '{}'", path.display()),
            source: e,
        })
    }

    /// Default location of the configuration file
    pub fn default_config_path() -> Option<PathBuf> {
        Self::config_path_in(std::env::var_os("XDG_CONFIG_HOME").map(PathBuf::from))
    }

    fn config_path_in(xdg_config_home: Option<PathBuf>) -> Option<PathBuf> {
        let config_dir = match xdg_config_home {
            Some(dir) => dir,
            None => dirs::config_dir()?,
        };
        Some(config_dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    fn resolve_path(&self, vars: &HashMap<String, String>) -> Result<Option<PathBuf>> {
        let explicit = self
            .path
            .clone()
            .or_else(|| vars.get(RMX_CONFIG_VAR).map(PathBuf::from));

        if let Some(path) = explicit {
            if !path.exists() {
                return Err(Error::configuration(format!(
                    "configuration file '{}' does not exist",
                    path.display()
                )));
            }
            return Ok(Some(path));
        }

        let xdg_config_home = vars.get("XDG_CONFIG_HOME").map(PathBuf::from);
        Ok(Self::config_path_in(xdg_config_home).filter(|path| path.exists()))
    }
}

/// Apply `RMX_*` overrides, returning the names of the variables that were used
///
/// Per-collector overrides use `RMX_COLLECTOR_<NAME>_ENABLED` and
/// `RMX_COLLECTOR_<NAME>_TIMEOUT_MS`, where `<NAME>` is the upper-cased collector
/// name.
pub fn apply_env_overrides(
    config: &mut Config,
    vars: &HashMap<String, String>,
) -> Result<Vec<String>> {
    let mut applied = Vec::new();
    let mut keys: Vec<&String> = vars.keys().filter(|k| k.starts_with(RMX_ENV_PREFIX)).collect();
    keys.sort();

    for key in keys {
        let value = vars[key].as_str();
        let field = &key[RMX_ENV_PREFIX.len()..];
        let matched = match field {
            "SERVER_ADDRESS" => {
                config.server.address = value.to_string();
                true
            }
            "SERVER_METRICS_PATH" => {
                config.server.metrics_path = value.to_string();
                true
            }
            "SERVER_SCRAPE_TIMEOUT_MS" => {
                config.server.scrape_timeout_ms = parse(key, value)?;
                true
            }
            "COLLECTORS_DEFAULT_TIMEOUT_MS" => {
                config.collectors.default_timeout_ms = parse(key, value)?;
                true
            }
            "COLLECTORS_MAX_CONCURRENCY" => {
                config.collectors.max_concurrency = parse(key, value)?;
                true
            }
            "COLLECTORS_ERROR_THRESHOLD" => {
                config.collectors.error_threshold = parse(key, value)?;
                true
            }
            "CACHE_CLEANUP_INTERVAL_SECS" => {
                config.cache.cleanup_interval_secs = parse(key, value)?;
                true
            }
            "METRICS_NAMESPACE" => {
                config.metrics.namespace = value.to_string();
                true
            }
            "METRICS_CARDINALITY_MAX_SERIES" => {
                config.metrics.cardinality.max_series = parse(key, value)?;
                true
            }
            "METRICS_CARDINALITY_WARN_LIMIT" => {
                config.metrics.cardinality.warn_limit = parse(key, value)?;
                true
            }
            "METRICS_CARDINALITY_MAX_LABELS" => {
                config.metrics.cardinality.max_labels = parse(key, value)?;
                true
            }
            "METRICS_CARDINALITY_MAX_LABEL_SIZE" => {
                config.metrics.cardinality.max_label_size = parse(key, value)?;
                true
            }
            "METRICS_CARDINALITY_SAMPLE_RATE" => {
                config.metrics.cardinality.sample_rate = parse(key, value)?;
                true
            }
            "METRICS_CARDINALITY_RESET_THRESHOLD" => {
                config.metrics.cardinality.reset_threshold = parse(key, value)?;
                true
            }
            "METRICS_CARDINALITY_OPTIMIZE_INTERVAL_SECS" => {
                config.metrics.cardinality.optimize_interval_secs = parse(key, value)?;
                true
            }
            "LOGGING_LEVEL" => {
                config.logging.level = value.to_string();
                true
            }
            "LOGGING_FORMAT" => {
                config.logging.format = LogFormat::from_str(value)?;
                true
            }
            _ => apply_collector_override(config, key, field, value)?,
        };

        if matched {
            applied.push(key.clone());
        }
    }

    Ok(applied)
}

fn apply_collector_override(
    config: &mut Config,
    key: &str,
    field: &str,
    value: &str,
) -> Result<bool> {
    let Some(rest) = field.strip_prefix("COLLECTOR_") else {
        return Ok(false);
    };

    let (name, setting) = if let Some(name) = rest.strip_suffix("_ENABLED") {
        (name, "enabled")
    } else if let Some(name) = rest.strip_suffix("_TIMEOUT_MS") {
        (name, "timeout_ms")
    } else {
        return Ok(false);
    };
    if name.is_empty() {
        return Ok(false);
    }

    let entry = config
        .collectors
        .overrides
        .entry(name.to_ascii_lowercase())
        .or_insert_with(CollectorOverride::default);
    match setting {
        "enabled" => entry.enabled = Some(parse(key, value)?),
        _ => entry.timeout_ms = Some(parse(key, value)?),
    }
    Ok(true)
}

fn parse<T>(key: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| Error::configuration(format!("invalid value '{value}' for {key}: {e}")))
}
