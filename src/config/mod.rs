//! Configuration management for searchcore
//!
//! Loads the TOML configuration, applies environment overrides and
//! validates the result. [`SearchSettings`] is the parsed runtime view
//! handed to jobs.

use crate::error::{Result, SearchError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

mod validator;

pub use validator::ConfigValidator;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "_meta")]
    pub meta: MetaConfig,
    pub search: SearchConfig,
    pub indexed: IndexedConfig,
    pub unindexed: UnindexedConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Metadata about the configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaConfig {
    pub schema_version: String,
}

/// Job execution limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Children an AND/OR job runs at once
    pub max_concurrency: usize,
    /// File match limit when a pattern does not set one
    pub default_limit: usize,
    /// Result budget for a whole search
    pub max_results: usize,
    pub timeout: String,
    /// Repository revisions a single leaf may send to the unindexed backend
    pub unindexed_repo_budget: usize,
}

/// Indexed backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexedConfig {
    pub enabled: bool,
    pub list_timeout: String,
    pub max_wall_time: String,
    /// Result batches buffered between the backend and the consumer
    pub buffer_size: usize,
}

/// Unindexed backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnindexedConfig {
    pub max_concurrency: usize,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive, overridden by `RUST_LOG`
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "searchcore=info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(SearchError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| SearchError::Io {
            source: e,
            context: format!("Failed to read config file: {:?}", path),
        })?;
        let mut config: Config = toml::from_str(&content)?;

        // Apply environment variable overrides
        config.apply_env_overrides();

        ConfigValidator::validate(&config)?;

        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| SearchError::Io {
                source: e,
                context: format!("Failed to create config directory: {:?}", parent),
            })?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| SearchError::Io {
            source: e,
            context: format!("Failed to write config file: {:?}", path),
        })?;
        Ok(())
    }

    /// Apply environment variable overrides
    /// Environment variables in format: SEARCHCORE_SECTION__KEY=value
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(std::env::vars());
    }

    fn apply_overrides(&mut self, vars: impl IntoIterator<Item = (String, String)>) {
        for (key, value) in vars {
            if let Some(config_key) = key.strip_prefix("SEARCHCORE_") {
                if let Err(e) = self.set_value_from_env(config_key, &value) {
                    tracing::warn!("Failed to apply env override {}: {}", key, e);
                }
            }
        }
    }

    fn set_value_from_env(&mut self, path: &str, value: &str) -> Result<()> {
        match path {
            "SEARCH__MAX_CONCURRENCY" => self.search.max_concurrency = parse_value(path, value)?,
            "SEARCH__DEFAULT_LIMIT" => self.search.default_limit = parse_value(path, value)?,
            "SEARCH__MAX_RESULTS" => self.search.max_results = parse_value(path, value)?,
            "SEARCH__TIMEOUT" => self.search.timeout = value.to_string(),
            "SEARCH__UNINDEXED_REPO_BUDGET" => {
                self.search.unindexed_repo_budget = parse_value(path, value)?
            }
            "INDEXED__ENABLED" => self.indexed.enabled = parse_value(path, value)?,
            "INDEXED__LIST_TIMEOUT" => self.indexed.list_timeout = value.to_string(),
            "INDEXED__MAX_WALL_TIME" => self.indexed.max_wall_time = value.to_string(),
            "INDEXED__BUFFER_SIZE" => self.indexed.buffer_size = parse_value(path, value)?,
            "UNINDEXED__MAX_CONCURRENCY" => {
                self.unindexed.max_concurrency = parse_value(path, value)?
            }
            "LOGGING__FILTER" => self.logging.filter = value.to_string(),
            _ => {
                tracing::debug!("Unknown env config key: {}", path);
            }
        }
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| SearchError::Config("Cannot determine config directory".to_string()))?;

        Ok(config_dir.join("searchcore").join("config.toml"))
    }

    /// Runtime settings with durations parsed
    pub fn settings(&self) -> Result<SearchSettings> {
        Ok(SearchSettings {
            max_concurrency: self.search.max_concurrency,
            default_limit: self.search.default_limit,
            max_results: self.search.max_results,
            timeout: parse_duration("search.timeout", &self.search.timeout)?,
            unindexed_repo_budget: self.search.unindexed_repo_budget,
            indexed_enabled: self.indexed.enabled,
            list_timeout: parse_duration("indexed.list_timeout", &self.indexed.list_timeout)?,
            max_wall_time: parse_duration("indexed.max_wall_time", &self.indexed.max_wall_time)?,
            buffer_size: self.indexed.buffer_size,
            unindexed_concurrency: self.unindexed.max_concurrency,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            meta: MetaConfig {
                schema_version: "1.0.0".to_string(),
            },
            search: SearchConfig {
                max_concurrency: 16,
                default_limit: 30,
                max_results: 500,
                timeout: "10s".to_string(),
                unindexed_repo_budget: 200,
            },
            indexed: IndexedConfig {
                enabled: true,
                list_timeout: "60s".to_string(),
                max_wall_time: "20s".to_string(),
                buffer_size: 64,
            },
            unindexed: UnindexedConfig {
                max_concurrency: 16,
            },
            logging: LoggingConfig::default(),
        }
    }
}

/// Parsed settings used while executing a search
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchSettings {
    pub max_concurrency: usize,
    pub default_limit: usize,
    pub max_results: usize,
    pub timeout: Duration,
    pub unindexed_repo_budget: usize,
    pub indexed_enabled: bool,
    pub list_timeout: Duration,
    pub max_wall_time: Duration,
    pub buffer_size: usize,
    pub unindexed_concurrency: usize,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            max_concurrency: 16,
            default_limit: 30,
            max_results: 500,
            timeout: Duration::from_secs(10),
            unindexed_repo_budget: 200,
            indexed_enabled: true,
            list_timeout: Duration::from_secs(60),
            max_wall_time: Duration::from_secs(20),
            buffer_size: 64,
            unindexed_concurrency: 16,
        }
    }
}

fn parse_value<T: std::str::FromStr>(path: &str, value: &str) -> Result<T> {
    value.parse().map_err(|_| SearchError::InvalidConfigValue {
        path: path.to_string(),
        message: format!("Cannot parse '{}'", value),
    })
}

/// Parse durations like "250ms", "5s", "10m", "1h". A bare number is seconds.
pub fn parse_duration(path: &str, s: &str) -> Result<Duration> {
    let s = s.trim();
    let invalid = || SearchError::InvalidConfigValue {
        path: path.to_string(),
        message: format!("Invalid duration format: {}", s),
    };

    // Check "ms" before "s" because "ms" ends with "s"
    let (digits, unit_ms) = if let Some(n) = s.strip_suffix("ms") {
        (n, 1)
    } else if let Some(n) = s.strip_suffix('s') {
        (n, 1_000)
    } else if let Some(n) = s.strip_suffix('m') {
        (n, 60_000)
    } else if let Some(n) = s.strip_suffix('h') {
        (n, 3_600_000)
    } else {
        (s, 1_000)
    };

    let n: u64 = digits.trim().parse().map_err(|_| invalid())?;
    let ms = n.checked_mul(unit_ms).ok_or_else(invalid)?;
    Ok(Duration::from_millis(ms))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("t", "250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_duration("t", "5s").unwrap(), Duration::from_secs(5));
        assert_eq!(parse_duration("t", "2m").unwrap(), Duration::from_secs(120));
        assert_eq!(parse_duration("t", "1h").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse_duration("t", "7").unwrap(), Duration::from_secs(7));
        assert!(parse_duration("t", "soon").is_err());
        assert!(matches!(
            parse_duration("t", "99999999999999999h"),
            Err(SearchError::InvalidConfigValue { .. })
        ));
    }

    #[test]
    fn test_default_settings_match_config() {
        let settings = Config::default().settings().unwrap();
        assert_eq!(settings, SearchSettings::default());
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.search.max_results = 42;
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.search.max_results, 42);
        assert_eq!(loaded.indexed.buffer_size, 64);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = Config::load(&dir.path().join("nope.toml")).unwrap_err();
        assert!(matches!(err, SearchError::ConfigNotFound { .. }));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config.apply_overrides(vec![
            ("SEARCHCORE_SEARCH__MAX_CONCURRENCY".to_string(), "4".to_string()),
            ("SEARCHCORE_INDEXED__ENABLED".to_string(), "false".to_string()),
            ("SEARCHCORE_SEARCH__MAX_RESULTS".to_string(), "many".to_string()),
            ("OTHER_VAR".to_string(), "x".to_string()),
        ]);
        assert_eq!(config.search.max_concurrency, 4);
        assert!(!config.indexed.enabled);
        assert_eq!(config.search.max_results, 500);
    }
}
