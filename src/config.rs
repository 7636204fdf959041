use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::bus::SchedulerConfig;
use crate::coordinator::CoordinatorConfig;

pub const CONFIG_PATH_ENV: &str = "GEOVIEW_CONFIG";
pub const DEFAULT_LOG_FILTER: &str = "geoview=debug,info";

const ENV_MAX_HISTORY: &str = "GEOVIEW_MAX_HISTORY";
const ENV_BATCH_SIZE: &str = "GEOVIEW_BATCH_SIZE";
const ENV_MAX_RETRIES: &str = "GEOVIEW_MAX_RETRIES";
const ENV_DEBUG: &str = "GEOVIEW_DEBUG";
const ENV_VALIDATE_EVENTS: &str = "GEOVIEW_VALIDATE_EVENTS";
const ENV_LOG: &str = "GEOVIEW_LOG";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid value for {name}: {value}")]
    InvalidEnv { name: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    pub scheduler: SchedulerConfig,
    pub coordinator: CoordinatorConfig,
    pub log_filter: String,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            scheduler: SchedulerConfig::default(),
            coordinator: CoordinatorConfig::default(),
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl ViewerConfig {
    /// Read `path` (or `GEOVIEW_CONFIG`, or nothing) and apply `GEOVIEW_*`
    /// overrides from the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let from_env = std::env::var(CONFIG_PATH_ENV).ok().map(PathBuf::from);
        let mut config = match path.map(Path::to_path_buf).or(from_env) {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        config.apply_overrides(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!(path = %path.display(), "loaded viewer config");
        Ok(config)
    }

    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = parse_env(&lookup, ENV_MAX_HISTORY)? {
            self.scheduler.max_history_size = value;
        }
        if let Some(value) = parse_env(&lookup, ENV_BATCH_SIZE)? {
            self.scheduler.batch_size = value;
        }
        if let Some(value) = parse_env(&lookup, ENV_MAX_RETRIES)? {
            self.scheduler.max_retries = value;
        }
        if let Some(value) = parse_flag(&lookup, ENV_DEBUG)? {
            self.coordinator.debug = value;
        }
        if let Some(value) = parse_flag(&lookup, ENV_VALIDATE_EVENTS)? {
            self.coordinator.validate_events = value;
        }
        if let Some(filter) = lookup(ENV_LOG).filter(|f| !f.trim().is_empty()) {
            self.log_filter = filter;
        }
        Ok(())
    }
}

fn parse_env<T, F>(lookup: &F, name: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    let Some(value) = lookup(name) else {
        return Ok(None);
    };
    value
        .trim()
        .parse()
        .map(Some)
        .map_err(|_| ConfigError::InvalidEnv { name, value })
}

fn parse_flag<F>(lookup: &F, name: &'static str) -> Result<Option<bool>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(value) = lookup(name) else {
        return Ok(None);
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(Some(true)),
        "0" | "false" | "no" | "off" => Ok(Some(false)),
        _ => Err(ConfigError::InvalidEnv { name, value }),
    }
}
