//! Scan, scheduler and application configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::settings::{DEFAULT_SCAN_ROOT, Settings};

/// File name of the application config inside the config directory.
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// File name of the default snapshot database.
pub const DATABASE_FILE_NAME: &str = "diskstrata.db";

/// Configuration for the directory walk.
#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct ScanConfig {
    /// Directory or file names to skip (exact, `prefix*` or `*suffix`).
    #[builder(default)]
    #[serde(default)]
    pub ignore_patterns: Vec<String>,

    /// Include hidden entries (starting with .).
    #[builder(default = "true")]
    #[serde(default = "default_true")]
    pub include_hidden: bool,

    /// Persist the scan's running counters every N directories (0 = only at the end).
    #[builder(default = "64")]
    #[serde(default = "default_checkpoint_interval")]
    pub checkpoint_interval: u64,
}

fn default_true() -> bool {
    true
}

fn default_checkpoint_interval() -> u64 {
    64
}

impl ScanConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        let patterns = self.ignore_patterns.as_deref().unwrap_or_default();
        if patterns.iter().any(|p| p.is_empty() || p == "*") {
            return Err("Ignore patterns must name something".to_string());
        }
        Ok(())
    }
}

impl ScanConfig {
    /// Create a new scan config builder.
    pub fn builder() -> ScanConfigBuilder {
        ScanConfigBuilder::default()
    }

    /// Check if an entry should be skipped based on patterns.
    pub fn should_ignore(&self, name: &str) -> bool {
        self.ignore_patterns.iter().any(|pattern| {
            if let Some(prefix) = pattern.strip_suffix('*') {
                name.starts_with(prefix)
            } else if let Some(suffix) = pattern.strip_prefix('*') {
                name.ends_with(suffix)
            } else {
                name == pattern
            }
        })
    }

    /// Check if hidden entries should be skipped.
    pub fn should_skip_hidden(&self, name: &str) -> bool {
        !self.include_hidden && name.starts_with('.')
    }

    /// Check whether an entry with this name takes part in the walk.
    pub fn accepts(&self, name: &str) -> bool {
        !self.should_skip_hidden(name) && !self.should_ignore(name)
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            ignore_patterns: Vec::new(),
            include_hidden: true,
            checkpoint_interval: default_checkpoint_interval(),
        }
    }
}

/// Configuration for the scan scheduler loop.
#[derive(Debug, Clone, Builder)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct SchedulerConfig {
    /// Time between two due checks.
    #[builder(default = "Duration::from_secs(60)")]
    pub tick: Duration,

    /// Sleep after an unexpected error before the next check.
    #[builder(default = "Duration::from_secs(300)")]
    pub error_backoff: Duration,

    /// Settings written when none exist yet.
    #[builder(default)]
    pub default_settings: Settings,
}

impl SchedulerConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        if self.tick.is_some_and(|t| t.is_zero()) {
            return Err("Tick must be greater than zero".to_string());
        }
        Ok(())
    }
}

impl SchedulerConfig {
    /// Create a new scheduler config builder.
    pub fn builder() -> SchedulerConfigBuilder {
        SchedulerConfigBuilder::default()
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_secs(60),
            error_backoff: Duration::from_secs(300),
            default_settings: Settings::default(),
        }
    }
}

/// Errors loading the application config.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file exists but could not be read.
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid TOML for [`AppConfig`].
    #[error("Invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Application configuration, read from `config.toml`.
///
/// Every field is optional; missing values fall back to built-in defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Snapshot database file.
    pub database_path: Option<PathBuf>,
    /// Root path used when settings are first created.
    pub default_root: Option<PathBuf>,
    /// Scheduler tick in seconds.
    pub tick_secs: Option<u64>,
    /// Scheduler back-off after errors, in seconds.
    pub error_backoff_secs: Option<u64>,
    /// Walk options.
    pub scan: ScanConfig,
}

impl AppConfig {
    /// Location of the config file in the user's config directory.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("diskstrata").join(CONFIG_FILE_NAME))
    }

    /// Load the config at `path`; a missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load the config from the default location, if there is one.
    pub fn load_default() -> Result<Self, ConfigError> {
        match Self::default_path() {
            Some(path) => Self::load(&path),
            None => Ok(Self::default()),
        }
    }

    /// Database file to open.
    pub fn database_path(&self) -> PathBuf {
        if let Some(ref path) = self.database_path {
            return path.clone();
        }
        dirs::data_dir()
            .map(|dir| dir.join("diskstrata"))
            .unwrap_or_else(|| PathBuf::from("."))
            .join(DATABASE_FILE_NAME)
    }

    /// Settings written on first start.
    pub fn default_settings(&self) -> Settings {
        Settings::with_root(
            self.default_root
                .clone()
                .unwrap_or_else(|| PathBuf::from(DEFAULT_SCAN_ROOT)),
        )
    }

    /// Scheduler configuration derived from this config.
    pub fn scheduler_config(&self) -> SchedulerConfig {
        let defaults = SchedulerConfig::default();
        SchedulerConfig {
            tick: self
                .tick_secs
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.tick),
            error_backoff: self
                .error_backoff_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.error_backoff),
            default_settings: self.default_settings(),
        }
    }
}
