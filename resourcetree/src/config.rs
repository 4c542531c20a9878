//! Configuration.
//!
//! Two layers:
//!
//! - [`TreeConfig`]: the in-code settings a [`RepositoryTree`] runs with,
//!   built with `with_*` methods.
//! - [`ConfigFile`]: the user's INI file at
//!   `~/.config/resourcetree/config.ini`, which the CLI reads and edits and
//!   which converts into a [`TreeConfig`].
//!
//! # Example file
//!
//! ```ini
//! [tree]
//! slow_merge_threshold_ms = 50
//! trace_updates = true
//!
//! [logging]
//! level = debug
//! directory = /var/log/resourcetree
//! ```
//!
//! [`RepositoryTree`]: crate::repository::RepositoryTree

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use ini::Ini;
use thiserror::Error;

/// Default threshold above which a merge is logged as slow.
pub const DEFAULT_SLOW_MERGE_THRESHOLD: Duration = Duration::from_millis(100);

/// Default log level filter.
pub const DEFAULT_LOG_LEVEL: &str = "info";

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Runtime settings of a repository tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeConfig {
    /// Merges and reconciliations taking at least this long are logged at
    /// `warn`.
    pub slow_merge_threshold: Duration,

    /// Log every invalidation and reconciliation at `info`.
    pub trace_updates: bool,
}

impl TreeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_slow_merge_threshold(mut self, threshold: Duration) -> Self {
        self.slow_merge_threshold = threshold;
        self
    }

    pub fn with_trace_updates(mut self, enabled: bool) -> Self {
        self.trace_updates = enabled;
        self
    }
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            slow_merge_threshold: DEFAULT_SLOW_MERGE_THRESHOLD,
            trace_updates: false,
        }
    }
}

/// Errors from loading, saving or editing the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("invalid value '{value}' for {key}: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },

    #[error("unknown configuration key '{0}'")]
    UnknownKey(String),
}

/// `[tree]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeSection {
    pub slow_merge_threshold_ms: u64,
    pub trace_updates: bool,
}

impl Default for TreeSection {
    fn default() -> Self {
        Self {
            slow_merge_threshold_ms: DEFAULT_SLOW_MERGE_THRESHOLD.as_millis() as u64,
            trace_updates: false,
        }
    }
}

/// `[logging]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingSection {
    /// Default filter when `RUST_LOG` is not set.
    pub level: String,
    /// Also write logs to daily files in this directory.
    pub directory: Option<PathBuf>,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
            directory: None,
        }
    }
}

/// Contents of `config.ini`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigFile {
    pub tree: TreeSection,
    pub logging: LoggingSection,
}

/// Directory holding the configuration file.
pub fn config_directory() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("resourcetree")
}

/// Path of the user's configuration file.
pub fn config_file_path() -> PathBuf {
    config_directory().join("config.ini")
}

impl ConfigFile {
    /// Load the user's configuration file; a missing file yields defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = config_file_path();
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    /// Load from an explicit path. Absent keys keep their defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_file(path).map_err(|e| match e {
            ini::Error::Io(e) => ConfigError::Io(e),
            ini::Error::Parse(e) => ConfigError::Parse {
                path: path.to_path_buf(),
                message: e.to_string(),
            },
        })?;

        let mut config = Self::default();
        for key in ConfigKey::all() {
            if let Some(value) = ini
                .section(Some(key.section()))
                .and_then(|section| section.get(key.key_name()))
            {
                key.set(&mut config, value)?;
            }
        }
        Ok(config)
    }

    /// Save to the user's configuration file, creating its directory.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&config_file_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut ini = Ini::new();
        for key in ConfigKey::all() {
            let value = key.get(self);
            if !value.is_empty() {
                ini.with_section(Some(key.section()))
                    .set(key.key_name(), value);
            }
        }
        ini.write_to_file(path)?;
        Ok(())
    }

    /// Runtime settings described by this file.
    pub fn to_tree_config(&self) -> TreeConfig {
        TreeConfig::default()
            .with_slow_merge_threshold(Duration::from_millis(self.tree.slow_merge_threshold_ms))
            .with_trace_updates(self.tree.trace_updates)
    }
}

/// A settable configuration key, written `section.key`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigKey {
    TreeSlowMergeThresholdMs,
    TreeTraceUpdates,
    LoggingLevel,
    LoggingDirectory,
}

impl ConfigKey {
    /// Every key, grouped by section.
    pub fn all() -> &'static [ConfigKey] {
        &[
            ConfigKey::TreeSlowMergeThresholdMs,
            ConfigKey::TreeTraceUpdates,
            ConfigKey::LoggingLevel,
            ConfigKey::LoggingDirectory,
        ]
    }

    /// Section names in file order.
    pub fn sections() -> &'static [&'static str] {
        &["tree", "logging"]
    }

    /// Keys stored under `section`, in file order.
    pub fn in_section(section: &str) -> impl Iterator<Item = ConfigKey> + '_ {
        ConfigKey::all()
            .iter()
            .copied()
            .filter(move |key| key.section() == section)
    }

    pub fn section(&self) -> &'static str {
        match self {
            ConfigKey::TreeSlowMergeThresholdMs | ConfigKey::TreeTraceUpdates => "tree",
            ConfigKey::LoggingLevel | ConfigKey::LoggingDirectory => "logging",
        }
    }

    pub fn key_name(&self) -> &'static str {
        match self {
            ConfigKey::TreeSlowMergeThresholdMs => "slow_merge_threshold_ms",
            ConfigKey::TreeTraceUpdates => "trace_updates",
            ConfigKey::LoggingLevel => "level",
            ConfigKey::LoggingDirectory => "directory",
        }
    }

    /// Full `section.key` name.
    pub fn name(&self) -> String {
        format!("{}.{}", self.section(), self.key_name())
    }

    /// Current value as text; empty if unset.
    pub fn get(&self, config: &ConfigFile) -> String {
        match self {
            ConfigKey::TreeSlowMergeThresholdMs => config.tree.slow_merge_threshold_ms.to_string(),
            ConfigKey::TreeTraceUpdates => config.tree.trace_updates.to_string(),
            ConfigKey::LoggingLevel => config.logging.level.clone(),
            ConfigKey::LoggingDirectory => config
                .logging
                .directory
                .as_ref()
                .map(|dir| dir.display().to_string())
                .unwrap_or_default(),
        }
    }

    /// Parse and store `value`.
    pub fn set(&self, config: &mut ConfigFile, value: &str) -> Result<(), ConfigError> {
        let value = value.trim();
        let invalid = |reason: &str| ConfigError::InvalidValue {
            key: self.name(),
            value: value.to_string(),
            reason: reason.to_string(),
        };

        match self {
            ConfigKey::TreeSlowMergeThresholdMs => {
                config.tree.slow_merge_threshold_ms = value
                    .parse()
                    .map_err(|_| invalid("expected a whole number of milliseconds"))?;
            }
            ConfigKey::TreeTraceUpdates => {
                config.tree.trace_updates = parse_bool(value)
                    .ok_or_else(|| invalid("expected true or false"))?;
            }
            ConfigKey::LoggingLevel => {
                let level = value.to_ascii_lowercase();
                if !LOG_LEVELS.contains(&level.as_str()) {
                    return Err(invalid("expected one of trace, debug, info, warn, error"));
                }
                config.logging.level = level;
            }
            ConfigKey::LoggingDirectory => {
                config.logging.directory = if value.is_empty() {
                    None
                } else {
                    Some(PathBuf::from(value))
                };
            }
        }
        Ok(())
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.section(), self.key_name())
    }
}

impl FromStr for ConfigKey {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ConfigKey::all()
            .iter()
            .copied()
            .find(|key| key.name() == s)
            .ok_or_else(|| ConfigError::UnknownKey(s.to_string()))
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Some(true),
        "false" | "no" | "off" | "0" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_tree_config_builder() {
        let config = TreeConfig::new()
            .with_slow_merge_threshold(Duration::from_millis(5))
            .with_trace_updates(true);
        assert_eq!(config.slow_merge_threshold, Duration::from_millis(5));
        assert!(config.trace_updates);
        assert!(!TreeConfig::default().trace_updates);
    }

    #[test]
    fn test_key_parsing() {
        let key: ConfigKey = "tree.trace_updates".parse().unwrap();
        assert_eq!(key, ConfigKey::TreeTraceUpdates);
        assert_eq!(key.to_string(), "tree.trace_updates");
        assert!(matches!(
            "tree.nope".parse::<ConfigKey>(),
            Err(ConfigError::UnknownKey(_))
        ));
    }

    #[test]
    fn test_sections_cover_every_key_once() {
        let grouped: Vec<ConfigKey> = ConfigKey::sections()
            .iter()
            .flat_map(|section| ConfigKey::in_section(section))
            .collect();
        assert_eq!(grouped, ConfigKey::all());
        assert_eq!(
            ConfigKey::in_section("logging").collect::<Vec<_>>(),
            vec![ConfigKey::LoggingLevel, ConfigKey::LoggingDirectory]
        );
        assert_eq!(ConfigKey::in_section("nope").count(), 0);
    }

    #[test]
    fn test_set_validates_values() {
        let mut config = ConfigFile::default();
        ConfigKey::LoggingLevel.set(&mut config, "DEBUG").unwrap();
        assert_eq!(config.logging.level, "debug");
        assert!(ConfigKey::LoggingLevel.set(&mut config, "loud").is_err());
        assert!(ConfigKey::TreeSlowMergeThresholdMs.set(&mut config, "-3").is_err());
        ConfigKey::TreeTraceUpdates.set(&mut config, "yes").unwrap();
        assert!(config.tree.trace_updates);
        ConfigKey::LoggingDirectory.set(&mut config, "").unwrap();
        assert_eq!(config.logging.directory, None);
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.ini");

        let mut config = ConfigFile::default();
        config.tree.slow_merge_threshold_ms = 25;
        config.tree.trace_updates = true;
        config.logging.directory = Some(PathBuf::from("/tmp/logs"));
        config.save_to(&path).unwrap();

        let loaded = ConfigFile::load_from(&path).unwrap();
        assert_eq!(loaded, config);

        let tree = loaded.to_tree_config();
        assert_eq!(tree.slow_merge_threshold, Duration::from_millis(25));
        assert!(tree.trace_updates);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.ini");
        std::fs::write(&path, "[logging]\nlevel = warn\n").unwrap();

        let loaded = ConfigFile::load_from(&path).unwrap();
        assert_eq!(loaded.logging.level, "warn");
        assert_eq!(loaded.tree, TreeSection::default());
    }

    #[test]
    fn test_invalid_value_in_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.ini");
        std::fs::write(&path, "[tree]\ntrace_updates = maybe\n").unwrap();

        assert!(matches!(
            ConfigFile::load_from(&path),
            Err(ConfigError::InvalidValue { .. })
        ));
    }
}
