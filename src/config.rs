use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Storage layer configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// The protected file: never deleted, never cleared
    #[serde(default = "default_main_path")]
    pub main_path: String,

    /// Window in which repeated notifications for one path collapse
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Expected writes older than this are swept as stale
    #[serde(default = "default_expected_write_ttl_ms")]
    pub expected_write_ttl_ms: u64,

    /// Delay before queued pending tabs are flushed to the subscriber
    #[serde(default = "default_pending_flush_delay_ms")]
    pub pending_flush_delay_ms: u64,

    /// Capacity ceiling of the key/value store, in UTF-16 cost bytes
    #[serde(default = "default_capacity_bytes")]
    pub capacity_bytes: u64,

    #[serde(default = "default_warning_ratio")]
    pub warning_ratio: f64,

    #[serde(default = "default_critical_ratio")]
    pub critical_ratio: f64,

    /// Snapshots kept per configuration by the "clean old snapshots" remediation
    #[serde(default = "default_keep_snapshots")]
    pub keep_snapshots: usize,

    #[serde(default)]
    pub layout: StorageLayout,
}

fn default_main_path() -> String {
    "/main.py".to_string()
}

fn default_debounce_ms() -> u64 {
    120
}

fn default_expected_write_ttl_ms() -> u64 {
    5_000
}

fn default_pending_flush_delay_ms() -> u64 {
    10
}

fn default_capacity_bytes() -> u64 {
    5 * 1024 * 1024
}

fn default_warning_ratio() -> f64 {
    0.8
}

fn default_critical_ratio() -> f64 {
    0.9
}

fn default_keep_snapshots() -> usize {
    3
}

/// Key names used inside the key/value store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageLayout {
    /// Every snapshot collection key starts with this prefix, followed by the config id
    #[serde(default = "default_snapshot_prefix")]
    pub snapshot_prefix: String,

    /// Single key holding the JSON object path -> content
    #[serde(default = "default_file_mirror_key")]
    pub file_mirror_key: String,

    /// Single key holding the latest autosave payload
    #[serde(default = "default_autosave_key")]
    pub autosave_key: String,
}

fn default_snapshot_prefix() -> String {
    "snapshots_".to_string()
}

fn default_file_mirror_key() -> String {
    "vfs_files_v1".to_string()
}

fn default_autosave_key() -> String {
    "autosave_v1".to_string()
}

impl Default for StorageLayout {
    fn default() -> Self {
        Self {
            snapshot_prefix: default_snapshot_prefix(),
            file_mirror_key: default_file_mirror_key(),
            autosave_key: default_autosave_key(),
        }
    }
}

impl StorageLayout {
    /// Storage key of the snapshot collection for a configuration identity
    pub fn snapshot_key(&self, config_id: &str) -> String {
        format!("{}{}", self.snapshot_prefix, config_id)
    }

    pub fn is_snapshot_key(&self, key: &str) -> bool {
        key.starts_with(&self.snapshot_prefix)
    }

    /// Inverse of [`snapshot_key`](Self::snapshot_key)
    pub fn config_id_of<'a>(&self, key: &'a str) -> Option<&'a str> {
        key.strip_prefix(self.snapshot_prefix.as_str())
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            main_path: default_main_path(),
            debounce_ms: default_debounce_ms(),
            expected_write_ttl_ms: default_expected_write_ttl_ms(),
            pending_flush_delay_ms: default_pending_flush_delay_ms(),
            capacity_bytes: default_capacity_bytes(),
            warning_ratio: default_warning_ratio(),
            critical_ratio: default_critical_ratio(),
            keep_snapshots: default_keep_snapshots(),
            layout: StorageLayout::default(),
        }
    }
}

impl StorageConfig {
    pub fn debounce_window(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn expected_write_ttl(&self) -> Duration {
        Duration::from_millis(self.expected_write_ttl_ms)
    }

    pub fn pending_flush_delay(&self) -> Duration {
        Duration::from_millis(self.pending_flush_delay_ms)
    }

    /// Load configuration from a JSON file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::IoError(e.to_string()))?;

        let config: StorageConfig =
            serde_json::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a JSON file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let contents = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path.as_ref(), contents).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.main_path.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "main_path must not be empty".to_string(),
            ));
        }

        if self.capacity_bytes == 0 {
            return Err(ConfigError::ValidationError(
                "capacity_bytes must be greater than 0".to_string(),
            ));
        }

        let in_range = |r: f64| r > 0.0 && r <= 1.0;
        if !in_range(self.warning_ratio) || !in_range(self.critical_ratio) {
            return Err(ConfigError::ValidationError(
                "warning_ratio and critical_ratio must be in (0, 1]".to_string(),
            ));
        }

        if self.warning_ratio >= self.critical_ratio {
            return Err(ConfigError::ValidationError(
                "warning_ratio must be below critical_ratio".to_string(),
            ));
        }

        if self.keep_snapshots == 0 {
            return Err(ConfigError::ValidationError(
                "keep_snapshots must be at least 1".to_string(),
            ));
        }

        if self.layout.snapshot_prefix.is_empty() {
            return Err(ConfigError::ValidationError(
                "layout.snapshot_prefix must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}

/// Configuration error types
#[derive(Debug)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    SerializeError(String),
    ValidationError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(msg) => write!(f, "IO error: {msg}"),
            ConfigError::ParseError(msg) => write!(f, "Parse error: {msg}"),
            ConfigError::SerializeError(msg) => write!(f, "Serialize error: {msg}"),
            ConfigError::ValidationError(msg) => write!(f, "Validation error: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = StorageConfig::default();
        assert_eq!(config.main_path, "/main.py");
        assert_eq!(config.debounce_ms, 120);
        assert_eq!(config.keep_snapshots, 3);
        assert_eq!(config.capacity_bytes, 5 * 1024 * 1024);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: StorageConfig =
            serde_json::from_str(r#"{"main_path": "/app.js", "layout": {"autosave_key": "as"}}"#)
                .unwrap();
        assert_eq!(config.main_path, "/app.js");
        assert_eq!(config.debounce_ms, 120);
        assert_eq!(config.layout.autosave_key, "as");
        assert_eq!(config.layout.snapshot_prefix, "snapshots_");
    }

    #[test]
    fn test_snapshot_key_round_trip() {
        let layout = StorageLayout::default();
        let key = layout.snapshot_key("cfg-1");
        assert_eq!(key, "snapshots_cfg-1");
        assert!(layout.is_snapshot_key(&key));
        assert_eq!(layout.config_id_of(&key), Some("cfg-1"));
        assert_eq!(layout.config_id_of("autosave_v1"), None);
    }

    #[test]
    fn test_config_validation() {
        let mut config = StorageConfig::default();
        config.warning_ratio = 0.95;
        assert!(config.validate().is_err());

        let mut config = StorageConfig::default();
        config.keep_snapshots = 0;
        assert!(config.validate().is_err());

        let mut config = StorageConfig::default();
        config.main_path = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_and_load_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("storage.json");

        let mut config = StorageConfig::default();
        config.capacity_bytes = 1024;
        config.save_to_file(&path).unwrap();

        let loaded = StorageConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }
}
