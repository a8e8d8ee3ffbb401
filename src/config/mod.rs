//! Configuration module for credvault.
//!
//! Handles loading and parsing the `~/.credvault/config` file.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::logging::LogConfig;
use crate::vault::{FailurePolicy, KeyStore};

/// Application directory name under the home directory.
const APP_DIR_NAME: &str = ".credvault";

/// Config file name inside the application directory.
const CONFIG_FILE_NAME: &str = "config";

/// Credential store file name inside the application directory.
const STORE_FILE_NAME: &str = "sessions.toml";

/// Default suffix for pre-migration backups.
pub const DEFAULT_BACKUP_SUFFIX: &str = ".bak";

/// Default config file content with all settings documented.
const DEFAULT_CONFIG: &str = r#"# credvault configuration file
# =============================
# Lines starting with '#' are comments.
#
# Files
# -----
# key_file   = ~/.credvault/.masterkey     # Derived master key (32 bytes)
# store_file = ~/.credvault/sessions.toml  # Saved connection credentials

# Crypto failure policy
# ---------------------
# fail_open:   a value that cannot be encrypted or decrypted is passed
#              through unchanged and the failure is logged
# fail_closed: the failure is reported as an error
failure_policy = fail_open

# Migration
# ---------
# Suffix appended to the store file name for the pre-migration backup.
# backup_suffix = .bak

# Logging Configuration
# ---------------------
# Logs are stored in ~/.credvault/logs/ with automatic cleanup.
#
# log_enabled = true       # Enable/disable file logging (true/false)
# log_level = info         # Log level: trace, debug, info, warn, error, off
# log_retention = 24       # Hours to keep log files (default: 24)
# log_dir = ~/.credvault/logs
"#;

/// Returns the application directory (~/.credvault).
#[must_use]
pub fn app_directory() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the master key file.
    pub key_file: PathBuf,
    /// Path to the credential store file.
    pub store_file: PathBuf,
    /// Crypto failure policy.
    pub failure_policy: FailurePolicy,
    /// Suffix for pre-migration backups.
    pub backup_suffix: String,
    /// Path to config file.
    pub config_path: PathBuf,
    /// Logging configuration.
    pub log_config: LogConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            key_file: KeyStore::default_key_path(),
            store_file: app_directory().join(STORE_FILE_NAME),
            failure_policy: FailurePolicy::default(),
            backup_suffix: DEFAULT_BACKUP_SUFFIX.to_string(),
            config_path: Self::default_config_path(),
            log_config: LogConfig::default(),
        }
    }
}

impl Config {
    /// Returns the default config file path (~/.credvault/config).
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        app_directory().join(CONFIG_FILE_NAME)
    }

    /// Loads configuration from the default path, creating it if it doesn't exist.
    ///
    /// # Errors
    /// Returns error if config cannot be read.
    pub fn load() -> io::Result<Self> {
        let path = Self::default_config_path();
        Self::load_from(&path)
    }

    /// Loads configuration from a specific path.
    ///
    /// # Errors
    /// Returns error if config cannot be read.
    pub fn load_from(path: &Path) -> io::Result<Self> {
        // Create default config if it doesn't exist
        if !path.exists() {
            Self::create_default_config(path)?;
        }

        let content = fs::read_to_string(path)?;
        let mut config = Self {
            config_path: path.to_path_buf(),
            ..Self::default()
        };
        config.parse(&content);

        Ok(config)
    }

    /// Creates the default config file.
    fn create_default_config(path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = fs::File::create(path)?;
        file.write_all(DEFAULT_CONFIG.as_bytes())?;
        Ok(())
    }

    /// Parses the config file content.
    fn parse(&mut self, content: &str) {
        for line in content.lines() {
            let line = line.trim();

            // Skip comments and empty lines
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            // Parse key = value
            if let Some((key, value)) = line.split_once('=') {
                let key = key.trim();
                let value = value.trim();

                // Remove inline comments
                let value = value.split('#').next().unwrap_or(value).trim();

                self.apply_setting(key, value);
            }
        }
    }

    /// Applies a single setting.
    fn apply_setting(&mut self, key: &str, value: &str) {
        match key {
            "key_file" => {
                if !value.is_empty() {
                    self.key_file = expand_home(value);
                }
            }
            "store_file" => {
                if !value.is_empty() {
                    self.store_file = expand_home(value);
                }
            }
            "failure_policy" => match FailurePolicy::try_parse(value) {
                Some(policy) => self.failure_policy = policy,
                None => tracing::warn!(
                    "Unknown failure_policy '{}', keeping {}",
                    value,
                    self.failure_policy.as_str()
                ),
            },
            "backup_suffix" => {
                if !value.is_empty() {
                    self.backup_suffix = value.to_string();
                }
            }
            "log_level" => {
                self.log_config.level = LogConfig::parse_level(value);
            }
            "log_retention" | "log_retention_hours" => {
                self.log_config.retention_hours = LogConfig::parse_retention(value);
            }
            "log_dir" => {
                if !value.is_empty() {
                    self.log_config.directory = expand_home(value);
                }
            }
            "log_enabled" | "logging" => {
                self.log_config.enabled =
                    matches!(value.to_lowercase().as_str(), "true" | "yes" | "1" | "on");
            }
            _ => {
                tracing::debug!("Ignoring unknown config key: {}", key);
            }
        }
    }
}

/// Expands a leading `~/` to the home directory.
fn expand_home(value: &str) -> PathBuf {
    match value.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(rest),
        None => PathBuf::from(value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.failure_policy, FailurePolicy::FailOpen);
        assert_eq!(config.backup_suffix, DEFAULT_BACKUP_SUFFIX);
        assert!(config.key_file.ends_with(".credvault/.masterkey"));
        assert!(config.store_file.ends_with(".credvault/sessions.toml"));
    }

    #[test]
    fn test_parse_settings() {
        let mut config = Config::default();
        config.parse(
            r#"
# comment
key_file = /tmp/vault/key
store_file = /tmp/vault/store.toml   # inline comment
failure_policy = fail_closed
backup_suffix = .orig
log_level = DEBUG
log_retention = 48
log_enabled = no
log_dir = /tmp/vault/logs
"#,
        );

        assert_eq!(config.key_file, PathBuf::from("/tmp/vault/key"));
        assert_eq!(config.store_file, PathBuf::from("/tmp/vault/store.toml"));
        assert_eq!(config.failure_policy, FailurePolicy::FailClosed);
        assert_eq!(config.backup_suffix, ".orig");
        assert_eq!(config.log_config.level, "debug");
        assert_eq!(config.log_config.retention_hours, 48);
        assert!(!config.log_config.enabled);
        assert_eq!(config.log_config.directory, PathBuf::from("/tmp/vault/logs"));
    }

    #[test]
    fn test_unknown_failure_policy_keeps_current_value() {
        let mut config = Config::default();
        config.parse("failure_policy = fail_closed\nfailure_policy = fail_closd\n");
        assert_eq!(config.failure_policy, FailurePolicy::FailClosed);

        config.apply_setting("failure_policy", "open");
        assert_eq!(config.failure_policy, FailurePolicy::FailOpen);
    }

    #[test]
    fn test_expand_home() {
        let expanded = expand_home("~/keys/master");
        assert!(expanded.ends_with("keys/master"));
        assert_ne!(expanded, PathBuf::from("~/keys/master"));
        assert_eq!(expand_home("/abs/path"), PathBuf::from("/abs/path"));
    }

    #[test]
    fn test_load_from_creates_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sub").join("config");

        let config = Config::load_from(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.config_path, path);
        assert_eq!(config.failure_policy, FailurePolicy::FailOpen);
    }
}
