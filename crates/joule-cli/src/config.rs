//! Runner configuration file.

use std::path::{Path, PathBuf};

use joule_coordinator::{ConfigError, CoordinatorConfig};
use serde::{Deserialize, Serialize};

/// Default bridge address.
pub const DEFAULT_BRIDGE: &str = "127.0.0.1:7878";

/// Default preference file.
pub const DEFAULT_PREFERENCES: &str = "joule-preferences.json";

/// Everything the `joule` binary needs to reach one circulator.
///
/// ```yaml
/// bridge: 192.168.1.20:7878
/// preferences: /var/lib/joule/prefs.json
/// coordinator:
///   name: kitchen
///   notification_timeout_ms: 8000
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Bridge `host:port`.
    pub bridge: String,
    /// JSON file holding the display-unit preference.
    pub preferences: PathBuf,
    /// Coordinator settings.
    pub coordinator: CoordinatorConfig,
}

impl Default for CliConfig {
    fn default() -> Self {
        CliConfig {
            bridge: DEFAULT_BRIDGE.to_string(),
            preferences: PathBuf::from(DEFAULT_PREFERENCES),
            coordinator: CoordinatorConfig::default(),
        }
    }
}

impl CliConfig {
    /// Load and validate a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml(&text)
    }

    /// Parse and validate YAML.
    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        let config: CliConfig = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the bridge address and coordinator settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bridge.trim().is_empty() {
            return Err(ConfigError::Invalid("bridge address is empty".into()));
        }
        self.coordinator.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CliConfig::default();
        assert_eq!(config.bridge, DEFAULT_BRIDGE);
        assert_eq!(config.preferences, PathBuf::from(DEFAULT_PREFERENCES));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_yaml() {
        let config = CliConfig::from_yaml(
            "bridge: 10.0.0.5:9000\ncoordinator:\n  name: kitchen\n  feed_id: 3\n",
        )
        .unwrap();
        assert_eq!(config.bridge, "10.0.0.5:9000");
        assert_eq!(config.coordinator.name, "kitchen");
        assert_eq!(config.coordinator.feed_id, 3);
        assert_eq!(config.coordinator.poll_interval_ms, 30_000);
    }

    #[test]
    fn test_invalid() {
        assert!(matches!(
            CliConfig::from_yaml("bridge: \"\"\n"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            CliConfig::from_yaml("coordinator:\n  notification_timeout_ms: 0\n"),
            Err(ConfigError::Invalid(_))
        ));
    }
}
