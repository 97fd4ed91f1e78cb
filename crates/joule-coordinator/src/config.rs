//! Coordinator configuration.
//!
//! Durations are stored as integer milliseconds so the YAML stays readable;
//! accessors hand out [`Duration`]s.

use std::path::Path;
use std::time::Duration;

use joule_protocol::DeviceAddress;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::snapshot::DEFAULT_TARGET_C;
use crate::units::{CELSIUS_BOUNDS, MAX_DURATION_SECONDS};

/// Configuration for a [`crate::DeviceCoordinator`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Device name used in logs and metric labels.
    pub name: String,

    /// Interval between background refreshes (milliseconds).
    pub poll_interval_ms: u64,

    /// How long a refresh waits for a data point (milliseconds).
    pub notification_timeout_ms: u64,

    /// Connection timeout (milliseconds).
    pub connect_timeout_ms: u64,

    /// Feed id sent with live-feed requests.
    pub feed_id: u32,

    /// Address placed in the sender field, `AA:BB:CC:DD:EE:FF`.
    pub sender: String,

    /// Address placed in the recipient field.
    pub recipient: String,

    /// Target temperature at startup (°C).
    pub default_target_c: f32,

    /// Cook time at startup (seconds, 0 = no limit).
    pub default_duration_secs: u32,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        CoordinatorConfig {
            name: "joule".to_string(),
            poll_interval_ms: 30_000,
            notification_timeout_ms: 5_000,
            connect_timeout_ms: 10_000,
            feed_id: 1,
            sender: DeviceAddress::default().to_string(),
            recipient: DeviceAddress::default().to_string(),
            default_target_c: DEFAULT_TARGET_C,
            default_duration_secs: 0,
        }
    }
}

impl CoordinatorConfig {
    /// Default config with the given device name.
    pub fn named(name: impl Into<String>) -> Self {
        CoordinatorConfig {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Set the notification timeout.
    pub fn with_notification_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.notification_timeout_ms = timeout_ms;
        self
    }

    /// Set the poll interval.
    pub fn with_poll_interval_ms(mut self, interval_ms: u64) -> Self {
        self.poll_interval_ms = interval_ms;
        self
    }

    /// Load from a YAML file and validate.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml(&text)
    }

    /// Parse YAML and validate. Missing keys take their defaults.
    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        let config: CoordinatorConfig = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check ranges and addresses.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid("poll_interval_ms must be positive".into()));
        }
        if self.notification_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "notification_timeout_ms must be positive".into(),
            ));
        }
        if self.connect_timeout_ms == 0 {
            return Err(ConfigError::Invalid("connect_timeout_ms must be positive".into()));
        }
        if !CELSIUS_BOUNDS.contains(self.default_target_c) {
            return Err(ConfigError::Invalid(format!(
                "default_target_c {} outside [{}, {}]",
                self.default_target_c, CELSIUS_BOUNDS.min, CELSIUS_BOUNDS.max
            )));
        }
        if self.default_duration_secs > MAX_DURATION_SECONDS {
            return Err(ConfigError::Invalid(format!(
                "default_duration_secs {} exceeds {}",
                self.default_duration_secs, MAX_DURATION_SECONDS
            )));
        }
        self.sender_address()?;
        self.recipient_address()?;
        Ok(())
    }

    /// Poll interval as a [`Duration`].
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Notification timeout as a [`Duration`].
    pub fn notification_timeout(&self) -> Duration {
        Duration::from_millis(self.notification_timeout_ms)
    }

    /// Connect timeout as a [`Duration`].
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Parsed sender address.
    pub fn sender_address(&self) -> Result<DeviceAddress, ConfigError> {
        Ok(self.sender.parse()?)
    }

    /// Parsed recipient address.
    pub fn recipient_address(&self) -> Result<DeviceAddress, ConfigError> {
        Ok(self.recipient.parse()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CoordinatorConfig::default();
        assert_eq!(config.poll_interval(), Duration::from_secs(30));
        assert_eq!(config.notification_timeout(), Duration::from_secs(5));
        assert_eq!(config.connect_timeout(), Duration::from_secs(10));
        assert_eq!(config.feed_id, 1);
        assert!(config.sender_address().unwrap().is_zero());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_yaml_partial() {
        let config = CoordinatorConfig::from_yaml(
            "name: kitchen\npoll_interval_ms: 10000\nrecipient: \"01:02:03:04:05:06\"\n",
        )
        .unwrap();
        assert_eq!(config.name, "kitchen");
        assert_eq!(config.poll_interval_ms, 10_000);
        assert_eq!(config.notification_timeout_ms, 5_000);
        assert_eq!(
            config.recipient_address().unwrap(),
            DeviceAddress::new([1, 2, 3, 4, 5, 6])
        );
    }

    #[test]
    fn test_validate_rejects() {
        let config = CoordinatorConfig::default().with_poll_interval_ms(0);
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let config = CoordinatorConfig {
            default_target_c: 150.0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let config = CoordinatorConfig {
            sender: "not-an-address".into(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Address(_))));

        assert!(matches!(
            CoordinatorConfig::from_yaml("poll_interval_ms: [1]"),
            Err(ConfigError::Yaml(_))
        ));
    }
}
