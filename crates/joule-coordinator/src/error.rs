//! Error types for the coordinator crate.

use std::io;
use std::time::Duration;

use joule_protocol::AddressError;
use joule_transport::TransportError;
use thiserror::Error;

/// Errors returned by [`crate::DeviceCoordinator`] operations.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// Connecting, subscribing or writing a poll failed.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// No data point arrived before the deadline.
    #[error("no data point within {0:?}")]
    Timeout(Duration),

    /// A command could not be written. Local state still reflects it.
    #[error("{command} command not confirmed: {source}")]
    Unconfirmed {
        /// Command name (`start`, `stop`).
        command: &'static str,
        /// Why the write failed.
        #[source]
        source: TransportError,
    },

    /// A setting is outside its allowed range.
    #[error("{what} {value} out of range [{min}, {max}]")]
    OutOfRange {
        /// Which setting.
        what: &'static str,
        /// Rejected value.
        value: f64,
        /// Lowest allowed value.
        min: f64,
        /// Highest allowed value.
        max: f64,
    },

    /// Saving a preference failed.
    #[error("preference store error: {0}")]
    Store(#[from] StoreError),

    /// A blocking transport task panicked or was cancelled.
    #[error("transport task failed: {0}")]
    Task(String),
}

/// Errors from a [`crate::PreferenceStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    /// Reading or writing the backing file failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The backing file is not valid JSON.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Reading the configuration file failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The configuration is not valid YAML.
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A device address is malformed.
    #[error("invalid address: {0}")]
    Address(#[from] AddressError),

    /// A value is outside its allowed range.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// A temperature unit name that is not recognized.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown temperature unit '{0}'")]
pub struct UnknownUnit(pub String);
