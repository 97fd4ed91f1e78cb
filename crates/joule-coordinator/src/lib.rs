//! Device coordination for a Joule circulator.
//!
//! [`DeviceCoordinator`] owns one [`joule_transport::Transport`], serializes
//! every command and poll against it, and publishes a [`Snapshot`] that
//! consumers can read at any time.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use joule_coordinator::{CoordinatorConfig, DeviceCoordinator, MemoryStore};
//! use joule_transport::TcpTransport;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = CoordinatorConfig::named("kitchen");
//! let transport = TcpTransport::new("127.0.0.1:7000", config.connect_timeout());
//! let coordinator = DeviceCoordinator::new(transport, config, Arc::new(MemoryStore::new()))?;
//!
//! coordinator.start(60.0, 2 * 60 * 60).await?;
//! let snapshot = coordinator.refresh().await?;
//! println!("bath at {:.1}°C", snapshot.current_temperature_c);
//! # Ok(())
//! # }
//! ```

mod config;
mod coordinator;
mod error;
mod snapshot;
mod store;
pub mod units;

pub use config::CoordinatorConfig;
pub use coordinator::{DeviceCoordinator, LinkState};
pub use error::{ConfigError, CoordinatorError, StoreError, UnknownUnit};
pub use snapshot::{Snapshot, DEFAULT_TARGET_C};
pub use store::{FileStore, MemoryStore, PreferenceStore};
pub use units::{DisplayUnit, TemperatureBounds};
