//! Transport links to a Joule circulator.
//!
//! The circulator accepts exactly one connection and handles one outstanding
//! command at a time. A [`Transport`] owns that connection and exposes
//! blocking primitives; it does not serialize callers, so the owner must.
//!
//! Two implementations are provided:
//!
//! - [`TcpTransport`]: a TCP bridge relaying the device characteristic using
//!   the framing from [`joule_protocol::FrameCodec`]
//! - [`MockTransport`]: an in-memory scripted device for tests

mod error;
mod mock;
mod tcp;

use std::time::Duration;

pub use error::TransportError;
pub use mock::{MockDevice, MockTransport};
pub use tcp::TcpTransport;

/// Callback invoked with each raw notification from the device.
pub type NotificationCallback = Box<dyn Fn(&[u8]) + Send + Sync + 'static>;

/// A single physical connection to the device.
///
/// All methods block.
pub trait Transport: Send + 'static {
    /// Short transport name for logs and metric labels (`tcp`, `mock`).
    fn kind(&self) -> &'static str;

    /// Whether a connection is currently established.
    fn is_connected(&self) -> bool;

    /// Connect if not already connected. A no-op while connected; never
    /// retries internally.
    fn ensure_connected(&mut self) -> Result<(), TransportError>;

    /// Write one message to the device.
    fn write(&mut self, data: &[u8]) -> Result<(), TransportError>;

    /// Read the next notification. Only yields notifications that arrive
    /// while no callback is subscribed.
    fn read(&mut self, timeout: Duration) -> Result<Vec<u8>, TransportError>;

    /// Register the notification callback for this connection, replacing any
    /// previous one. Cleared on disconnect.
    fn subscribe(&mut self, callback: NotificationCallback) -> Result<(), TransportError>;

    /// Tear down the connection. Idempotent.
    fn disconnect(&mut self);
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn kind(&self) -> &'static str {
        (**self).kind()
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }

    fn ensure_connected(&mut self) -> Result<(), TransportError> {
        (**self).ensure_connected()
    }

    fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        (**self).write(data)
    }

    fn read(&mut self, timeout: Duration) -> Result<Vec<u8>, TransportError> {
        (**self).read(timeout)
    }

    fn subscribe(&mut self, callback: NotificationCallback) -> Result<(), TransportError> {
        (**self).subscribe(callback)
    }

    fn disconnect(&mut self) {
        (**self).disconnect()
    }
}
