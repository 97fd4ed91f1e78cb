//! TCP bridge transport.
//!
//! Connects to a bridge process that relays the circulator's BLE
//! characteristic over TCP. Each stream message is wrapped in a bridge frame
//! (`'<'`/`'>'` + 2-byte length). A reader thread splits incoming bytes into
//! frames and hands them to the subscribed callback, or queues them for
//! [`Transport::read`] when nobody is subscribed.

use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use joule_protocol::FrameCodec;
use parking_lot::Mutex;
use tracing::{debug, info, trace, warn};

use crate::{NotificationCallback, Transport, TransportError};

type CallbackSlot = Arc<Mutex<Option<NotificationCallback>>>;

/// State that exists only while connected.
struct Connection {
    stream: TcpStream,
    reader: JoinHandle<()>,
    alive: Arc<AtomicBool>,
    frames: Receiver<Vec<u8>>,
}

/// Blocking TCP link to a bridge.
pub struct TcpTransport {
    target: String,
    connect_timeout: Duration,
    io_timeout: Duration,
    callback: CallbackSlot,
    connection: Option<Connection>,
}

impl TcpTransport {
    /// Create a transport for `target` (`host:port`). Does not connect.
    pub fn new(target: impl Into<String>, connect_timeout: Duration) -> Self {
        TcpTransport {
            target: target.into(),
            connect_timeout,
            io_timeout: connect_timeout,
            callback: Arc::new(Mutex::new(None)),
            connection: None,
        }
    }

    /// Set the socket write timeout used once connected.
    pub fn with_io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout = timeout;
        self
    }

    /// The bridge address.
    pub fn target(&self) -> &str {
        &self.target
    }

    fn resolve(&self) -> Result<Vec<SocketAddr>, TransportError> {
        let addrs: Vec<SocketAddr> = self
            .target
            .to_socket_addrs()
            .map_err(|e| self.connect_error(e))?
            .collect();
        if addrs.is_empty() {
            return Err(self.connect_error(io::Error::new(
                io::ErrorKind::NotFound,
                "address resolved to nothing",
            )));
        }
        Ok(addrs)
    }

    fn connect_error(&self, source: io::Error) -> TransportError {
        TransportError::ConnectFailed {
            target: self.target.clone(),
            source,
        }
    }

    fn open(&self) -> Result<Connection, TransportError> {
        let mut last_err = None;
        for addr in self.resolve()? {
            match TcpStream::connect_timeout(&addr, self.connect_timeout) {
                Ok(stream) => return self.start_reader(stream),
                Err(e) => {
                    debug!("TcpTransport[{}]: connect to {} failed: {}", self.target, addr, e);
                    last_err = Some(e);
                }
            }
        }
        Err(self.connect_error(last_err.unwrap_or_else(|| {
            io::Error::new(io::ErrorKind::NotConnected, "no address to connect to")
        })))
    }

    fn start_reader(&self, stream: TcpStream) -> Result<Connection, TransportError> {
        stream.set_nodelay(true)?;
        stream.set_write_timeout(Some(self.io_timeout))?;
        let read_half = stream.try_clone()?;

        let alive = Arc::new(AtomicBool::new(true));
        let (frames_tx, frames_rx) = crossbeam_channel::unbounded();
        let callback = Arc::clone(&self.callback);
        let reader_alive = Arc::clone(&alive);
        let name = self.target.clone();

        let reader = thread::Builder::new()
            .name(format!("joule-bridge-{}", self.target))
            .spawn(move || reader_main(name, read_half, callback, frames_tx, reader_alive))?;

        Ok(Connection {
            stream,
            reader,
            alive,
            frames: frames_rx,
        })
    }
}

/// Reader thread: split the byte stream into frames and deliver them.
fn reader_main(
    name: String,
    mut stream: TcpStream,
    callback: CallbackSlot,
    frames_tx: Sender<Vec<u8>>,
    alive: Arc<AtomicBool>,
) {
    let mut codec = FrameCodec::new();
    let mut buf = [0u8; 512];

    loop {
        match stream.read(&mut buf) {
            Ok(0) => {
                debug!("TcpTransport[{}]: bridge closed the connection", name);
                break;
            }
            Ok(n) => {
                codec.push(&buf[..n]);
                while let Some(frame) = codec.decode() {
                    trace!("TcpTransport[{}]: received frame ({} bytes)", name, frame.len());
                    let slot = callback.lock();
                    match slot.as_ref() {
                        Some(cb) => cb(&frame),
                        None => {
                            let _ = frames_tx.send(frame);
                        }
                    }
                }
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                debug!("TcpTransport[{}]: read error: {}", name, e);
                break;
            }
        }
    }

    alive.store(false, Ordering::SeqCst);
}

impl Transport for TcpTransport {
    fn kind(&self) -> &'static str {
        "tcp"
    }

    fn is_connected(&self) -> bool {
        self.connection
            .as_ref()
            .map(|c| c.alive.load(Ordering::SeqCst))
            .unwrap_or(false)
    }

    fn ensure_connected(&mut self) -> Result<(), TransportError> {
        if self.is_connected() {
            return Ok(());
        }
        // Reap a connection the bridge dropped
        self.disconnect();

        debug!("TcpTransport[{}]: connecting", self.target);
        let connection = self.open()?;
        info!("TcpTransport[{}]: connected", self.target);
        self.connection = Some(connection);
        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        let frame =
            FrameCodec::encode(data).map_err(|_| TransportError::FrameTooLarge(data.len()))?;
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        let connection = self.connection.as_mut().ok_or(TransportError::NotConnected)?;

        trace!("TcpTransport[{}]: writing {} bytes", self.target, data.len());
        if let Err(e) = connection.stream.write_all(&frame) {
            warn!("TcpTransport[{}]: write failed: {}", self.target, e);
            connection.alive.store(false, Ordering::SeqCst);
            return Err(e.into());
        }
        Ok(())
    }

    fn read(&mut self, timeout: Duration) -> Result<Vec<u8>, TransportError> {
        let connection = self.connection.as_ref().ok_or(TransportError::NotConnected)?;
        match connection.frames.recv_timeout(timeout) {
            Ok(frame) => Ok(frame),
            Err(RecvTimeoutError::Timeout) => Err(TransportError::Timeout),
            Err(RecvTimeoutError::Disconnected) => Err(TransportError::Closed),
        }
    }

    fn subscribe(&mut self, callback: NotificationCallback) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        *self.callback.lock() = Some(callback);
        Ok(())
    }

    fn disconnect(&mut self) {
        if let Some(connection) = self.connection.take() {
            debug!("TcpTransport[{}]: disconnecting", self.target);
            let _ = connection.stream.shutdown(Shutdown::Both);
            if connection.reader.join().is_err() {
                warn!("TcpTransport[{}]: reader thread panicked", self.target);
            }
        }
        *self.callback.lock() = None;
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        self.disconnect();
    }
}
