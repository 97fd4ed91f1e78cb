//! In-memory mock transport for testing.
//!
//! [`MockTransport`] plays the host side of the link; the paired
//! [`MockDevice`] handle lets a test script the circulator: fail connects or
//! writes, slow writes down, reply to live-feed requests, push unsolicited
//! notifications and inspect what was written.

use std::collections::VecDeque;
use std::io;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use joule_protocol::{decode, encode, ProgramStep, TelemetryDataPoint, WireMessage};
use parking_lot::{Condvar, Mutex};
use tracing::trace;

use crate::{NotificationCallback, Transport, TransportError};

type SharedCallback = Arc<dyn Fn(&[u8]) + Send + Sync + 'static>;

#[derive(Default)]
struct MockState {
    connected: bool,
    callback: Option<SharedCallback>,
    inbox: VecDeque<Vec<u8>>,

    connect_failures: usize,
    write_failures: usize,
    write_latency: Duration,
    reply: Option<TelemetryDataPoint>,
    reply_latency: Duration,
    follow_commands: bool,
    sequence: u32,

    written: Vec<Vec<u8>>,
    connects: usize,
    subscribes: usize,
    in_flight: usize,
    max_in_flight: usize,
    pending_polls: usize,
    interleaved_writes: usize,
}

struct Shared {
    state: Mutex<MockState>,
    inbox_ready: Condvar,
}

impl Shared {
    /// Deliver a device→host notification to the subscriber or the inbox.
    fn deliver(&self, data: Vec<u8>) {
        let callback = {
            let mut state = self.state.lock();
            if !state.connected {
                trace!("MockDevice: dropping notification, not connected");
                return;
            }
            match state.callback.clone() {
                Some(cb) => cb,
                None => {
                    state.inbox.push_back(data);
                    self.inbox_ready.notify_all();
                    return;
                }
            }
        };
        callback(&data);
    }
}

/// Host side of an in-memory link.
pub struct MockTransport {
    shared: Arc<Shared>,
}

/// Device side of an in-memory link, used by tests to script behaviour.
#[derive(Clone)]
pub struct MockDevice {
    shared: Arc<Shared>,
}

impl MockTransport {
    /// Create a linked transport/device pair. The device starts reachable
    /// and silent.
    pub fn new() -> (MockTransport, MockDevice) {
        let shared = Arc::new(Shared {
            state: Mutex::new(MockState {
                follow_commands: true,
                ..MockState::default()
            }),
            inbox_ready: Condvar::new(),
        });
        (
            MockTransport {
                shared: Arc::clone(&shared),
            },
            MockDevice { shared },
        )
    }
}

impl Transport for MockTransport {
    fn kind(&self) -> &'static str {
        "mock"
    }

    fn is_connected(&self) -> bool {
        self.shared.state.lock().connected
    }

    fn ensure_connected(&mut self) -> Result<(), TransportError> {
        let mut state = self.shared.state.lock();
        if state.connected {
            return Ok(());
        }
        if state.connect_failures > 0 {
            state.connect_failures -= 1;
            return Err(TransportError::ConnectFailed {
                target: "mock".to_string(),
                source: io::Error::new(io::ErrorKind::ConnectionRefused, "scripted failure"),
            });
        }
        state.connected = true;
        state.connects += 1;
        state.inbox.clear();
        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        let latency = {
            let mut state = self.shared.state.lock();
            if !state.connected {
                return Err(TransportError::NotConnected);
            }
            state.in_flight += 1;
            state.max_in_flight = state.max_in_flight.max(state.in_flight);
            if state.pending_polls > 0 {
                state.interleaved_writes += 1;
            }
            state.write_latency
        };

        if !latency.is_zero() {
            thread::sleep(latency);
        }

        let (reply, reply_latency) = {
            let mut state = self.shared.state.lock();
            state.in_flight -= 1;
            if state.write_failures > 0 {
                state.write_failures -= 1;
                return Err(TransportError::Io(io::Error::new(
                    io::ErrorKind::BrokenPipe,
                    "scripted failure",
                )));
            }
            state.written.push(data.to_vec());
            (respond(&mut state, data), state.reply_latency)
        };

        if let Some(reply) = reply {
            if reply_latency.is_zero() {
                self.shared.state.lock().pending_polls -= 1;
                self.shared.deliver(reply);
            } else {
                let shared = Arc::clone(&self.shared);
                thread::spawn(move || {
                    thread::sleep(reply_latency);
                    shared.state.lock().pending_polls -= 1;
                    shared.deliver(reply);
                });
            }
        }
        Ok(())
    }

    fn read(&mut self, timeout: Duration) -> Result<Vec<u8>, TransportError> {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.state.lock();
        loop {
            if !state.connected {
                return Err(TransportError::NotConnected);
            }
            if let Some(frame) = state.inbox.pop_front() {
                return Ok(frame);
            }
            if self
                .shared
                .inbox_ready
                .wait_until(&mut state, deadline)
                .timed_out()
            {
                return state.inbox.pop_front().ok_or(TransportError::Timeout);
            }
        }
    }

    fn subscribe(&mut self, callback: NotificationCallback) -> Result<(), TransportError> {
        let mut state = self.shared.state.lock();
        if !state.connected {
            return Err(TransportError::NotConnected);
        }
        state.callback = Some(Arc::from(callback));
        state.subscribes += 1;
        Ok(())
    }

    fn disconnect(&mut self) {
        let mut state = self.shared.state.lock();
        state.connected = false;
        state.callback = None;
        state.inbox.clear();
        self.shared.inbox_ready.notify_all();
    }
}

/// Update the simulated device for a written message and build the reply.
fn respond(state: &mut MockState, data: &[u8]) -> Option<Vec<u8>> {
    let message = decode(data);
    match message {
        WireMessage::StartOperation(req) if state.follow_commands => {
            if let Some(point) = state.reply.as_mut() {
                point.step = ProgramStep::PreHeat;
                point.time_remaining_s = req.duration_s;
            }
            None
        }
        WireMessage::Stop(_) if state.follow_commands => {
            if let Some(point) = state.reply.as_mut() {
                point.step = ProgramStep::Stopped;
                point.time_remaining_s = 0;
            }
            None
        }
        WireMessage::BeginTelemetry(req) => {
            let mut point = state.reply?;
            state.sequence = state.sequence.wrapping_add(1);
            point.feed_id = req.feed_id;
            point.sequence_number = state.sequence;
            state.pending_polls += 1;
            Some(encode(&WireMessage::Telemetry(point)))
        }
        _ => None,
    }
}

impl MockDevice {
    /// Fail the next `n` connection attempts.
    pub fn fail_next_connects(&self, n: usize) {
        self.shared.state.lock().connect_failures = n;
    }

    /// Fail the next `n` writes.
    pub fn fail_next_writes(&self, n: usize) {
        self.shared.state.lock().write_failures = n;
    }

    /// Make every write take `latency`.
    pub fn set_write_latency(&self, latency: Duration) {
        self.shared.state.lock().write_latency = latency;
    }

    /// Reply to each live-feed request with `point` (or stay silent for `None`).
    pub fn set_reply(&self, point: Option<TelemetryDataPoint>) {
        self.shared.state.lock().reply = point;
    }

    /// Delay replies to live-feed requests by `latency`.
    pub fn set_reply_latency(&self, latency: Duration) {
        self.shared.state.lock().reply_latency = latency;
    }

    /// Whether start/stop requests update the reply's program step.
    pub fn set_follow_commands(&self, follow: bool) {
        self.shared.state.lock().follow_commands = follow;
    }

    /// Current reply template.
    pub fn reply(&self) -> Option<TelemetryDataPoint> {
        self.shared.state.lock().reply
    }

    /// Push an unsolicited notification.
    pub fn notify(&self, data: &[u8]) {
        self.shared.deliver(data.to_vec());
    }

    /// Push an unsolicited data point.
    pub fn notify_point(&self, point: TelemetryDataPoint) {
        self.notify(&encode(&WireMessage::Telemetry(point)));
    }

    /// Simulate the device dropping the link.
    pub fn drop_connection(&self) {
        let mut state = self.shared.state.lock();
        state.connected = false;
        state.callback = None;
        self.shared.inbox_ready.notify_all();
    }

    /// Whether the host is connected.
    pub fn is_connected(&self) -> bool {
        self.shared.state.lock().connected
    }

    /// Whether a notification callback is registered.
    pub fn has_subscriber(&self) -> bool {
        self.shared.state.lock().callback.is_some()
    }

    /// Raw frames written by the host, oldest first.
    pub fn written(&self) -> Vec<Vec<u8>> {
        self.shared.state.lock().written.clone()
    }

    /// Decoded messages written by the host, oldest first.
    pub fn written_messages(&self) -> Vec<WireMessage> {
        self.shared
            .state
            .lock()
            .written
            .iter()
            .map(|frame| decode(frame))
            .collect()
    }

    /// Number of successful connects.
    pub fn connect_count(&self) -> usize {
        self.shared.state.lock().connects
    }

    /// Number of subscribe calls.
    pub fn subscribe_count(&self) -> usize {
        self.shared.state.lock().subscribes
    }

    /// Highest number of writes observed in progress at once.
    pub fn max_concurrent_writes(&self) -> usize {
        self.shared.state.lock().max_in_flight
    }

    /// Writes that arrived while a live-feed reply was still outstanding.
    pub fn interleaved_writes(&self) -> usize {
        self.shared.state.lock().interleaved_writes
    }
}
