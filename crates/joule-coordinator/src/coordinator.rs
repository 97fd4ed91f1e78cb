//! The device coordinator.
//!
//! Owns the single transport connection and serializes all traffic on it.
//! Every operation that touches the device holds the session lock for its
//! whole duration, so at most one write and one pending poll exist at a time.
//! The snapshot lives in a `watch` channel and is only ever replaced whole.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use joule_metrics::{metric_defs, DeviceLabels};
use joule_protocol::{
    live_feed_message, parse_notification, start_message, stop_message, DeviceAddress,
    TelemetryDataPoint,
};
use joule_transport::{NotificationCallback, Transport, TransportError};
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use crate::config::CoordinatorConfig;
use crate::error::{ConfigError, CoordinatorError};
use crate::snapshot::Snapshot;
use crate::store::PreferenceStore;
use crate::units::{
    canonical_to_display, display_to_canonical, DisplayUnit, TemperatureBounds, CELSIUS_BOUNDS,
    MAX_DURATION_SECONDS,
};

/// Connection state of the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// No connection.
    Disconnected,
    /// Connecting and subscribing.
    Connecting,
    /// Connected and idle.
    Ready,
    /// Waiting for a data point.
    Polling,
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LinkState::Disconnected => "disconnected",
            LinkState::Connecting => "connecting",
            LinkState::Ready => "ready",
            LinkState::Polling => "polling",
        };
        f.write_str(name)
    }
}

/// An outstanding live-feed request.
#[derive(Debug, Clone, Copy)]
struct PendingPoll {
    issued_at: Instant,
    deadline: Instant,
}

/// Whether the step in a data point may override the last command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Reconcile {
    /// Independent read: a recognized step replaces any assertion.
    Device,
    /// Read-back right after a command: the step only confirms the
    /// assertion when it agrees with it.
    AfterCommand,
}

/// State only touched while holding the session lock.
struct Session {
    /// Whether the transport has our callback for the current connection.
    subscribed: bool,
    notifications_tx: mpsc::UnboundedSender<Vec<u8>>,
    notifications_rx: mpsc::UnboundedReceiver<Vec<u8>>,
    /// Set while a poll waits; the callback drops frames otherwise.
    accepting: Arc<AtomicBool>,
    /// Labels for frames dropped by the callback.
    labels: Vec<(&'static str, String)>,
    pending: Option<PendingPoll>,
    /// Operating flag set by the last command, until the device confirms.
    asserted: Option<bool>,
    /// Operating flag from the last recognized program step.
    confirmed: Option<bool>,
}

impl Session {
    fn new(labels: Vec<(&'static str, String)>) -> Self {
        let (notifications_tx, notifications_rx) = mpsc::unbounded_channel();
        Session {
            subscribed: false,
            notifications_tx,
            notifications_rx,
            accepting: Arc::new(AtomicBool::new(false)),
            labels,
            pending: None,
            asserted: None,
            confirmed: None,
        }
    }

    fn is_operating(&self) -> bool {
        self.asserted.or(self.confirmed).unwrap_or(false)
    }

    /// Discard notifications left over from earlier polls. Returns how many.
    fn drain(&mut self) -> usize {
        let mut stale = 0;
        while self.notifications_rx.try_recv().is_ok() {
            stale += 1;
        }
        stale
    }

    /// Mark a poll as waiting (or not). Only a waiting poll queues frames.
    fn set_pending(&mut self, pending: Option<PendingPoll>) {
        self.accepting.store(pending.is_some(), Ordering::SeqCst);
        self.pending = pending;
    }

    fn callback(&self) -> NotificationCallback {
        let tx = self.notifications_tx.clone();
        let accepting = Arc::clone(&self.accepting);
        let labels = self.labels.clone();
        Box::new(move |data: &[u8]| {
            if accepting.load(Ordering::SeqCst) {
                let _ = tx.send(data.to_vec());
            } else {
                trace!("dropping {} byte notification, no poll waiting", data.len());
                metrics::counter!(metric_defs::NOTIFICATIONS_IGNORED.name, &labels).increment(1);
            }
        })
    }
}

struct Inner<T> {
    config: CoordinatorConfig,
    sender: DeviceAddress,
    recipient: DeviceAddress,
    device_labels: DeviceLabels,
    labels: Vec<(&'static str, String)>,
    transport: Arc<Mutex<T>>,
    session: tokio::sync::Mutex<Session>,
    snapshot: watch::Sender<Snapshot>,
    state: Mutex<LinkState>,
    store: Arc<dyn PreferenceStore>,
}

/// Coordinates all traffic with one circulator.
///
/// Cheap to clone; clones share the same connection and snapshot.
pub struct DeviceCoordinator<T: Transport> {
    inner: Arc<Inner<T>>,
}

impl<T: Transport> Clone for DeviceCoordinator<T> {
    fn clone(&self) -> Self {
        DeviceCoordinator {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Transport> DeviceCoordinator<T> {
    /// Create a coordinator. Does not connect.
    ///
    /// The display unit comes from `store`, falling back to °F.
    pub fn new(
        transport: T,
        config: CoordinatorConfig,
        store: Arc<dyn PreferenceStore>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let sender = config.sender_address()?;
        let recipient = config.recipient_address()?;
        let device_labels = DeviceLabels::new(config.name.clone()).with_transport(transport.kind());
        let labels = device_labels.to_labels();

        let snapshot = Snapshot {
            target_temperature_c: config.default_target_c,
            duration_seconds: config.default_duration_secs,
            display_unit: store.load_display_unit().unwrap_or_default(),
            ..Snapshot::default()
        };
        let (snapshot_tx, _) = watch::channel(snapshot);
        let session = Session::new(labels.clone());

        debug!(
            "Coordinator[{}]: created ({} transport, display unit {})",
            config.name,
            transport.kind(),
            snapshot.display_unit
        );

        Ok(DeviceCoordinator {
            inner: Arc::new(Inner {
                config,
                sender,
                recipient,
                device_labels,
                labels,
                transport: Arc::new(Mutex::new(transport)),
                session: tokio::sync::Mutex::new(session),
                snapshot: snapshot_tx,
                state: Mutex::new(LinkState::Disconnected),
                store,
            }),
        })
    }

    /// Device name from configuration.
    pub fn name(&self) -> &str {
        &self.inner.config.name
    }

    /// Configuration in use.
    pub fn config(&self) -> &CoordinatorConfig {
        &self.inner.config
    }

    /// Current connection state.
    pub fn state(&self) -> LinkState {
        *self.inner.state.lock()
    }

    /// The latest snapshot.
    pub fn read_snapshot(&self) -> Snapshot {
        *self.inner.snapshot.borrow()
    }

    /// Receiver notified whenever the snapshot changes.
    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.inner.snapshot.subscribe()
    }

    // ========================================================================
    // Device operations
    // ========================================================================

    /// Request one data point and merge it into the snapshot.
    ///
    /// Fails with [`CoordinatorError::Timeout`] if nothing arrives within the
    /// notification timeout. A failed refresh leaves the snapshot untouched
    /// and the link disconnected; the next call reconnects.
    pub async fn refresh(&self) -> Result<Snapshot, CoordinatorError> {
        let mut session = self.inner.session.lock().await;
        self.refresh_locked(&mut session, Reconcile::Device).await
    }

    /// Start a cook at `target_c` for `duration_s` seconds (0 = no limit).
    ///
    /// The snapshot shows the cook as running immediately. The read-back that
    /// follows the command updates the readings but cannot flip the flag; only
    /// a later refresh can. If the command cannot be written,
    /// [`CoordinatorError::Unconfirmed`] is returned and the snapshot keeps
    /// showing it until a refresh says otherwise.
    pub async fn start(&self, target_c: f32, duration_s: u32) -> Result<(), CoordinatorError> {
        validate_target(target_c)?;
        validate_duration(duration_s)?;

        let mut session = self.inner.session.lock().await;
        session.asserted = Some(true);
        self.inner.snapshot.send_modify(|s| {
            s.target_temperature_c = target_c;
            s.duration_seconds = duration_s;
            s.is_operating = true;
        });

        info!(
            "Coordinator[{}]: start {:.1}°C for {}s",
            self.inner.config.name, target_c, duration_s
        );
        let frame = start_message(target_c, duration_s, self.inner.sender, self.inner.recipient);
        self.send_command(&mut session, "start", frame).await?;
        self.refresh_after_command(&mut session, "start").await;
        Ok(())
    }

    /// Start a cook with the stored target temperature and duration.
    pub async fn start_with_stored(&self) -> Result<(), CoordinatorError> {
        let snapshot = self.read_snapshot();
        self.start(snapshot.target_temperature_c, snapshot.duration_seconds)
            .await
    }

    /// Stop the current cook.
    ///
    /// Shows the circulator as stopped immediately; failures are reported
    /// as for [`DeviceCoordinator::start`].
    pub async fn stop(&self) -> Result<(), CoordinatorError> {
        let mut session = self.inner.session.lock().await;
        session.asserted = Some(false);
        self.inner.snapshot.send_modify(|s| s.is_operating = false);

        info!("Coordinator[{}]: stop", self.inner.config.name);
        let frame = stop_message(self.inner.sender, self.inner.recipient);
        self.send_command(&mut session, "stop", frame).await?;
        self.refresh_after_command(&mut session, "stop").await;
        Ok(())
    }

    /// Drop the connection. The next operation reconnects.
    pub async fn disconnect(&self) -> Result<(), CoordinatorError> {
        let mut session = self.inner.session.lock().await;
        session.set_pending(None);
        session.subscribed = false;
        session.drain();
        self.with_transport(|t| {
            t.disconnect();
            Ok(())
        })
        .await?;
        self.set_state(LinkState::Disconnected);
        info!("Coordinator[{}]: disconnected", self.inner.config.name);
        Ok(())
    }

    /// Refresh every poll interval until the returned task is aborted.
    ///
    /// Failures are logged; the next tick tries again.
    pub fn spawn_poller(&self) -> JoinHandle<()> {
        let coordinator = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(coordinator.inner.config.poll_interval());
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                if let Err(e) = coordinator.refresh().await {
                    warn!("Coordinator[{}]: poll failed: {}", coordinator.name(), e);
                }
            }
        })
    }

    // ========================================================================
    // Local settings
    // ========================================================================

    /// Set the target temperature (°C) for the next start. No device traffic.
    pub fn set_target_temperature(&self, target_c: f32) -> Result<(), CoordinatorError> {
        validate_target(target_c)?;
        self.inner
            .snapshot
            .send_modify(|s| s.target_temperature_c = target_c);
        Ok(())
    }

    /// Set the target temperature in the current display unit.
    pub fn set_target_temperature_display(&self, value: f32) -> Result<(), CoordinatorError> {
        let unit = self.read_snapshot().display_unit;
        let bounds = TemperatureBounds::for_unit(unit);
        if !bounds.contains(value) {
            return Err(CoordinatorError::OutOfRange {
                what: "target temperature",
                value: f64::from(value),
                min: f64::from(bounds.min),
                max: f64::from(bounds.max),
            });
        }
        let target_c = display_to_canonical(value, unit).clamp(CELSIUS_BOUNDS.min, CELSIUS_BOUNDS.max);
        self.set_target_temperature(target_c)
    }

    /// Set the cook time in seconds for the next start. No device traffic.
    pub fn set_duration(&self, duration_s: u32) -> Result<(), CoordinatorError> {
        validate_duration(duration_s)?;
        self.inner
            .snapshot
            .send_modify(|s| s.duration_seconds = duration_s);
        Ok(())
    }

    /// Change the display unit and save it.
    ///
    /// The snapshot is updated even if saving fails.
    pub fn set_display_unit(&self, unit: DisplayUnit) -> Result<(), CoordinatorError> {
        self.inner.snapshot.send_modify(|s| s.display_unit = unit);
        self.inner.store.save_display_unit(unit)?;
        debug!("Coordinator[{}]: display unit {}", self.inner.config.name, unit);
        Ok(())
    }

    /// Bath temperature in the display unit, with the unit.
    pub fn display_reading(&self) -> (f32, DisplayUnit) {
        let snapshot = self.read_snapshot();
        (
            canonical_to_display(snapshot.current_temperature_c, snapshot.display_unit),
            snapshot.display_unit,
        )
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn set_state(&self, state: LinkState) {
        let mut current = self.inner.state.lock();
        if *current != state {
            trace!(
                "Coordinator[{}]: {} -> {}",
                self.inner.config.name,
                *current,
                state
            );
            *current = state;
        }
    }

    /// Run a blocking transport call off the async runtime.
    async fn with_transport<R, F>(&self, f: F) -> Result<R, CoordinatorError>
    where
        F: FnOnce(&mut T) -> Result<R, TransportError> + Send + 'static,
        R: Send + 'static,
    {
        let transport = Arc::clone(&self.inner.transport);
        let result = tokio::task::spawn_blocking(move || {
            let mut transport = transport.lock();
            f(&mut *transport)
        })
        .await
        .map_err(|e| CoordinatorError::Task(e.to_string()))?;
        Ok(result?)
    }

    /// Connect if needed and make sure our callback is registered.
    async fn ensure_session(&self, session: &mut Session) -> Result<(), CoordinatorError> {
        if self.state() == LinkState::Disconnected {
            self.set_state(LinkState::Connecting);
        }

        let subscribed = session.subscribed;
        let callback = session.callback();
        let fresh = self
            .with_transport(move |t| {
                let fresh = !t.is_connected();
                t.ensure_connected()?;
                if fresh || !subscribed {
                    t.subscribe(callback)?;
                }
                Ok(fresh)
            })
            .await;

        match fresh {
            Ok(fresh) => {
                session.subscribed = true;
                if fresh {
                    info!("Coordinator[{}]: connected", self.inner.config.name);
                    metrics::counter!(metric_defs::CONNECTS.name, &self.inner.labels).increment(1);
                }
                if self.state() == LinkState::Connecting {
                    self.set_state(LinkState::Ready);
                }
                Ok(())
            }
            Err(e) => {
                session.subscribed = false;
                self.set_state(LinkState::Disconnected);
                Err(e)
            }
        }
    }

    async fn refresh_locked(
        &self,
        session: &mut Session,
        reconcile: Reconcile,
    ) -> Result<Snapshot, CoordinatorError> {
        if let Err(e) = self.ensure_session(session).await {
            self.abandon_poll(session, "connect", &e).await;
            return Err(e);
        }

        let stale = session.drain();
        if stale > 0 {
            debug!(
                "Coordinator[{}]: discarded {} stale notifications",
                self.inner.config.name, stale
            );
        }

        let issued_at = Instant::now();
        let pending = PendingPoll {
            issued_at,
            deadline: issued_at + self.inner.config.notification_timeout(),
        };
        session.set_pending(Some(pending));
        self.set_state(LinkState::Polling);

        let frame = live_feed_message(
            self.inner.config.feed_id,
            self.inner.sender,
            self.inner.recipient,
        );
        if let Err(e) = self.with_transport(move |t| t.write(&frame)).await {
            self.abandon_poll(session, "write", &e).await;
            return Err(e);
        }

        let point = match self.await_data_point(session, pending.deadline).await {
            Ok(point) => point,
            Err(e) => {
                self.abandon_poll(session, "timeout", &e).await;
                return Err(e);
            }
        };

        session.set_pending(None);
        let latency = pending.issued_at.elapsed();
        metrics::histogram!(metric_defs::POLL_LATENCY.name, &self.inner.labels)
            .record(latency.as_secs_f64() * 1000.0);
        metrics::counter!(metric_defs::POLLS_OK.name, &self.inner.labels).increment(1);

        let snapshot = self.merge_data_point(session, &point, reconcile);
        self.set_state(LinkState::Ready);
        debug!(
            "Coordinator[{}]: {:.2}°C step {} remaining {}s ({:?})",
            self.inner.config.name,
            point.bath_temp_c,
            point.step,
            point.time_remaining_s,
            latency
        );
        Ok(snapshot)
    }

    /// Wait for the next notification carrying a data point.
    async fn await_data_point(
        &self,
        session: &mut Session,
        deadline: Instant,
    ) -> Result<TelemetryDataPoint, CoordinatorError> {
        loop {
            match tokio::time::timeout_at(deadline, session.notifications_rx.recv()).await {
                Ok(Some(data)) => match parse_notification(&data) {
                    Some(point) => return Ok(point),
                    None => {
                        debug!(
                            "Coordinator[{}]: ignoring notification without data point ({} bytes)",
                            self.inner.config.name,
                            data.len()
                        );
                        metrics::counter!(
                            metric_defs::NOTIFICATIONS_UNPARSED.name,
                            &self.inner.labels
                        )
                        .increment(1);
                    }
                },
                // Unreachable while the session holds a sender
                Ok(None) => return Err(TransportError::Closed.into()),
                Err(_) => {
                    return Err(CoordinatorError::Timeout(
                        self.inner.config.notification_timeout(),
                    ))
                }
            }
        }
    }

    /// Fold a data point into the snapshot and publish it.
    fn merge_data_point(
        &self,
        session: &mut Session,
        point: &TelemetryDataPoint,
        reconcile: Reconcile,
    ) -> Snapshot {
        if let Some(operating) = point.step.is_operating() {
            match (reconcile, session.asserted) {
                (Reconcile::AfterCommand, Some(asserted)) if asserted != operating => {
                    debug!(
                        "Coordinator[{}]: step {} disagrees with last command, keeping it until the next refresh",
                        self.inner.config.name, point.step
                    );
                }
                _ => {
                    session.confirmed = Some(operating);
                    session.asserted = None;
                }
            }
        }
        let is_operating = session.is_operating();

        let mut published = Snapshot::default();
        self.inner.snapshot.send_modify(|s| {
            s.current_temperature_c = point.bath_temp_c;
            s.time_remaining_seconds = point.time_remaining_s;
            s.program_step = Some(point.step);
            s.is_operating = is_operating;
            published = *s;
        });
        metrics::gauge!(metric_defs::BATH_TEMPERATURE.name, &self.inner.labels)
            .set(f64::from(point.bath_temp_c));
        published
    }

    /// Give up on the current poll and drop the connection.
    async fn abandon_poll(&self, session: &mut Session, reason: &'static str, error: &CoordinatorError) {
        match session.pending {
            Some(pending) => warn!(
                "Coordinator[{}]: refresh failed ({}) after {:?}: {}",
                self.inner.config.name,
                reason,
                pending.issued_at.elapsed(),
                error
            ),
            None => warn!(
                "Coordinator[{}]: refresh failed ({}): {}",
                self.inner.config.name, reason, error
            ),
        }
        metrics::counter!(
            metric_defs::POLLS_FAILED.name,
            &self.inner.device_labels.with(&[("reason", reason.to_string())])
        )
        .increment(1);
        self.drop_link(session).await;
    }

    async fn drop_link(&self, session: &mut Session) {
        session.set_pending(None);
        session.subscribed = false;
        self.set_state(LinkState::Disconnected);
        if let Err(e) = self
            .with_transport(|t| {
                t.disconnect();
                Ok(())
            })
            .await
        {
            warn!("Coordinator[{}]: disconnect failed: {}", self.inner.config.name, e);
        }
    }

    async fn send_command(
        &self,
        session: &mut Session,
        command: &'static str,
        frame: Vec<u8>,
    ) -> Result<(), CoordinatorError> {
        let result = match self.ensure_session(session).await {
            Ok(()) => self.with_transport(move |t| t.write(&frame)).await,
            Err(e) => Err(e),
        };

        let command_labels = self
            .inner
            .device_labels
            .with(&[("command", command.to_string())]);
        match result {
            Ok(()) => {
                metrics::counter!(metric_defs::COMMANDS_SENT.name, &command_labels).increment(1);
                Ok(())
            }
            Err(CoordinatorError::Transport(source)) => {
                warn!(
                    "Coordinator[{}]: {} not delivered: {}",
                    self.inner.config.name, command, source
                );
                metrics::counter!(metric_defs::COMMANDS_FAILED.name, &command_labels).increment(1);
                if source.is_connection_lost() {
                    self.drop_link(session).await;
                }
                Err(CoordinatorError::Unconfirmed { command, source })
            }
            Err(e) => Err(e),
        }
    }

    /// Read back the device state after a command. A failure here does not
    /// fail the command.
    async fn refresh_after_command(&self, session: &mut Session, command: &'static str) {
        if let Err(e) = self.refresh_locked(session, Reconcile::AfterCommand).await {
            warn!(
                "Coordinator[{}]: {} sent but not yet confirmed: {}",
                self.inner.config.name, command, e
            );
        }
    }
}

fn validate_target(target_c: f32) -> Result<(), CoordinatorError> {
    if CELSIUS_BOUNDS.contains(target_c) {
        Ok(())
    } else {
        Err(CoordinatorError::OutOfRange {
            what: "target temperature",
            value: f64::from(target_c),
            min: f64::from(CELSIUS_BOUNDS.min),
            max: f64::from(CELSIUS_BOUNDS.max),
        })
    }
}

fn validate_duration(duration_s: u32) -> Result<(), CoordinatorError> {
    if duration_s <= MAX_DURATION_SECONDS {
        Ok(())
    } else {
        Err(CoordinatorError::OutOfRange {
            what: "duration",
            value: f64::from(duration_s),
            min: 0.0,
            max: f64::from(MAX_DURATION_SECONDS),
        })
    }
}
