//! Integration tests for the device coordinator against the mock transport.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use approx::assert_abs_diff_eq;
use joule_coordinator::{
    CoordinatorConfig, CoordinatorError, DeviceCoordinator, DisplayUnit, FileStore, LinkState,
    MemoryStore, PreferenceStore,
};
use joule_protocol::{ProgramStep, TelemetryDataPoint, WireMessage};
use joule_transport::{MockDevice, MockTransport, TransportError};

fn data_point(bath_temp_c: f32, step: ProgramStep) -> TelemetryDataPoint {
    TelemetryDataPoint {
        bath_temp_c,
        step,
        ..TelemetryDataPoint::default()
    }
}

fn setup_with(config: CoordinatorConfig) -> (DeviceCoordinator<MockTransport>, MockDevice) {
    let (transport, device) = MockTransport::new();
    let coordinator =
        DeviceCoordinator::new(transport, config, Arc::new(MemoryStore::new())).unwrap();
    (coordinator, device)
}

fn setup() -> (DeviceCoordinator<MockTransport>, MockDevice) {
    setup_with(CoordinatorConfig::named("test").with_notification_timeout_ms(500))
}

fn feed_requests(device: &MockDevice) -> usize {
    device
        .written_messages()
        .iter()
        .filter(|m| matches!(m, WireMessage::BeginTelemetry(_)))
        .count()
}

#[tokio::test]
async fn test_start_reports_operating() {
    let (coordinator, device) = setup();
    device.set_reply(Some(data_point(24.0, ProgramStep::Stopped)));

    coordinator.start(60.0, 3600).await.unwrap();

    let snapshot = coordinator.read_snapshot();
    assert!(snapshot.is_operating);
    assert_abs_diff_eq!(snapshot.target_temperature_c, 60.0);
    assert_eq!(snapshot.duration_seconds, 3600);
    assert_eq!(snapshot.time_remaining_seconds, 3600);
    assert_eq!(snapshot.program_step, Some(ProgramStep::PreHeat));
    assert_abs_diff_eq!(snapshot.current_temperature_c, 24.0);
    assert_eq!(coordinator.state(), LinkState::Ready);

    let written = device.written_messages();
    assert_eq!(written.len(), 2);
    match written[0] {
        WireMessage::StartOperation(req) => {
            assert_abs_diff_eq!(req.set_point_c, 60.0);
            assert_eq!(req.duration_s, 3600);
        }
        other => panic!("expected start, got {:?}", other),
    }
    assert!(matches!(written[1], WireMessage::BeginTelemetry(req) if req.feed_id == 1));
}

#[tokio::test]
async fn test_device_report_overrides_optimistic_start() {
    let (coordinator, device) = setup_with(
        CoordinatorConfig::named("test").with_notification_timeout_ms(50),
    );
    device.set_follow_commands(false);
    device.set_reply(None);

    // No confirmation arrives: start still succeeds and stays optimistic
    coordinator.start(60.0, 0).await.unwrap();
    assert!(coordinator.read_snapshot().is_operating);
    assert_eq!(coordinator.state(), LinkState::Disconnected);

    device.set_reply(Some(data_point(30.0, ProgramStep::Stopped)));
    let snapshot = coordinator.refresh().await.unwrap();
    assert!(!snapshot.is_operating);
    assert!(!coordinator.read_snapshot().is_operating);
}

#[tokio::test]
async fn test_read_back_after_start_keeps_running_flag() {
    let (coordinator, device) = setup();
    device.set_follow_commands(false);
    device.set_reply(Some(data_point(25.0, ProgramStep::Stopped)));

    coordinator.start(60.0, 3600).await.unwrap();
    let snapshot = coordinator.read_snapshot();
    assert!(snapshot.is_operating);
    assert_abs_diff_eq!(snapshot.target_temperature_c, 60.0);
    assert_abs_diff_eq!(snapshot.current_temperature_c, 25.0);
    assert_eq!(snapshot.program_step, Some(ProgramStep::Stopped));
    assert_eq!(feed_requests(&device), 1);

    // A later, independent read is allowed to overrule the command
    let snapshot = coordinator.refresh().await.unwrap();
    assert!(!snapshot.is_operating);
}

#[tokio::test]
async fn test_timeout_leaves_snapshot_and_reconnects() {
    let (coordinator, device) = setup_with(
        CoordinatorConfig::named("test").with_notification_timeout_ms(50),
    );
    device.set_reply(Some(data_point(50.0, ProgramStep::Cook)));
    let before = coordinator.refresh().await.unwrap();
    assert!(before.is_operating);

    device.set_reply(None);
    let err = coordinator.refresh().await.unwrap_err();
    assert!(matches!(err, CoordinatorError::Timeout(_)));
    assert_eq!(coordinator.read_snapshot(), before);
    assert_eq!(coordinator.state(), LinkState::Disconnected);
    assert!(!device.is_connected());

    device.set_reply(Some(data_point(51.0, ProgramStep::Cook)));
    let after = coordinator.refresh().await.unwrap();
    assert_abs_diff_eq!(after.current_temperature_c, 51.0);
    assert_eq!(device.connect_count(), 2);
    assert_eq!(device.subscribe_count(), 2);
}

#[tokio::test]
async fn test_subscribes_once_per_connection() {
    let (coordinator, device) = setup();
    device.set_reply(Some(data_point(40.0, ProgramStep::Stopped)));

    for _ in 0..3 {
        coordinator.refresh().await.unwrap();
    }
    assert_eq!(device.connect_count(), 1);
    assert_eq!(device.subscribe_count(), 1);

    device.drop_connection();
    coordinator.refresh().await.unwrap();
    assert_eq!(device.connect_count(), 2);
    assert_eq!(device.subscribe_count(), 2);
}

#[tokio::test]
async fn test_failed_write_is_unconfirmed() {
    let (coordinator, device) = setup();
    device.set_reply(Some(data_point(20.0, ProgramStep::Stopped)));
    device.fail_next_writes(1);

    let err = coordinator.start(65.0, 600).await.unwrap_err();
    match err {
        CoordinatorError::Unconfirmed { command, source } => {
            assert_eq!(command, "start");
            assert!(matches!(source, TransportError::Io(_)));
        }
        other => panic!("expected unconfirmed, got {:?}", other),
    }

    let snapshot = coordinator.read_snapshot();
    assert!(snapshot.is_operating);
    assert_abs_diff_eq!(snapshot.target_temperature_c, 65.0);
    assert_eq!(coordinator.state(), LinkState::Disconnected);

    // The device never started, which the next refresh reveals
    let snapshot = coordinator.refresh().await.unwrap();
    assert!(!snapshot.is_operating);
}

#[tokio::test]
async fn test_connect_failure() {
    let (coordinator, device) = setup();
    device.set_reply(Some(data_point(20.0, ProgramStep::Stopped)));
    device.fail_next_connects(1);

    let err = coordinator.refresh().await.unwrap_err();
    assert!(matches!(
        err,
        CoordinatorError::Transport(TransportError::ConnectFailed { .. })
    ));
    assert_eq!(coordinator.state(), LinkState::Disconnected);
    assert!(device.written().is_empty());

    coordinator.refresh().await.unwrap();
    assert_eq!(coordinator.state(), LinkState::Ready);
}

#[tokio::test]
async fn test_stop() {
    let (coordinator, device) = setup();
    device.set_reply(Some(data_point(60.0, ProgramStep::Cook)));
    assert!(coordinator.refresh().await.unwrap().is_operating);

    coordinator.stop().await.unwrap();
    let snapshot = coordinator.read_snapshot();
    assert!(!snapshot.is_operating);
    assert_eq!(snapshot.program_step, Some(ProgramStep::Stopped));

    let written = device.written_messages();
    assert!(written.iter().any(|m| matches!(m, WireMessage::Stop(_))));
}

#[tokio::test]
async fn test_unknown_step_keeps_asserted_flag() {
    let (coordinator, device) = setup();
    device.set_follow_commands(false);
    device.set_reply(Some(data_point(45.0, ProgramStep::Unknown(42))));

    coordinator.start(60.0, 0).await.unwrap();
    let snapshot = coordinator.read_snapshot();
    assert!(snapshot.is_operating);
    assert_eq!(snapshot.program_step, Some(ProgramStep::Unknown(42)));

    coordinator.stop().await.unwrap();
    assert!(!coordinator.read_snapshot().is_operating);
}

#[tokio::test]
async fn test_stale_notifications_are_discarded() {
    let (coordinator, device) = setup();
    device.set_reply(Some(data_point(40.0, ProgramStep::Stopped)));
    coordinator.refresh().await.unwrap();

    // Arrives between polls and must not satisfy the next one
    device.notify_point(data_point(99.0, ProgramStep::Cook));

    let snapshot = coordinator.refresh().await.unwrap();
    assert_abs_diff_eq!(snapshot.current_temperature_c, 40.0);
    assert!(!snapshot.is_operating);
}

#[tokio::test]
async fn test_unparsed_notification_is_skipped() {
    let (coordinator, device) = setup();
    device.set_reply(Some(data_point(41.0, ProgramStep::Stopped)));
    device.set_reply_latency(Duration::from_millis(100));

    let noisy = device.clone();
    let noise = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        noisy.notify(&[0xFF, 0x01]);
    });

    let snapshot = coordinator.refresh().await.unwrap();
    assert_abs_diff_eq!(snapshot.current_temperature_c, 41.0);
    noise.await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_snapshot_never_torn() {
    let (coordinator, device) = setup();
    device.set_reply(Some(data_point(0.0, ProgramStep::Cook)));

    let done = Arc::new(AtomicBool::new(false));
    let mut readers = Vec::new();
    for _ in 0..3 {
        let coordinator = coordinator.clone();
        let done = Arc::clone(&done);
        readers.push(tokio::spawn(async move {
            let mut reads = 0usize;
            while !done.load(Ordering::SeqCst) {
                let snapshot = coordinator.read_snapshot();
                assert_eq!(
                    snapshot.time_remaining_seconds,
                    (snapshot.current_temperature_c * 10.0) as u32,
                    "torn snapshot: {:?}",
                    snapshot
                );
                reads += 1;
                tokio::task::yield_now().await;
            }
            reads
        }));
    }

    for i in 1..=50u32 {
        device.set_reply(Some(TelemetryDataPoint {
            bath_temp_c: i as f32,
            time_remaining_s: i * 10,
            step: ProgramStep::Cook,
            ..TelemetryDataPoint::default()
        }));
        coordinator.refresh().await.unwrap();
    }
    done.store(true, Ordering::SeqCst);

    for reader in readers {
        assert!(reader.await.unwrap() > 0);
    }
    assert_abs_diff_eq!(coordinator.read_snapshot().current_temperature_c, 50.0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_one_write_in_flight() {
    let (coordinator, device) = setup();
    device.set_reply(Some(data_point(30.0, ProgramStep::Stopped)));
    device.set_write_latency(Duration::from_millis(20));
    device.set_reply_latency(Duration::from_millis(30));

    let (started, r1, r2, r3) = tokio::join!(
        coordinator.start(60.0, 1800),
        coordinator.refresh(),
        coordinator.refresh(),
        coordinator.refresh(),
    );
    started.unwrap();
    r1.unwrap();
    r2.unwrap();
    r3.unwrap();

    assert_eq!(device.written().len(), 5);
    assert_eq!(device.max_concurrent_writes(), 1);
    assert_eq!(device.interleaved_writes(), 0);
    assert!(coordinator.read_snapshot().is_operating);
}

#[tokio::test]
async fn test_out_of_range_is_rejected_without_traffic() {
    let (coordinator, device) = setup();

    let err = coordinator.start(150.0, 0).await.unwrap_err();
    assert!(matches!(err, CoordinatorError::OutOfRange { what: "target temperature", .. }));

    let err = coordinator.start(60.0, 90_000).await.unwrap_err();
    assert!(matches!(err, CoordinatorError::OutOfRange { what: "duration", .. }));

    assert!(coordinator.start(f32::NAN, 0).await.is_err());
    assert!(device.written().is_empty());
    assert_eq!(device.connect_count(), 0);
    assert!(!coordinator.read_snapshot().is_operating);
}

#[tokio::test]
async fn test_start_with_stored_parameters() {
    let (coordinator, device) = setup();
    device.set_reply(Some(data_point(20.0, ProgramStep::Stopped)));

    coordinator.set_target_temperature(55.5).unwrap();
    coordinator.set_duration(600).unwrap();
    assert!(device.written().is_empty());

    coordinator.start_with_stored().await.unwrap();
    match device.written_messages()[0] {
        WireMessage::StartOperation(req) => {
            assert_abs_diff_eq!(req.set_point_c, 55.5);
            assert_eq!(req.duration_s, 600);
        }
        other => panic!("expected start, got {:?}", other),
    }
}

#[tokio::test]
async fn test_display_unit_persists() {
    let path = std::env::temp_dir().join(format!("joule-coordinator-{}.json", std::process::id()));
    let _ = std::fs::remove_file(&path);

    let (transport, device) = MockTransport::new();
    device.set_reply(Some(data_point(100.0, ProgramStep::Stopped)));
    let store: Arc<dyn PreferenceStore> = Arc::new(FileStore::new(&path));
    let coordinator =
        DeviceCoordinator::new(transport, CoordinatorConfig::named("test"), Arc::clone(&store))
            .unwrap();
    assert_eq!(coordinator.read_snapshot().display_unit, DisplayUnit::Fahrenheit);

    coordinator.refresh().await.unwrap();
    let (reading, unit) = coordinator.display_reading();
    assert_abs_diff_eq!(reading, 212.0);
    assert_eq!(unit, DisplayUnit::Fahrenheit);

    coordinator.set_display_unit(DisplayUnit::Celsius).unwrap();
    let (reading, unit) = coordinator.display_reading();
    assert_abs_diff_eq!(reading, 100.0);
    assert_eq!(unit, DisplayUnit::Celsius);

    // A new coordinator picks up the saved unit
    let (transport, _device) = MockTransport::new();
    let reopened = DeviceCoordinator::new(
        transport,
        CoordinatorConfig::named("test"),
        Arc::new(FileStore::new(&path)),
    )
    .unwrap();
    assert_eq!(reopened.read_snapshot().display_unit, DisplayUnit::Celsius);

    let _ = std::fs::remove_file(&path);
}

#[tokio::test]
async fn test_subscribers_see_updates() {
    let (coordinator, device) = setup();
    device.set_reply(Some(data_point(33.0, ProgramStep::Stopped)));
    let mut rx = coordinator.subscribe();

    coordinator.refresh().await.unwrap();
    assert!(rx.has_changed().unwrap());
    assert_abs_diff_eq!(rx.borrow_and_update().current_temperature_c, 33.0);
}

#[tokio::test]
async fn test_poller_refreshes_periodically() {
    let (coordinator, device) = setup_with(
        CoordinatorConfig::named("test")
            .with_poll_interval_ms(20)
            .with_notification_timeout_ms(200),
    );
    device.set_reply(Some(data_point(70.0, ProgramStep::Cook)));
    let mut rx = coordinator.subscribe();

    let poller = coordinator.spawn_poller();
    for _ in 0..3 {
        tokio::time::timeout(Duration::from_secs(2), rx.changed())
            .await
            .unwrap()
            .unwrap();
    }
    poller.abort();

    assert!(feed_requests(&device) >= 3);
    assert_abs_diff_eq!(coordinator.read_snapshot().current_temperature_c, 70.0);
}

#[tokio::test]
async fn test_disconnect() {
    let (coordinator, device) = setup();
    device.set_reply(Some(data_point(20.0, ProgramStep::Stopped)));
    coordinator.refresh().await.unwrap();
    assert!(device.is_connected());

    coordinator.disconnect().await.unwrap();
    assert_eq!(coordinator.state(), LinkState::Disconnected);
    assert!(!device.is_connected());
    assert!(!device.has_subscriber());
}

#[test]
fn test_invalid_config_is_rejected() {
    let (transport, _device) = MockTransport::new();
    let config = CoordinatorConfig::named("test").with_poll_interval_ms(0);
    assert!(DeviceCoordinator::new(transport, config, Arc::new(MemoryStore::new())).is_err());
}
