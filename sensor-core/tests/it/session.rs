use std::io;

use sensor_capture::{CaptureError, ChannelSource, ReplaySource};
use sensor_core::{Sensor, SensorError, SessionState};
use sensor_store::MemoryStore;

use crate::helpers::{tcp, wait_until, GatedSink, IFACE};

#[tokio::test]
async fn stop_without_session_is_noop() {
    let _ = tracing_subscriber::fmt::try_init();

    let sensor = Sensor::new(ReplaySource::new(IFACE, Vec::new()), MemoryStore::new());

    assert!(!sensor.stop());
    assert_eq!(sensor.state(), SessionState::Idle);
    assert!(sensor.shutdown().await.is_none());
}

#[tokio::test]
async fn unknown_interface_fails_to_start() {
    let store = MemoryStore::new();
    let sensor = Sensor::new(ReplaySource::new(IFACE, vec![tcp(0, [1; 4], [2; 4])]), store.clone());

    let err = sensor.start("does-not-exist").unwrap_err();
    assert!(matches!(
        err,
        SensorError::Capture(CaptureError::InterfaceNotFound(ref name)) if name == "does-not-exist"
    ));

    assert_eq!(sensor.state(), SessionState::Idle);
    assert!(sensor.stats().is_none());
    assert!(store.is_empty());
}

#[tokio::test]
async fn one_session_at_a_time() {
    let (source, _injector) = ChannelSource::new(IFACE);
    let sensor = Sensor::new(source, MemoryStore::new());

    sensor.start(IFACE).unwrap();
    assert!(matches!(sensor.start(IFACE), Err(SensorError::AlreadyCapturing(_))));
    assert!(sensor.is_capturing());

    sensor.shutdown().await.unwrap();
    assert_eq!(sensor.state(), SessionState::Idle);
}

#[tokio::test]
async fn restart_after_stop() {
    let (source, injector) = ChannelSource::new(IFACE);
    let store = MemoryStore::new();
    let sensor = Sensor::new(source, store.clone());

    sensor.start(IFACE).unwrap();
    injector.inject(tcp(0, [10, 0, 0, 1], [10, 0, 0, 2]));
    wait_until(|| store.len() == 1).await;

    assert!(sensor.stop());
    assert_eq!(sensor.state(), SessionState::Idle);

    sensor.start(IFACE).unwrap();
    assert!(sensor.is_capturing());
    injector.inject(tcp(10, [10, 0, 0, 2], [10, 0, 0, 1]));
    wait_until(|| store.len() == 2).await;

    // Latency state does not carry over between sessions.
    assert_eq!(store.snapshot()[1].latency_us(), 0.0);

    let report = sensor.shutdown().await.unwrap();
    assert_eq!(report.frames_received, 1);
}

#[tokio::test]
async fn capture_failure_ends_session() {
    let _ = tracing_subscriber::fmt::try_init();

    let (source, injector) = ChannelSource::new(IFACE);
    let store = MemoryStore::new();
    let sensor = Sensor::new(source, store.clone());

    sensor.start(IFACE).unwrap();
    injector.inject(tcp(0, [10, 0, 0, 1], [10, 0, 0, 2]));
    injector.inject(tcp(5, [10, 0, 0, 2], [10, 0, 0, 1]));
    assert!(injector.fail(io::Error::new(io::ErrorKind::Other, "device went away")));

    wait_until(|| !sensor.is_capturing()).await;
    assert!(!sensor.stop());

    // Frames read before the failure are still persisted.
    let report = sensor.shutdown().await.unwrap();
    assert_eq!(report.capture_errors, 1);
    assert_eq!(report.frames_received, 2);
    assert_eq!(report.measures_persisted, 2);
    assert_eq!(store.len(), 2);

    sensor.start(IFACE).unwrap();
    assert!(injector.is_open());
    sensor.shutdown().await.unwrap();
}

#[tokio::test]
async fn capture_failure_is_idle_while_flushing() {
    let _ = tracing_subscriber::fmt::try_init();

    let (source, injector) = ChannelSource::new(IFACE);
    let sink = GatedSink::new();
    let sensor = Sensor::new(source, sink.clone());

    sensor.start(IFACE).unwrap();
    let stats = sensor.stats().unwrap();

    injector.inject(tcp(0, [10, 0, 0, 1], [10, 0, 0, 2]));
    assert!(injector.fail(io::Error::new(io::ErrorKind::Other, "device went away")));
    wait_until(|| stats.capture_errors() == 1).await;

    // The stalled sink keeps the session flushing, but it no longer captures.
    assert!(!injector.is_open());
    assert_eq!(sensor.state(), SessionState::Idle);
    assert!(!sensor.stop());

    // A new session may replace the flushing one.
    sensor.start(IFACE).unwrap();
    assert!(sensor.is_capturing());

    sink.gate.add_permits(10);
    wait_until(|| sink.store.len() == 1).await;
    sensor.shutdown().await.unwrap();
}
