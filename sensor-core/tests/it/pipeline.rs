use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use sensor_capture::{ChannelSource, ReplaySource};
use sensor_core::{Sensor, SensorOptions};
use sensor_store::{MeasureSink, MeasureStore, MemoryStore, StoreError};
use sensor_wire::{synth, Measure};

use crate::helpers::{at, tcp, wait_until, GatedSink, IFACE};

/// A sink that rejects every other insert.
#[derive(Default)]
struct FlakySink {
    calls: AtomicUsize,
}

#[async_trait::async_trait]
impl MeasureSink for FlakySink {
    async fn insert(&self, _: &Measure) -> Result<(), StoreError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) % 2 == 1 {
            return Err(StoreError::Unavailable("connection reset".to_string()));
        }
        Ok(())
    }
}

#[tokio::test]
async fn request_reply_latency() {
    let _ = tracing_subscriber::fmt::try_init();

    let frames = vec![tcp(0, [1, 1, 1, 1], [2, 2, 2, 2]), tcp(100, [2, 2, 2, 2], [1, 1, 1, 1])];
    let store = MemoryStore::new();
    let sensor = Sensor::with_options(
        ReplaySource::new(IFACE, frames),
        store.clone(),
        SensorOptions::default().max_workers(1),
    );

    sensor.start(IFACE).unwrap();
    wait_until(|| store.len() == 2).await;

    let report = sensor.shutdown().await.unwrap();
    assert_eq!(report.frames_received, 2);
    assert_eq!(report.measures_persisted, 2);
    assert_eq!(report.clock_anomalies, 0);

    let records = store.find_all().await.unwrap();
    assert_eq!(records.len(), 2);

    let reply = &records[0];
    assert_eq!(reply.timestamp(), at(100));
    assert_eq!(reply.source_ip(), "2.2.2.2");
    assert_eq!(reply.destination_ip(), "1.1.1.1");
    assert_eq!(reply.protocol(), "TCP");
    assert_eq!(reply.latency_us(), 100.0);

    let request = &records[1];
    assert_eq!(request.source_ip(), "1.1.1.1");
    assert_eq!(request.latency_us(), 0.0);
}

#[tokio::test]
async fn non_ip_frames_are_skipped() {
    let _ = tracing_subscriber::fmt::try_init();

    let frames = vec![
        tcp(0, [1, 1, 1, 1], [2, 2, 2, 2]),
        synth::arp_frame(at(50)),
        tcp(100, [2, 2, 2, 2], [1, 1, 1, 1]),
    ];
    let store = MemoryStore::new();
    let sensor = Sensor::with_options(
        ReplaySource::new(IFACE, frames),
        store.clone(),
        SensorOptions::default().max_workers(1),
    );

    sensor.start(IFACE).unwrap();
    let stats = sensor.stats().unwrap();
    wait_until(|| stats.frames_received() == 3 && store.len() == 2).await;

    let report = sensor.shutdown().await.unwrap();
    assert_eq!(report.frames_unclassified, 1);
    assert_eq!(report.measures_persisted, 2);

    let latencies: Vec<_> = store.snapshot().iter().map(Measure::latency_us).collect();
    assert_eq!(latencies, vec![0.0, 100.0]);
}

#[tokio::test]
async fn finite_replay_ends_session() {
    let frames: Vec<_> = (0..10).map(|i| tcp(i * 10, [10, 0, 0, 1], [10, 0, 0, 2])).collect();
    let store = MemoryStore::new();
    let sensor = Sensor::new(ReplaySource::new(IFACE, frames).finite(), store.clone());

    sensor.start(IFACE).unwrap();
    let stats = sensor.stats().unwrap();
    wait_until(|| !sensor.is_capturing() && stats.measures_persisted() == 10).await;

    let report = sensor.shutdown().await.unwrap();
    assert_eq!(report.frames_received, 10);
    assert_eq!(report.capture_errors, 0);
    assert_eq!(store.len(), 10);
    assert!(store.snapshot().iter().all(|m| m.latency_us() >= 0.0));
}

#[tokio::test]
async fn full_queue_holds_back_workers() {
    let _ = tracing_subscriber::fmt::try_init();

    let (source, injector) = ChannelSource::new(IFACE);
    let sink = GatedSink::new();
    let sensor =
        Sensor::with_options(source, sink.clone(), SensorOptions::default().queue_capacity(2));

    sensor.start(IFACE).unwrap();
    let stats = sensor.stats().unwrap();

    for i in 0..10 {
        assert!(injector.inject(tcp(i, [10, 0, 0, 1], [10, 0, 0, 2])));
    }

    wait_until(|| stats.frames_received() == 10).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Two buffered, one held by the stalled consumer.
    assert!(stats.measures_enqueued() <= 3, "enqueued {}", stats.measures_enqueued());
    assert_eq!(stats.measures_dropped(), 0);

    sink.gate.add_permits(10);
    wait_until(|| sink.store.len() == 10).await;

    let report = sensor.shutdown().await.unwrap();
    assert_eq!(report.measures_enqueued, 10);
    assert_eq!(report.measures_persisted, 10);
}

#[tokio::test]
async fn stop_persists_everything_enqueued() {
    let _ = tracing_subscriber::fmt::try_init();

    let (source, injector) = ChannelSource::new(IFACE);
    let store = MemoryStore::new();
    let sensor = Sensor::new(source, store.clone());

    sensor.start(IFACE).unwrap();
    let stats = sensor.stats().unwrap();

    for i in 0..50 {
        injector.inject(tcp(i, [192, 168, 1, 10], [192, 168, 1, 20]));
    }
    wait_until(|| stats.frames_received() == 50).await;

    assert!(sensor.stop());
    // Not read: the driver observes the stop before polling the capture again.
    injector.inject(tcp(99, [192, 168, 1, 10], [192, 168, 1, 20]));

    let report = sensor.shutdown().await.unwrap();
    assert_eq!(report.frames_received, 50);
    assert_eq!(report.measures_enqueued, 50);
    assert_eq!(report.measures_persisted, 50);
    assert_eq!(report.measures_dropped, 0);
    assert_eq!(store.len(), 50);

    assert!(!injector.is_open(), "capture is released on stop");
}

#[tokio::test]
async fn stop_without_drain_drops_late_measures() {
    let _ = tracing_subscriber::fmt::try_init();

    let (source, injector) = ChannelSource::new(IFACE);
    let sink = GatedSink::new();
    let options = SensorOptions::default().queue_capacity(1).drain_on_stop(false);
    let sensor = Sensor::with_options(source, sink.clone(), options);

    sensor.start(IFACE).unwrap();
    let stats = sensor.stats().unwrap();

    for i in 0..5 {
        injector.inject(tcp(i, [10, 0, 0, 1], [10, 0, 0, 2]));
    }
    wait_until(|| stats.frames_received() == 5).await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    sensor.stop();
    wait_until(|| stats.measures_enqueued() + stats.measures_dropped() == 5).await;

    sink.gate.add_permits(10);
    let report = sensor.shutdown().await.unwrap();

    assert_eq!(report.measures_enqueued, 2);
    assert_eq!(report.measures_dropped, 3);
    assert_eq!(report.measures_persisted, 2);
    assert_eq!(sink.store.len(), 2);
}

#[tokio::test]
async fn persistence_failures_do_not_end_session() {
    let _ = tracing_subscriber::fmt::try_init();

    let (source, injector) = ChannelSource::new(IFACE);
    let sink = Arc::new(FlakySink::default());
    let sensor = Sensor::new(source, Arc::clone(&sink));

    sensor.start(IFACE).unwrap();
    let stats = sensor.stats().unwrap();

    for i in 0..4 {
        injector.inject(tcp(i, [10, 0, 0, 1], [10, 0, 0, 2]));
    }
    wait_until(|| stats.measures_persisted() + stats.persist_failures() == 4).await;
    assert!(sensor.is_capturing());

    let report = sensor.shutdown().await.unwrap();
    assert_eq!(report.measures_persisted, 2);
    assert_eq!(report.persist_failures, 2);
    assert_eq!(sink.calls.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn slow_inserts_time_out() {
    struct Stalled;

    #[async_trait::async_trait]
    impl MeasureSink for Stalled {
        async fn insert(&self, _: &Measure) -> Result<(), StoreError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        }
    }

    let (source, injector) = ChannelSource::new(IFACE);
    let options = SensorOptions::default().insert_timeout(Duration::from_millis(10));
    let sensor = Sensor::with_options(source, Stalled, options);

    sensor.start(IFACE).unwrap();
    injector.inject(tcp(0, [10, 0, 0, 1], [10, 0, 0, 2]));
    injector.inject(tcp(1, [10, 0, 0, 1], [10, 0, 0, 2]));

    let stats = sensor.stats().unwrap();
    wait_until(|| stats.persist_failures() == 2).await;

    let report = sensor.shutdown().await.unwrap();
    assert_eq!(report.measures_persisted, 0);
    assert_eq!(report.persist_failures, 2);
}
