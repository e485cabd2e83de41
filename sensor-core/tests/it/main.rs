mod pipeline;
mod session;

/// Helper functions.
mod helpers {
    use std::{
        net::Ipv4Addr,
        sync::Arc,
        time::{Duration, SystemTime},
    };

    use tokio::sync::Semaphore;

    use sensor_store::{MeasureSink, MemoryStore, StoreError};
    use sensor_wire::{synth, Frame, Measure, TransportProtocol};

    pub const IFACE: &str = "test0";

    pub fn at(micros: u64) -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_micros(micros)
    }

    pub fn tcp(micros: u64, src: [u8; 4], dst: [u8; 4]) -> Frame {
        synth::ipv4_frame(at(micros), Ipv4Addr::from(src), Ipv4Addr::from(dst), TransportProtocol::Tcp, 64)
    }

    /// Polls `condition` until it holds, panicking after a few seconds.
    pub async fn wait_until(mut condition: impl FnMut() -> bool) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while !condition() {
            assert!(tokio::time::Instant::now() < deadline, "condition not met in time");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    /// A sink that only persists once a permit is released for the insert.
    #[derive(Clone)]
    pub struct GatedSink {
        pub gate: Arc<Semaphore>,
        pub store: MemoryStore,
    }

    impl GatedSink {
        pub fn new() -> Self {
            Self { gate: Arc::new(Semaphore::new(0)), store: MemoryStore::new() }
        }
    }

    #[async_trait::async_trait]
    impl MeasureSink for GatedSink {
        async fn insert(&self, measure: &Measure) -> Result<(), StoreError> {
            self.gate
                .acquire()
                .await
                .map_err(|_| StoreError::Unavailable("gate closed".to_string()))?
                .forget();
            self.store.insert(measure).await
        }
    }
}
