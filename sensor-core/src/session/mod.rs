use std::time::Duration;

use thiserror::Error;

use sensor_capture::{CaptureConfig, CaptureError};

mod driver;

mod persist;

mod sensor;
pub use sensor::*;

mod stats;
pub use stats::{SessionReport, SessionStats};

mod worker;

/// The default capacity of the dispatch queue between workers and the persistence consumer.
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// The default maximum number of frames being processed concurrently.
pub const DEFAULT_MAX_WORKERS: usize = 256;

/// The default time allowed for a single insert into the sink.
pub const DEFAULT_INSERT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum SensorError {
    #[error("Capture error: {0}")]
    Capture(#[from] CaptureError),
    #[error("Already capturing on interface {0}")]
    AlreadyCapturing(String),
}

/// The lifecycle state of a [`Sensor`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Capturing { interface: String },
}

impl SessionState {
    pub fn is_capturing(&self) -> bool {
        matches!(self, Self::Capturing { .. })
    }
}

#[derive(Debug, Clone)]
pub struct SensorOptions {
    /// Options passed to the capture source when a session starts.
    capture: CaptureConfig,
    /// Capacity of the dispatch queue. Workers wait when it is full.
    queue_capacity: usize,
    /// The maximum number of in-flight frame workers. The capture loop stops reading while the
    /// limit is reached.
    max_workers: usize,
    /// The maximum time a single sink insert may take before it is abandoned.
    insert_timeout: Duration,
    /// Whether stopping waits for in-flight workers before closing the dispatch queue.
    drain_on_stop: bool,
}

impl Default for SensorOptions {
    fn default() -> Self {
        Self {
            capture: CaptureConfig::default(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            max_workers: DEFAULT_MAX_WORKERS,
            insert_timeout: DEFAULT_INSERT_TIMEOUT,
            drain_on_stop: true,
        }
    }
}

impl SensorOptions {
    /// Sets the capture configuration.
    pub fn capture(mut self, capture: CaptureConfig) -> Self {
        self.capture = capture;
        self
    }

    /// Sets the dispatch queue capacity. 0 is treated as 1.
    pub fn queue_capacity(mut self, queue_capacity: usize) -> Self {
        self.queue_capacity = queue_capacity.max(1);
        self
    }

    /// Sets the maximum number of in-flight frame workers. With a single worker, frames are
    /// processed and enqueued strictly in capture order. 0 is treated as 1.
    pub fn max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers.max(1);
        self
    }

    /// Sets the timeout of a single sink insert.
    pub fn insert_timeout(mut self, insert_timeout: Duration) -> Self {
        self.insert_timeout = insert_timeout;
        self
    }

    /// Sets whether stopping waits for in-flight workers. When disabled, the dispatch queue is
    /// closed right away and late results are dropped.
    pub fn drain_on_stop(mut self, drain_on_stop: bool) -> Self {
        self.drain_on_stop = drain_on_stop;
        self
    }

    pub fn capture_config(&self) -> &CaptureConfig {
        &self.capture
    }
}
