use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use sensor_capture::{CaptureHandle, CaptureSource};
use sensor_common::dispatch_queue;
use sensor_store::MeasureSink;

use super::{
    driver::CaptureDriver, persist::persist, SensorError, SensorOptions, SessionReport,
    SessionState, SessionStats,
};

/// A running (or finished, not yet collected) capture session.
struct LiveSession {
    interface: String,
    cancel: CancellationToken,
    /// Cancelled by the driver when it releases the capture, including after a capture failure.
    capture_ended: CancellationToken,
    stats: Arc<SessionStats>,
    driver: JoinHandle<SessionReport>,
}

impl LiveSession {
    /// Live means still reading frames: neither stopped nor ended on its own. A session that is
    /// only flushing records is not live.
    fn is_live(&self) -> bool {
        !self.cancel.is_cancelled()
            && !self.capture_ended.is_cancelled()
            && !self.driver.is_finished()
    }
}

/// The sensor controller. Owns the capture source and the sink, and runs at most one capture
/// session at a time.
///
/// ## Session
/// Starting a session opens the interface, then spawns a driver task that reads frames, and a
/// persistence task that drains the dispatch queue into the sink. Stopping releases the capture,
/// lets in-flight frames finish, then closes the queue so the consumer persists whatever was
/// enqueued before it exits.
pub struct Sensor<S: CaptureSource> {
    source: S,
    sink: Arc<dyn MeasureSink>,
    options: Arc<SensorOptions>,
    session: Mutex<Option<LiveSession>>,
}

impl<S: CaptureSource> Sensor<S> {
    /// Creates a new sensor with the default [`SensorOptions`].
    pub fn new(source: S, sink: impl MeasureSink) -> Self {
        Self::with_options(source, sink, SensorOptions::default())
    }

    /// Creates a new sensor with the given capture source, sink and options.
    pub fn with_options(source: S, sink: impl MeasureSink, options: SensorOptions) -> Self {
        Self {
            source,
            sink: Arc::new(sink),
            options: Arc::new(options),
            session: Mutex::new(None),
        }
    }

    /// Opens `interface` and starts a capture session in the background.
    ///
    /// Fails if a session is already live, or if the interface cannot be opened. In both cases
    /// nothing is spawned and the current state is unchanged. Must be called from within a Tokio
    /// runtime.
    pub fn start(&self, interface: &str) -> Result<(), SensorError> {
        let mut session = self.session.lock();

        if let Some(live) = session.as_ref().filter(|s| s.is_live()) {
            warn!(interface = %live.interface, "Capture already running");
            return Err(SensorError::AlreadyCapturing(live.interface.clone()));
        }

        let handle = self.source.open(interface, &self.options.capture).map_err(|e| {
            error!(err = ?e, interface, "Failed to open interface");
            e
        })?;

        let span = info_span!("capture", interface = handle.interface());
        let stats = Arc::new(SessionStats::default());
        let cancel = CancellationToken::new();
        let capture_ended = CancellationToken::new();
        let (to_consumer, from_workers) = dispatch_queue(self.options.queue_capacity);

        let consumer = tokio::spawn(
            persist(
                from_workers,
                Arc::clone(&self.sink),
                self.options.insert_timeout,
                Arc::clone(&stats),
            )
            .instrument(span.clone()),
        );

        let driver = CaptureDriver::new(
            handle,
            Arc::clone(&self.options),
            Arc::clone(&stats),
            to_consumer,
            consumer,
            cancel.clone().cancelled_owned(),
            capture_ended.clone(),
        );

        let driver = tokio::spawn(driver.instrument(span));

        if let Some(previous) = session.take() {
            // Still flushing after a stop; it finishes on its own.
            debug!(interface = %previous.interface, "Detaching previous session");
        }

        *session = Some(LiveSession {
            interface: interface.to_string(),
            cancel,
            capture_ended,
            stats,
            driver,
        });
        info!(interface, "Capture started");

        Ok(())
    }

    /// Requests the live session to stop. Returns immediately; use [`Sensor::shutdown`] to wait
    /// for the remaining records to be persisted.
    ///
    /// Returns `false` if no session was live, which is not an error.
    pub fn stop(&self) -> bool {
        let session = self.session.lock();

        match session.as_ref().filter(|s| s.is_live()) {
            Some(live) => {
                live.cancel.cancel();
                info!(interface = %live.interface, "Capture stop requested");
                true
            }
            None => {
                info!("No capture running");
                false
            }
        }
    }

    /// Stops the current session (if any) and waits until it has fully shut down, i.e. all
    /// records enqueued before closure have been handed to the sink.
    ///
    /// Returns the session's final report, or `None` if there was no session to collect.
    pub async fn shutdown(&self) -> Option<SessionReport> {
        let session = self.session.lock().take()?;
        session.cancel.cancel();

        match session.driver.await {
            Ok(report) => Some(report),
            Err(e) => {
                error!(err = ?e, interface = %session.interface, "Capture driver failed");
                None
            }
        }
    }

    /// Returns the current lifecycle state.
    pub fn state(&self) -> SessionState {
        match self.session.lock().as_ref().filter(|s| s.is_live()) {
            Some(live) => SessionState::Capturing { interface: live.interface.clone() },
            None => SessionState::Idle,
        }
    }

    #[inline]
    pub fn is_capturing(&self) -> bool {
        self.state().is_capturing()
    }

    /// Returns the counters of the most recent session, live or not.
    pub fn stats(&self) -> Option<Arc<SessionStats>> {
        self.session.lock().as_ref().map(|s| Arc::clone(&s.stats))
    }

    pub fn options(&self) -> &SensorOptions {
        &self.options
    }
}

impl<S: CaptureSource> Drop for Sensor<S> {
    fn drop(&mut self) {
        if let Some(session) = self.session.get_mut().as_ref() {
            session.cancel.cancel();
        }
    }
}
