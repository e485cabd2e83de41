use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for a single capture session, shared between the driver, its workers and the
/// persistence consumer.
#[derive(Debug, Default)]
pub struct SessionStats {
    frames_received: AtomicU64,
    frames_unclassified: AtomicU64,
    capture_errors: AtomicU64,
    measures_enqueued: AtomicU64,
    measures_dropped: AtomicU64,
    clock_anomalies: AtomicU64,
    measures_persisted: AtomicU64,
    persist_failures: AtomicU64,
}

impl SessionStats {
    #[inline]
    pub(crate) fn increment_frames_received(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn increment_frames_unclassified(&self) {
        self.frames_unclassified.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn increment_capture_errors(&self) {
        self.capture_errors.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn increment_measures_enqueued(&self) {
        self.measures_enqueued.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn increment_measures_dropped(&self) {
        self.measures_dropped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn increment_clock_anomalies(&self) {
        self.clock_anomalies.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn increment_measures_persisted(&self) {
        self.measures_persisted.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn increment_persist_failures(&self) {
        self.persist_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Frames read from the capture handle.
    #[inline]
    pub fn frames_received(&self) -> u64 {
        self.frames_received.load(Ordering::Relaxed)
    }

    /// Frames that carried no IP network layer or no supported transport layer.
    #[inline]
    pub fn frames_unclassified(&self) -> u64 {
        self.frames_unclassified.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn capture_errors(&self) -> u64 {
        self.capture_errors.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn measures_enqueued(&self) -> u64 {
        self.measures_enqueued.load(Ordering::Relaxed)
    }

    /// Measures rejected because the dispatch queue was already closed.
    #[inline]
    pub fn measures_dropped(&self) -> u64 {
        self.measures_dropped.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn clock_anomalies(&self) -> u64 {
        self.clock_anomalies.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn measures_persisted(&self) -> u64 {
        self.measures_persisted.load(Ordering::Relaxed)
    }

    /// Inserts that failed or timed out.
    #[inline]
    pub fn persist_failures(&self) -> u64 {
        self.persist_failures.load(Ordering::Relaxed)
    }

    /// Takes a point-in-time snapshot of all counters.
    pub fn report(&self) -> SessionReport {
        SessionReport {
            frames_received: self.frames_received(),
            frames_unclassified: self.frames_unclassified(),
            capture_errors: self.capture_errors(),
            measures_enqueued: self.measures_enqueued(),
            measures_dropped: self.measures_dropped(),
            clock_anomalies: self.clock_anomalies(),
            measures_persisted: self.measures_persisted(),
            persist_failures: self.persist_failures(),
        }
    }
}

/// A snapshot of [`SessionStats`]. Returned once a session has fully shut down.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionReport {
    pub frames_received: u64,
    pub frames_unclassified: u64,
    pub capture_errors: u64,
    pub measures_enqueued: u64,
    pub measures_dropped: u64,
    pub clock_anomalies: u64,
    pub measures_persisted: u64,
    pub persist_failures: u64,
}
