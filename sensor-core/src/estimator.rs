use std::{
    hash::BuildHasherDefault,
    net::IpAddr,
    time::{Duration, SystemTime},
};

use dashmap::DashMap;
use rustc_hash::FxHasher;

use sensor_common::strictly_after;
use sensor_wire::{FlowMeta, Measure};

/// Concurrent map from an endpoint address to the timestamp of the most recent frame it sent.
///
/// Entries are overwritten on every observation and never evicted, so the table grows with the
/// number of distinct source addresses seen during a session.
#[derive(Debug, Default)]
pub struct EndpointTable {
    last_sent: DashMap<IpAddr, SystemTime, BuildHasherDefault<FxHasher>>,
}

impl EndpointTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `address` sent a frame at `at`, replacing any previous entry.
    pub fn record(&self, address: IpAddr, at: SystemTime) {
        self.last_sent.insert(address, at);
    }

    /// Returns the timestamp of the most recent frame sent by `address`.
    pub fn last_sent(&self, address: &IpAddr) -> Option<SystemTime> {
        self.last_sent.get(address).map(|entry| *entry.value())
    }

    pub fn len(&self) -> usize {
        self.last_sent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_sent.is_empty()
    }
}

/// The outcome of a latency estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Latency {
    /// The destination has never been seen as a source.
    Unknown,
    /// Time elapsed since the destination last sent a frame.
    Measured(Duration),
    /// The destination's last frame is not strictly older than the current one, e.g. both
    /// directions were stamped with the same clock tick, or the clock went backwards.
    Anomalous { last_sent: SystemTime },
}

impl Latency {
    /// The estimate in whole microseconds, as stored in a [`Measure`]. Unknown and anomalous
    /// estimates are 0.
    pub fn as_micros(&self) -> f64 {
        match self {
            Self::Measured(elapsed) => elapsed.as_micros() as f64,
            Self::Unknown | Self::Anomalous { .. } => 0.0,
        }
    }

    #[inline]
    pub fn is_anomalous(&self) -> bool {
        matches!(self, Self::Anomalous { .. })
    }
}

/// Approximates round-trip latency by pairing each frame with the last frame sent by its
/// destination.
///
/// This is an address-only heuristic: it does not look at ports, sequence numbers or flow
/// direction, so unrelated traffic between the same hosts is paired as well.
#[derive(Debug, Default)]
pub struct LatencyEstimator {
    table: EndpointTable,
}

impl LatencyEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the frame's source, then estimates latency against the last frame seen from its
    /// destination. Safe to call from many tasks at once.
    pub fn estimate(&self, meta: &FlowMeta) -> Latency {
        self.table.record(meta.source, meta.timestamp);

        let Some(last_sent) = self.table.last_sent(&meta.destination) else {
            return Latency::Unknown;
        };

        match strictly_after(last_sent, meta.timestamp) {
            Some(elapsed) => Latency::Measured(elapsed),
            None => Latency::Anomalous { last_sent },
        }
    }

    /// Estimates latency and builds the resulting measurement record.
    pub fn measure(&self, meta: &FlowMeta) -> (Measure, Latency) {
        let latency = self.estimate(meta);
        (Measure::new(meta, latency.as_micros()), latency)
    }

    pub fn table(&self) -> &EndpointTable {
        &self.table
    }
}
