use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::FlowMeta;

/// A measurement record describing one classified frame and its latency estimate.
/// This is both the unit of work flowing through the dispatch queue and the persisted record.
///
/// Records are immutable once constructed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measure {
    /// Capture timestamp, serialized as microseconds since the UNIX epoch.
    #[serde(with = "unix_micros_serde")]
    timestamp: SystemTime,
    source_ip: String,
    destination_ip: String,
    protocol: String,
    packet_size: usize,
    /// Latency estimate in microseconds. 0 means unknown or anomalous.
    latency_us: f64,
}

impl Measure {
    /// Creates a record from classified metadata and a latency estimate. Negative or non-finite
    /// latencies are pinned to 0.
    pub fn new(meta: &FlowMeta, latency_us: f64) -> Self {
        Self::from_parts(
            meta.timestamp,
            meta.source.to_string(),
            meta.destination.to_string(),
            meta.protocol.as_str().to_string(),
            meta.size,
            latency_us,
        )
    }

    /// Creates a record from its raw parts. Negative or non-finite latencies are pinned to 0.
    pub fn from_parts(
        timestamp: SystemTime,
        source_ip: impl Into<String>,
        destination_ip: impl Into<String>,
        protocol: impl Into<String>,
        packet_size: usize,
        latency_us: f64,
    ) -> Self {
        Self {
            timestamp,
            source_ip: source_ip.into(),
            destination_ip: destination_ip.into(),
            protocol: protocol.into(),
            packet_size,
            latency_us: if latency_us.is_finite() && latency_us >= 0.0 { latency_us } else { 0.0 },
        }
    }

    #[inline]
    pub fn timestamp(&self) -> SystemTime {
        self.timestamp
    }

    #[inline]
    pub fn source_ip(&self) -> &str {
        &self.source_ip
    }

    #[inline]
    pub fn destination_ip(&self) -> &str {
        &self.destination_ip
    }

    #[inline]
    pub fn protocol(&self) -> &str {
        &self.protocol
    }

    #[inline]
    pub fn packet_size(&self) -> usize {
        self.packet_size
    }

    #[inline]
    pub fn latency_us(&self) -> f64 {
        self.latency_us
    }
}

mod unix_micros_serde {
    use std::time::{Duration, SystemTime};

    use serde::{Deserialize, Deserializer, Serializer};

    pub(super) fn serialize<S>(time: &SystemTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(sensor_common::unix_micros(*time))
    }

    pub(super) fn deserialize<'de, D>(deserializer: D) -> Result<SystemTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let micros = u64::deserialize(deserializer)?;
        Ok(SystemTime::UNIX_EPOCH + Duration::from_micros(micros))
    }
}
