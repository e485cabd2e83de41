use std::time::SystemTime;

use bytes::Bytes;

/// The link-layer framing of captured data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkType {
    /// Ethernet II frames, optionally carrying one 802.1Q tag.
    #[default]
    Ethernet,
    /// Bare IPv4 / IPv6 packets without any link-layer header.
    RawIp,
}

/// One raw captured unit of traffic, prior to classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// The instant the frame was captured.
    timestamp: SystemTime,
    /// The original length of the frame on the wire. May exceed `data.len()` if the frame
    /// was truncated to the snapshot length.
    len: usize,
    /// The framing of `data`.
    link_type: LinkType,
    /// The captured bytes.
    data: Bytes,
}

impl Frame {
    /// Creates a new, untruncated frame.
    pub fn new(timestamp: SystemTime, link_type: LinkType, data: Bytes) -> Self {
        Self { timestamp, len: data.len(), link_type, data }
    }

    /// Creates a frame from captured bytes, keeping at most `snaplen` of them while recording the
    /// full original length.
    pub fn truncated(
        timestamp: SystemTime,
        link_type: LinkType,
        data: &[u8],
        snaplen: usize,
    ) -> Self {
        let kept = &data[..data.len().min(snaplen)];
        Self { timestamp, len: data.len(), link_type, data: Bytes::copy_from_slice(kept) }
    }

    #[inline]
    pub fn timestamp(&self) -> SystemTime {
        self.timestamp
    }

    /// The original length of the frame in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn link_type(&self) -> LinkType {
        self.link_type
    }

    /// The captured bytes (at most the snapshot length).
    #[inline]
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// Returns `true` if fewer bytes were captured than were on the wire.
    #[inline]
    pub fn is_truncated(&self) -> bool {
        self.data.len() < self.len
    }
}
