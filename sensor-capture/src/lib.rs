use std::time::Duration;

use futures::Stream;
use thiserror::Error;

use sensor_common::constants::KiB;
use sensor_wire::Frame;

mod iface;
pub use iface::{interfaces, InterfaceInfo};

mod live;
pub use live::{LiveHandle, LiveSource};

mod replay;
pub use replay::{ChannelHandle, ChannelSource, FrameInjector, ReplayHandle, ReplaySource};

/// The default snapshot length: the maximum number of bytes kept per frame.
pub const DEFAULT_SNAPLEN: usize = 1600;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("Interface not found: {0}")]
    InterfaceNotFound(String),
    #[error("Unsupported datalink channel type on interface {0}")]
    UnsupportedChannel(String),
    #[error("IO error: {0:?}")]
    Io(#[from] std::io::Error),
}

/// Options used when opening a capture source.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// The maximum number of bytes kept per frame. Longer frames are truncated, their original
    /// length is preserved.
    pub snaplen: usize,
    /// Whether to put the interface in promiscuous mode.
    pub promiscuous: bool,
    /// The read timeout of the underlying capture. `None` blocks until a frame arrives.
    ///
    /// The live source still polls internally every 100 ms when this is `None`, so a released
    /// handle stops its reader thread even on an idle interface. Idle wakeups are not surfaced.
    pub read_timeout: Option<Duration>,
    /// The size of the kernel-facing read buffer in bytes.
    pub read_buffer_size: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            snaplen: DEFAULT_SNAPLEN,
            promiscuous: true,
            read_timeout: None,
            read_buffer_size: 64 * KiB as usize,
        }
    }
}

impl CaptureConfig {
    /// Sets the snapshot length.
    pub fn snaplen(mut self, snaplen: usize) -> Self {
        self.snaplen = snaplen;
        self
    }

    /// Sets promiscuous mode.
    pub fn promiscuous(mut self, promiscuous: bool) -> Self {
        self.promiscuous = promiscuous;
        self
    }

    /// Sets the read timeout. A released live handle stops its reader thread within one timeout
    /// period even if no traffic arrives.
    pub fn read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = Some(read_timeout);
        self
    }

    /// Sets the read buffer size.
    pub fn read_buffer_size(mut self, read_buffer_size: usize) -> Self {
        self.read_buffer_size = read_buffer_size;
        self
    }
}

/// A source of captured frames, e.g. a live network interface.
pub trait CaptureSource: Send + Sync + 'static {
    type Handle: CaptureHandle;

    /// Opens the given interface for capturing.
    fn open(&self, interface: &str, config: &CaptureConfig) -> Result<Self::Handle, CaptureError>;
}

/// An open capture. Yields frames lazily until released; for live sources the stream is
/// effectively infinite.
///
/// An error item is fatal: the handle yields nothing useful afterwards.
pub trait CaptureHandle:
    Stream<Item = Result<Frame, CaptureError>> + Send + Unpin + 'static
{
    /// The name of the captured interface.
    fn interface(&self) -> &str;

    /// Releases the underlying capture. After this the stream ends. Idempotent.
    fn release(&mut self);
}
