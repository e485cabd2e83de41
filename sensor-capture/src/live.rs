use std::{
    io,
    pin::Pin,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    task::{Context, Poll},
    thread,
    time::{Duration, SystemTime},
};

use futures::{Stream, StreamExt};
use pnet::datalink::{self, Channel, DataLinkReceiver};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, trace};

use sensor_wire::{Frame, LinkType};

use crate::{CaptureConfig, CaptureError, CaptureHandle, CaptureSource};

/// The number of frames buffered between the reader thread and the async side.
const FRAME_BUFFER: usize = 4096;

/// The read timeout used when the caller asks for blocking reads. The reader wakes up at least
/// this often to notice that its handle was released.
const IDLE_POLL_TIMEOUT: Duration = Duration::from_millis(100);

/// Live capture from a network interface through [`pnet::datalink`].
///
/// Frames are read on a dedicated OS thread (datalink reads are blocking) and forwarded to the
/// async side over a bounded channel. Frames are timestamped when the read returns.
#[derive(Debug, Default, Clone, Copy)]
pub struct LiveSource;

impl LiveSource {
    pub fn new() -> Self {
        Self
    }
}

impl CaptureSource for LiveSource {
    type Handle = LiveHandle;

    fn open(&self, interface: &str, config: &CaptureConfig) -> Result<LiveHandle, CaptureError> {
        let iface = datalink::interfaces()
            .into_iter()
            .find(|iface| iface.name == interface)
            .ok_or_else(|| CaptureError::InterfaceNotFound(interface.to_string()))?;

        let dl_config = datalink::Config {
            read_buffer_size: config.read_buffer_size,
            read_timeout: Some(poll_timeout(config)),
            promiscuous: config.promiscuous,
            ..Default::default()
        };

        let rx = match datalink::channel(&iface, dl_config)? {
            Channel::Ethernet(_, rx) => rx,
            _ => return Err(CaptureError::UnsupportedChannel(interface.to_string())),
        };

        let (tx, frames) = mpsc::channel(FRAME_BUFFER);
        let released = Arc::new(AtomicBool::new(false));

        let reader = Reader {
            interface: interface.to_string(),
            rx,
            to_handle: tx,
            released: Arc::clone(&released),
            snaplen: config.snaplen,
        };

        thread::Builder::new().name(format!("capture-{interface}")).spawn(move || reader.run())?;

        debug!(interface, snaplen = config.snaplen, "Opened live capture");

        Ok(LiveHandle {
            interface: interface.to_string(),
            frames: ReceiverStream::new(frames),
            released,
        })
    }
}

/// The blocking side of a live capture.
struct Reader {
    interface: String,
    rx: Box<dyn DataLinkReceiver>,
    to_handle: mpsc::Sender<Result<Frame, CaptureError>>,
    released: Arc<AtomicBool>,
    snaplen: usize,
}

impl Reader {
    fn run(mut self) {
        while !self.released.load(Ordering::Relaxed) {
            match self.rx.next() {
                Ok(data) => {
                    let frame =
                        Frame::truncated(SystemTime::now(), LinkType::Ethernet, data, self.snaplen);

                    if self.to_handle.blocking_send(Ok(frame)).is_err() {
                        break;
                    }
                }
                Err(e) if is_transient(&e) => {
                    trace!(interface = %self.interface, "Capture read returned without data");
                }
                Err(e) => {
                    error!(err = ?e, interface = %self.interface, "Capture read failed");
                    let _ = self.to_handle.blocking_send(Err(e.into()));
                    break;
                }
            }
        }

        debug!(interface = %self.interface, "Capture reader stopped");
    }
}

/// The timeout handed to the datalink channel. Timeouts surface as transient errors, after which
/// the reader re-checks whether it was released.
fn poll_timeout(config: &CaptureConfig) -> Duration {
    config.read_timeout.unwrap_or(IDLE_POLL_TIMEOUT)
}

fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}

/// Handle to a live capture opened by [`LiveSource`].
#[derive(Debug)]
pub struct LiveHandle {
    interface: String,
    frames: ReceiverStream<Result<Frame, CaptureError>>,
    released: Arc<AtomicBool>,
}

impl Stream for LiveHandle {
    type Item = Result<Frame, CaptureError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.released.load(Ordering::Relaxed) {
            return Poll::Ready(None);
        }

        self.frames.poll_next_unpin(cx)
    }
}

impl CaptureHandle for LiveHandle {
    fn interface(&self) -> &str {
        &self.interface
    }

    fn release(&mut self) {
        if !self.released.swap(true, Ordering::Relaxed) {
            // Unblocks the reader if it's waiting on a full buffer.
            self.frames.close();
            debug!(interface = %self.interface, "Released live capture");
        }
    }
}

impl Drop for LiveHandle {
    fn drop(&mut self) {
        self.release();
    }
}
