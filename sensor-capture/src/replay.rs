use std::{
    collections::VecDeque,
    io,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use futures::{Stream, StreamExt};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::debug;

use sensor_wire::Frame;

use crate::{CaptureConfig, CaptureError, CaptureHandle, CaptureSource};

/// Replays a fixed sequence of frames for one named interface.
///
/// Every `open` starts from the first frame. Once all frames have been yielded the handle stays
/// open (pending) until released, like a quiet live interface. Use [`ReplaySource::finite`] to
/// end the stream instead.
#[derive(Debug, Clone)]
pub struct ReplaySource {
    interface: String,
    frames: Arc<Vec<Frame>>,
    hold_open: bool,
}

impl ReplaySource {
    pub fn new(interface: impl Into<String>, frames: Vec<Frame>) -> Self {
        Self { interface: interface.into(), frames: Arc::new(frames), hold_open: true }
    }

    /// Ends the stream after the last frame instead of holding it open.
    pub fn finite(mut self) -> Self {
        self.hold_open = false;
        self
    }
}

impl CaptureSource for ReplaySource {
    type Handle = ReplayHandle;

    fn open(&self, interface: &str, config: &CaptureConfig) -> Result<ReplayHandle, CaptureError> {
        if interface != self.interface {
            return Err(CaptureError::InterfaceNotFound(interface.to_string()));
        }

        let frames = self
            .frames
            .iter()
            .map(|f| Frame::truncated(f.timestamp(), f.link_type(), f.data(), config.snaplen))
            .collect();

        Ok(ReplayHandle {
            interface: self.interface.clone(),
            frames,
            hold_open: self.hold_open,
            released: false,
        })
    }
}

/// Handle opened by [`ReplaySource`].
#[derive(Debug)]
pub struct ReplayHandle {
    interface: String,
    frames: VecDeque<Frame>,
    hold_open: bool,
    released: bool,
}

impl Stream for ReplayHandle {
    type Item = Result<Frame, CaptureError>;

    fn poll_next(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.released {
            return Poll::Ready(None);
        }

        match self.frames.pop_front() {
            Some(frame) => Poll::Ready(Some(Ok(frame))),
            // Nothing will ever become ready, so there is no waker to register.
            None if self.hold_open => Poll::Pending,
            None => Poll::Ready(None),
        }
    }
}

impl CaptureHandle for ReplayHandle {
    fn interface(&self) -> &str {
        &self.interface
    }

    fn release(&mut self) {
        self.released = true;
        self.frames.clear();
    }
}

type Slot = Arc<Mutex<Option<mpsc::UnboundedSender<Result<Frame, CaptureError>>>>>;

/// A capture source fed at runtime through a [`FrameInjector`].
///
/// Each `open` creates a fresh handle; the injector always feeds the most recently opened one.
#[derive(Debug, Clone)]
pub struct ChannelSource {
    interface: String,
    slot: Slot,
}

impl ChannelSource {
    /// Creates a source for the given interface name, together with its injector.
    pub fn new(interface: impl Into<String>) -> (Self, FrameInjector) {
        let slot = Slot::default();
        (Self { interface: interface.into(), slot: Arc::clone(&slot) }, FrameInjector { slot })
    }
}

impl CaptureSource for ChannelSource {
    type Handle = ChannelHandle;

    fn open(&self, interface: &str, _config: &CaptureConfig) -> Result<ChannelHandle, CaptureError> {
        if interface != self.interface {
            return Err(CaptureError::InterfaceNotFound(interface.to_string()));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        *self.slot.lock() = Some(tx);

        debug!(interface, "Opened channel capture");

        Ok(ChannelHandle {
            interface: self.interface.clone(),
            frames: UnboundedReceiverStream::new(rx),
            released: false,
        })
    }
}

/// Feeds frames into the handle most recently opened from a [`ChannelSource`].
#[derive(Debug, Clone)]
pub struct FrameInjector {
    slot: Slot,
}

impl FrameInjector {
    /// Injects a frame. Returns `false` if no handle is open.
    pub fn inject(&self, frame: Frame) -> bool {
        self.send(Ok(frame))
    }

    /// Injects a fatal capture error. Returns `false` if no handle is open.
    pub fn fail(&self, error: io::Error) -> bool {
        self.send(Err(CaptureError::Io(error)))
    }

    /// Returns `true` if a handle is currently open.
    pub fn is_open(&self) -> bool {
        self.slot.lock().as_ref().is_some_and(|tx| !tx.is_closed())
    }

    fn send(&self, item: Result<Frame, CaptureError>) -> bool {
        self.slot.lock().as_ref().is_some_and(|tx| tx.send(item).is_ok())
    }
}

/// Handle opened by [`ChannelSource`].
#[derive(Debug)]
pub struct ChannelHandle {
    interface: String,
    frames: UnboundedReceiverStream<Result<Frame, CaptureError>>,
    released: bool,
}

impl Stream for ChannelHandle {
    type Item = Result<Frame, CaptureError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.released {
            return Poll::Ready(None);
        }

        self.frames.poll_next_unpin(cx)
    }
}

impl CaptureHandle for ChannelHandle {
    fn interface(&self) -> &str {
        &self.interface
    }

    fn release(&mut self) {
        self.released = true;
        self.frames.close();
    }
}

#[cfg(test)]
mod tests {
    use std::{
        net::Ipv4Addr,
        time::{Duration, SystemTime},
    };

    use sensor_wire::{synth, TransportProtocol};

    use super::*;

    fn frame(micros: u64, size: usize) -> Frame {
        synth::ipv4_frame(
            SystemTime::UNIX_EPOCH + Duration::from_micros(micros),
            Ipv4Addr::new(1, 1, 1, 1),
            Ipv4Addr::new(2, 2, 2, 2),
            TransportProtocol::Udp,
            size,
        )
    }

    #[tokio::test]
    async fn replay_yields_in_order_then_ends() {
        let source = ReplaySource::new("lo", vec![frame(1, 64), frame(2, 64)]).finite();
        let mut handle = source.open("lo", &CaptureConfig::default()).unwrap();

        assert_eq!(handle.interface(), "lo");
        let first = handle.next().await.unwrap().unwrap();
        let second = handle.next().await.unwrap().unwrap();
        assert!(first.timestamp() < second.timestamp());
        assert!(handle.next().await.is_none());
    }

    #[tokio::test]
    async fn replay_holds_open_until_released() {
        let source = ReplaySource::new("lo", vec![frame(1, 64)]);
        let mut handle = source.open("lo", &CaptureConfig::default()).unwrap();

        assert!(handle.next().await.is_some());
        let pending = tokio::time::timeout(Duration::from_millis(20), handle.next()).await;
        assert!(pending.is_err(), "replay should stay open");

        handle.release();
        assert!(handle.next().await.is_none());
    }

    #[tokio::test]
    async fn replay_applies_snaplen() {
        let source = ReplaySource::new("eth0", vec![frame(1, 2000)]);
        let mut handle = source.open("eth0", &CaptureConfig::default().snaplen(128)).unwrap();

        let frame = handle.next().await.unwrap().unwrap();
        assert_eq!(frame.len(), 2000);
        assert_eq!(frame.data().len(), 128);
    }

    #[test]
    fn open_wrong_interface_fails() {
        let source = ReplaySource::new("eth0", Vec::new());
        assert!(matches!(
            source.open("eth1", &CaptureConfig::default()),
            Err(CaptureError::InterfaceNotFound(_))
        ));

        let (source, _injector) = ChannelSource::new("eth0");
        assert!(source.open("wlan0", &CaptureConfig::default()).is_err());
    }

    #[tokio::test]
    async fn injector_feeds_latest_handle() {
        let (source, injector) = ChannelSource::new("eth0");
        assert!(!injector.inject(frame(0, 64)), "nothing open yet");

        let mut first = source.open("eth0", &CaptureConfig::default()).unwrap();
        assert!(injector.inject(frame(1, 64)));
        assert_eq!(first.next().await.unwrap().unwrap().len(), 64);

        first.release();
        assert!(!injector.is_open());
        assert!(first.next().await.is_none());

        let mut second = source.open("eth0", &CaptureConfig::default()).unwrap();
        assert!(injector.fail(io::Error::other("link down")));
        assert!(matches!(second.next().await, Some(Err(CaptureError::Io(_)))));
    }
}
