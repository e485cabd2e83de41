use std::{
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use futures::{FutureExt, StreamExt};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};
use tracing::{debug, error, info, warn, Instrument};

use sensor_capture::CaptureHandle;
use sensor_common::Producer;
use sensor_wire::Measure;

use super::{stats::SessionStats, worker::process_frame, SensorOptions, SessionReport};
use crate::LatencyEstimator;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Reading frames and spawning workers.
    Capturing,
    /// Capture released, waiting for in-flight workers.
    Draining,
    /// Dispatch queue closed, waiting for the consumer to persist what is left.
    Flushing,
}

/// Drives a single capture session: reads frames from the handle, spawns a worker per frame and
/// runs the shutdown sequence once cancelled or once the handle fails.
///
/// Resolves to the final [`SessionReport`] after the persistence consumer has exited.
pub(crate) struct CaptureDriver<H: CaptureHandle> {
    /// The open capture. Released as soon as shutdown begins.
    handle: H,
    /// The sensor options, shared with the front-end.
    options: Arc<SensorOptions>,
    /// Latency state for this session.
    estimator: Arc<LatencyEstimator>,
    /// Session counters, shared with the front-end.
    stats: Arc<SessionStats>,
    /// Producer half of the dispatch queue, cloned into every worker.
    to_consumer: Producer<Measure>,
    /// In-flight frame workers.
    workers: JoinSet<()>,
    /// The persistence consumer task.
    consumer: JoinHandle<()>,
    /// Resolves when the front-end requests a stop.
    shutdown: Pin<Box<WaitForCancellationFutureOwned>>,
    /// Cancelled once the capture has been released, for whatever reason.
    capture_ended: CancellationToken,
    phase: Phase,
}

impl<H: CaptureHandle> CaptureDriver<H> {
    pub(super) fn new(
        handle: H,
        options: Arc<SensorOptions>,
        stats: Arc<SessionStats>,
        to_consumer: Producer<Measure>,
        consumer: JoinHandle<()>,
        shutdown: WaitForCancellationFutureOwned,
        capture_ended: CancellationToken,
    ) -> Self {
        Self {
            handle,
            options,
            estimator: Arc::new(LatencyEstimator::new()),
            stats,
            to_consumer,
            workers: JoinSet::new(),
            consumer,
            shutdown: Box::pin(shutdown),
            capture_ended,
            phase: Phase::Capturing,
        }
    }

    fn spawn_worker(&mut self, frame: sensor_wire::Frame) {
        let worker = process_frame(
            frame,
            Arc::clone(&self.estimator),
            self.to_consumer.clone(),
            Arc::clone(&self.stats),
        );

        self.workers.spawn(worker.in_current_span());
    }

    fn on_worker_exit(&self, result: Result<(), JoinError>) {
        if let Err(e) = result {
            if e.is_panic() {
                error!(err = ?e, "Frame worker panicked");
            }
        }
    }

    /// Releases the capture and moves on to draining or flushing, depending on the options.
    fn begin_shutdown(&mut self) {
        self.handle.release();
        self.capture_ended.cancel();

        if self.options.drain_on_stop {
            debug!(in_flight = self.workers.len(), "Capture released, draining workers");
            self.phase = Phase::Draining;
        } else {
            self.close_queue();
            // Late workers keep running and have their results dropped by the closed queue.
            self.workers.detach_all();
        }
    }

    fn close_queue(&mut self) {
        self.to_consumer.close();
        self.phase = Phase::Flushing;
    }
}

impl<H: CaptureHandle> Future for CaptureDriver<H> {
    type Output = SessionReport;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        loop {
            match this.phase {
                Phase::Capturing => {
                    if let Poll::Ready(Some(result)) = this.workers.poll_join_next(cx) {
                        this.on_worker_exit(result);
                        continue;
                    }

                    if this.shutdown.as_mut().poll(cx).is_ready() {
                        info!("Stopping capture");
                        this.begin_shutdown();
                        continue;
                    }

                    // Backpressure: stop reading until a worker slot frees up.
                    if this.workers.len() >= this.options.max_workers {
                        return Poll::Pending;
                    }

                    match this.handle.poll_next_unpin(cx) {
                        Poll::Ready(Some(Ok(frame))) => {
                            this.stats.increment_frames_received();
                            this.spawn_worker(frame);
                        }
                        Poll::Ready(Some(Err(e))) => {
                            this.stats.increment_capture_errors();
                            error!(err = ?e, "Capture failed, ending session");
                            this.begin_shutdown();
                        }
                        Poll::Ready(None) => {
                            warn!("Capture source ended, ending session");
                            this.begin_shutdown();
                        }
                        Poll::Pending => return Poll::Pending,
                    }
                }
                Phase::Draining => match this.workers.poll_join_next(cx) {
                    Poll::Ready(Some(result)) => this.on_worker_exit(result),
                    Poll::Ready(None) => this.close_queue(),
                    Poll::Pending => return Poll::Pending,
                },
                Phase::Flushing => {
                    if let Err(e) = futures::ready!(this.consumer.poll_unpin(cx)) {
                        error!(err = ?e, "Persistence consumer failed");
                    }

                    let report = this.stats.report();
                    info!(
                        frames = report.frames_received,
                        persisted = report.measures_persisted,
                        dropped = report.measures_dropped,
                        "Capture session ended"
                    );

                    return Poll::Ready(report);
                }
            }
        }
    }
}
