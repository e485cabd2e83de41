use std::sync::Arc;

use tracing::{debug, trace, warn};

use sensor_common::Producer;
use sensor_wire::{classify, Frame, Measure};

use super::stats::SessionStats;
use crate::LatencyEstimator;

/// Classifies one frame, estimates its latency and enqueues the resulting measure. Runs as its
/// own task, one per captured frame.
pub(crate) async fn process_frame(
    frame: Frame,
    estimator: Arc<LatencyEstimator>,
    to_consumer: Producer<Measure>,
    stats: Arc<SessionStats>,
) {
    let Some(meta) = classify(&frame) else {
        stats.increment_frames_unclassified();
        trace!(len = frame.len(), "Skipping frame without IP transport");
        return;
    };

    let (measure, latency) = estimator.measure(&meta);

    if latency.is_anomalous() {
        stats.increment_clock_anomalies();
        warn!(
            src = %meta.source,
            dst = %meta.destination,
            ?latency,
            "Non-increasing timestamps between endpoints, recording latency as 0"
        );
    }

    debug!(
        protocol = measure.protocol(),
        src = measure.source_ip(),
        dst = measure.destination_ip(),
        size = measure.packet_size(),
        latency_us = measure.latency_us(),
        "Measured frame"
    );

    match to_consumer.enqueue(measure).await {
        Ok(()) => stats.increment_measures_enqueued(),
        Err(e) => {
            stats.increment_measures_dropped();
            let measure = e.into_inner();
            warn!(
                src = measure.source_ip(),
                dst = measure.destination_ip(),
                "Dispatch queue closed, dropping measure"
            );
        }
    }
}
