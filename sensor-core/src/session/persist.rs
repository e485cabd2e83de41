use std::{sync::Arc, time::Duration};

use tracing::{debug, error, trace};

use sensor_common::Consumer;
use sensor_store::MeasureSink;
use sensor_wire::Measure;

use super::stats::SessionStats;

/// Drains the dispatch queue into the sink, one insert at a time. Failed or timed out inserts
/// are logged and skipped. Returns once the queue is closed and empty.
pub(crate) async fn persist(
    mut from_workers: Consumer<Measure>,
    sink: Arc<dyn MeasureSink>,
    insert_timeout: Duration,
    stats: Arc<SessionStats>,
) {
    while let Some(measure) = from_workers.recv().await {
        match tokio::time::timeout(insert_timeout, sink.insert(&measure)).await {
            Ok(Ok(())) => {
                stats.increment_measures_persisted();
                trace!(
                    src = measure.source_ip(),
                    dst = measure.destination_ip(),
                    "Persisted measure"
                );
            }
            Ok(Err(e)) => {
                stats.increment_persist_failures();
                error!(err = ?e, src = measure.source_ip(), "Failed to persist measure");
            }
            Err(_) => {
                stats.increment_persist_failures();
                error!(timeout = ?insert_timeout, src = measure.source_ip(), "Persisting measure timed out");
            }
        }
    }

    debug!(persisted = stats.measures_persisted(), "Dispatch queue drained");
}
