//! Persistence for measurement records.
//!
//! The capture pipeline only needs a [`MeasureSink`]: one `insert` per record. Read access goes
//! through [`MeasureStore`], which answers the query surface directly from persisted records,
//! never from in-memory pipeline state.

use std::{sync::Arc, time::SystemTime};

use thiserror::Error;

use sensor_wire::Measure;

mod json;
pub use json::JsonLinesStore;

mod memory;
pub use memory::MemoryStore;

/// The maximum number of records returned by a query.
pub const QUERY_LIMIT: usize = 1000;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0:?}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Receives measurement records from the capture pipeline, one call per record.
#[async_trait::async_trait]
pub trait MeasureSink: Send + Sync + 'static {
    async fn insert(&self, measure: &Measure) -> Result<(), StoreError>;
}

/// A sink that can also answer queries over what it has persisted.
///
/// Query results are sorted by timestamp, newest first, and capped at [`QUERY_LIMIT`].
#[async_trait::async_trait]
pub trait MeasureStore: MeasureSink {
    /// Returns the most recent records.
    async fn find_all(&self) -> Result<Vec<Measure>, StoreError>;

    /// Returns the most recent records with a timestamp in `[begin, end]` (both inclusive).
    async fn find_between(
        &self,
        begin: SystemTime,
        end: SystemTime,
    ) -> Result<Vec<Measure>, StoreError>;
}

#[async_trait::async_trait]
impl<S: MeasureSink + ?Sized> MeasureSink for Arc<S> {
    async fn insert(&self, measure: &Measure) -> Result<(), StoreError> {
        (**self).insert(measure).await
    }
}

/// Sorts records newest first and applies [`QUERY_LIMIT`].
pub(crate) fn newest_first(records: impl IntoIterator<Item = Measure>) -> Vec<Measure> {
    let mut records: Vec<_> = records.into_iter().collect();
    records.sort_by(|a, b| b.timestamp().cmp(&a.timestamp()));
    records.truncate(QUERY_LIMIT);
    records
}

/// Returns `true` if the record falls within `[begin, end]`.
#[inline]
pub(crate) fn within(measure: &Measure, begin: SystemTime, end: SystemTime) -> bool {
    (begin..=end).contains(&measure.timestamp())
}
