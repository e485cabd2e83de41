use std::{sync::Arc, time::SystemTime};

use parking_lot::RwLock;

use sensor_wire::Measure;

use crate::{newest_first, within, MeasureSink, MeasureStore, StoreError};

/// An in-memory store. Clones share the same records.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    records: Arc<RwLock<Vec<Measure>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored records.
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Returns all records in insertion order, without any limit.
    pub fn snapshot(&self) -> Vec<Measure> {
        self.records.read().clone()
    }
}

#[async_trait::async_trait]
impl MeasureSink for MemoryStore {
    async fn insert(&self, measure: &Measure) -> Result<(), StoreError> {
        self.records.write().push(measure.clone());
        Ok(())
    }
}

#[async_trait::async_trait]
impl MeasureStore for MemoryStore {
    async fn find_all(&self) -> Result<Vec<Measure>, StoreError> {
        Ok(newest_first(self.records.read().iter().cloned()))
    }

    async fn find_between(
        &self,
        begin: SystemTime,
        end: SystemTime,
    ) -> Result<Vec<Measure>, StoreError> {
        let records = self.records.read();
        Ok(newest_first(records.iter().filter(|m| within(m, begin, end)).cloned()))
    }
}
