use std::{
    io,
    path::{Path, PathBuf},
    sync::Arc,
    time::SystemTime,
};

use tokio::{
    fs::{self, File, OpenOptions},
    io::AsyncWriteExt,
    sync::Mutex,
};
use tracing::{debug, warn};

use sensor_wire::Measure;

use crate::{newest_first, within, MeasureSink, MeasureStore, StoreError};

/// A store that appends one JSON object per line to a file.
///
/// Queries read the whole file back, skipping lines that fail to parse. Clones share the same
/// file handle, and writes are serialized.
#[derive(Debug, Clone)]
pub struct JsonLinesStore {
    path: PathBuf,
    file: Arc<Mutex<File>>,
}

impl JsonLinesStore {
    /// Opens (or creates) the file at `path` for appending.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path).await?;

        debug!(path = %path.display(), "Opened JSON lines store");

        Ok(Self { path, file: Arc::new(Mutex::new(file)) })
    }

    /// The path of the underlying file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_all(&self) -> Result<Vec<Measure>, StoreError> {
        // Hold the write lock so we never observe a partially written line.
        let _guard = self.file.lock().await;

        let contents = match fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut records = Vec::new();
        for (idx, line) in contents.lines().enumerate().filter(|(_, l)| !l.trim().is_empty()) {
            match serde_json::from_str::<Measure>(line) {
                Ok(measure) => records.push(measure),
                Err(e) => warn!(err = %e, line = idx + 1, "Skipping malformed record"),
            }
        }

        Ok(records)
    }
}

#[async_trait::async_trait]
impl MeasureSink for JsonLinesStore {
    async fn insert(&self, measure: &Measure) -> Result<(), StoreError> {
        let mut line = serde_json::to_vec(measure)?;
        line.push(b'\n');

        let mut file = self.file.lock().await;
        file.write_all(&line).await?;
        file.flush().await?;

        Ok(())
    }
}

#[async_trait::async_trait]
impl MeasureStore for JsonLinesStore {
    async fn find_all(&self) -> Result<Vec<Measure>, StoreError> {
        Ok(newest_first(self.read_all().await?))
    }

    async fn find_between(
        &self,
        begin: SystemTime,
        end: SystemTime,
    ) -> Result<Vec<Measure>, StoreError> {
        let records = self.read_all().await?;
        Ok(newest_first(records.into_iter().filter(|m| within(m, begin, end))))
    }
}
