//! Destinations that accept a named blob
//!
//! The template handler writes one file per flush; the stream handler pushes
//! one record per chunk.

mod file;
mod stream;

pub use file::FileSink;
pub use stream::{HttpStreamSink, PARTITION_KEY_HEADER};

use std::sync::Mutex;

use async_trait::async_trait;

use crate::Result;

/// External destination for captured output
#[async_trait]
pub trait Sink: Send + Sync {
    /// Deliver `blob` to the stream or file called `name`
    ///
    /// # Errors
    ///
    /// Returns error if the blob could not be delivered
    async fn send(&self, name: &str, blob: &[u8]) -> Result<()>;
}

/// Sink that keeps every blob in memory, in delivery order
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<(String, Vec<u8>)>>,
}

impl MemorySink {
    /// Create an empty sink
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of delivered `(name, blob)` pairs
    pub fn records(&self) -> Vec<(String, Vec<u8>)> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }

    /// Number of blobs delivered
    pub fn len(&self) -> usize {
        self.records.lock().map(|records| records.len()).unwrap_or(0)
    }

    /// Whether nothing has been delivered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl Sink for MemorySink {
    async fn send(&self, name: &str, blob: &[u8]) -> Result<()> {
        self.records
            .lock()
            .map_err(|_| crate::ReplayError::Sink {
                target: name.to_string(),
                reason: "memory sink poisoned".to_string(),
            })?
            .push((name.to_string(), blob.to_vec()));
        Ok(())
    }
}
