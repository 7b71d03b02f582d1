//! Streaming handler that frames events onto a record channel

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, error, info};

use super::EventHandler;
use crate::event::HttpEvent;
use crate::framing::{frame, EventChunk};
use crate::sink::Sink;
use crate::telemetry::{UsageEvent, UsageNotifier};
use crate::Result;

/// Frames every event and sends the frames in order, one record each
///
/// Events from different connections are sent concurrently. The gate only
/// orders them against the shutdown flush, which waits for in-flight sends.
pub struct StreamHandler {
    stream_name: String,
    frame_limit: usize,
    sink: Arc<dyn Sink>,
    notifier: Arc<dyn UsageNotifier>,
    gate: RwLock<()>,
}

impl StreamHandler {
    /// Create a handler sending to `stream_name`
    pub fn new(
        stream_name: impl Into<String>,
        frame_limit: usize,
        sink: Arc<dyn Sink>,
        notifier: Arc<dyn UsageNotifier>,
    ) -> Self {
        Self {
            stream_name: stream_name.into(),
            frame_limit,
            sink,
            notifier,
            gate: RwLock::new(()),
        }
    }

    fn build_chunks(&self, event: &HttpEvent) -> Result<Vec<EventChunk>> {
        let payload = event.to_json()?;
        frame(&payload, self.frame_limit)
    }

    async fn send_chunk(&self, chunk: &EventChunk) {
        let blob = match serde_json::to_vec(chunk) {
            Ok(blob) => blob,
            Err(e) => {
                error!("Could not encode chunk {}: {e}", chunk.chunk_number);
                return;
            }
        };

        info!(
            "Sending event with UUID={} ({}/{})",
            chunk.correlation_id,
            chunk.chunk_number + 1,
            chunk.num_chunks
        );
        if let Err(e) = self.sink.send(&self.stream_name, &blob).await {
            error!(
                "Failed to send chunk {} of {}: {e}",
                chunk.chunk_number, chunk.correlation_id
            );
        }
    }
}

#[async_trait]
impl EventHandler for StreamHandler {
    async fn handle_event(&self, event: HttpEvent) {
        let _guard = self.gate.read().await;

        match self.build_chunks(&event) {
            Ok(chunks) => {
                for chunk in &chunks {
                    self.send_chunk(chunk).await;
                }
            }
            Err(e) => error!("Dropping event {}: {e}", event.pair_id),
        }

        self.notifier.notify(UsageEvent::Online);
    }

    async fn flush_buffer(&self) {
        let _guard = self.gate.write().await;
        debug!("Stream handler holds no buffered events");
    }
}
