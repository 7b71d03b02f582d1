//! Single capture pipeline between the proxy and the dispatch handler
//!
//! Events are queued by connection tasks and handed to the handler by one
//! consumer, in arrival order, off the client-facing path.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::event::HttpEvent;
use crate::handler::EventHandler;

/// Cloneable entry point used by connection tasks
#[derive(Clone)]
pub struct EventSender {
    tx: mpsc::UnboundedSender<HttpEvent>,
}

impl EventSender {
    /// Queue an event; dropped with a log line if the pipeline has shut down
    pub fn submit(&self, event: HttpEvent) {
        if let Err(mpsc::error::SendError(event)) = self.tx.send(event) {
            error!("Capture pipeline closed, dropping event {}", event.pair_id);
        }
    }
}

/// Owns the consumer task; consumed by [`CapturePipeline::shutdown`]
pub struct CapturePipeline {
    handler: Arc<dyn EventHandler>,
    consumer: JoinHandle<()>,
    close: oneshot::Sender<()>,
}

impl CapturePipeline {
    /// Start the consumer task for `handler`
    pub fn spawn(handler: Arc<dyn EventHandler>) -> (EventSender, Self) {
        let (tx, rx) = mpsc::unbounded_channel::<HttpEvent>();
        let (close, closed) = oneshot::channel();

        let consumer = tokio::spawn(consume(Arc::clone(&handler), rx, closed));

        (
            EventSender { tx },
            Self {
                handler,
                consumer,
                close,
            },
        )
    }

    /// Stop accepting events, drain the queue, then flush exactly once
    pub async fn shutdown(self) {
        info!("Cleaning up...");

        // The consumer may already be gone if every sender was dropped
        let _ = self.close.send(());
        if let Err(e) = self.consumer.await {
            error!("Capture consumer failed: {e}");
        }

        self.handler.flush_buffer().await;
    }
}

async fn consume(
    handler: Arc<dyn EventHandler>,
    mut rx: mpsc::UnboundedReceiver<HttpEvent>,
    mut closed: oneshot::Receiver<()>,
) {
    loop {
        tokio::select! {
            biased;
            _ = &mut closed => break,
            event = rx.recv() => match event {
                Some(event) => handler.handle_event(event).await,
                None => return,
            },
        }
    }

    rx.close();
    while let Some(event) = rx.recv().await {
        handler.handle_event(event).await;
    }
    debug!("Capture queue drained");
}
