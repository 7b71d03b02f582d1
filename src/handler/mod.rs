//! Dispatch handlers consuming captured events
//!
//! Two variants share the [`EventHandler`] contract: [`TemplateHandler`]
//! buffers events and renders them to scenario files, [`StreamHandler`]
//! frames every event and forwards the frames to a record channel.

mod buffering;
pub mod control;
mod streaming;

pub use buffering::{BufferState, TemplateHandler};
pub use streaming::StreamHandler;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{Config, Mode};
use crate::event::HttpEvent;
use crate::network::HttpClient;
use crate::render::{FunctionSet, OutputFormat, Renderer};
use crate::sink::{FileSink, HttpStreamSink};
use crate::telemetry::UsageNotifier;
use crate::{ReplayError, Result};

/// Capture contract consumed by the proxy and the shutdown sequence
///
/// Neither operation reports failure: errors are logged and absorbed.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Accept one captured event
    async fn handle_event(&self, event: HttpEvent);

    /// Write out anything still buffered
    async fn flush_buffer(&self);
}

/// Build the handler selected by `config`
///
/// # Errors
///
/// Returns error if the output format or sink cannot be set up
pub fn from_config(
    config: &Config,
    client: Arc<HttpClient>,
    notifier: Arc<dyn UsageNotifier>,
) -> Result<Arc<dyn EventHandler>> {
    match config.mode() {
        Mode::Template => {
            let capture = &config.capture;
            let format = OutputFormat::resolve(&capture.template, capture.extension.as_deref())?;
            let sink = FileSink::new(&capture.output_dir)?;
            Ok(Arc::new(TemplateHandler::new(
                format,
                Renderer::new(&FunctionSet::new()),
                Arc::new(sink),
                notifier,
                capture.batch_size,
            )))
        }
        Mode::Stream => {
            let stream = config.stream.as_ref().ok_or_else(|| {
                ReplayError::ConfigError("stream mode requires a [stream] section".to_string())
            })?;
            let sink = HttpStreamSink::new(&stream.endpoint, client);
            Ok(Arc::new(StreamHandler::new(
                &stream.name,
                stream.frame_limit,
                Arc::new(sink),
                notifier,
            )))
        }
    }
}
