//! Buffering handler that renders batches to scenario files

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use super::control::{extract_control_headers, BatchDirective, ControlCommand};
use super::EventHandler;
use crate::event::HttpEvent;
use crate::render::{OutputFormat, Renderer};
use crate::sink::Sink;
use crate::telemetry::{UsageEvent, UsageNotifier};

/// Events waiting to be rendered, plus batch sizing and write numbering
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferState {
    events: Vec<HttpEvent>,
    effective_batch_size: usize,
    default_batch_size: usize,
    write_counter: usize,
}

impl BufferState {
    fn new(default_batch_size: usize) -> Self {
        Self {
            events: Vec::new(),
            effective_batch_size: default_batch_size,
            default_batch_size,
            write_counter: 0,
        }
    }

    /// Buffered events in arrival order
    pub fn events(&self) -> &[HttpEvent] {
        &self.events
    }

    /// Size that triggers the next flush
    pub fn effective_batch_size(&self) -> usize {
        self.effective_batch_size
    }

    /// Size restored after every flush
    pub fn default_batch_size(&self) -> usize {
        self.default_batch_size
    }

    /// Number of files written so far
    pub fn write_counter(&self) -> usize {
        self.write_counter
    }

    fn is_full(&self) -> bool {
        self.events.len() >= self.effective_batch_size
    }

    fn reset(&mut self) {
        self.events.clear();
        self.effective_batch_size = self.default_batch_size;
    }
}

/// Accumulates events and renders each batch through the output template
///
/// Every operation holds the state lock for its whole duration, including the
/// render and the file write.
pub struct TemplateHandler {
    format: OutputFormat,
    renderer: Renderer,
    sink: Arc<dyn Sink>,
    notifier: Arc<dyn UsageNotifier>,
    state: Mutex<BufferState>,
}

impl TemplateHandler {
    /// Create a handler; a batch size of zero is treated as one
    pub fn new(
        format: OutputFormat,
        renderer: Renderer,
        sink: Arc<dyn Sink>,
        notifier: Arc<dyn UsageNotifier>,
        batch_size: usize,
    ) -> Self {
        Self {
            format,
            renderer,
            sink,
            notifier,
            state: Mutex::new(BufferState::new(batch_size.max(1))),
        }
    }

    /// Copy of the current buffer state
    pub async fn snapshot(&self) -> BufferState {
        self.state.lock().await.clone()
    }

    async fn apply(&self, state: &mut BufferState, command: ControlCommand) {
        match command {
            ControlCommand::SetBatchSize(raw) => match BatchDirective::parse(&raw) {
                Some(BatchDirective::Reset) => {
                    self.flush_locked(state).await;
                    warn!(
                        "Batch size cannot be zero! Using default batch={}",
                        state.default_batch_size
                    );
                    state.effective_batch_size = state.default_batch_size;
                }
                Some(BatchDirective::Resize(size)) => {
                    self.flush_locked(state).await;
                    info!("Detected dynamic batch size with size {size}");
                    state.effective_batch_size = size;
                }
                None => warn!("Unable to parse dynamic batch size: {raw}"),
            },
            ControlCommand::Unknown { keyword, value } => {
                debug!("Ignoring unknown control header {keyword}={value}");
            }
        }
    }

    async fn flush_locked(&self, state: &mut BufferState) {
        let count = state.events.len();
        if count > 0 {
            info!("Flushing buffer...");
            self.write_batch(state, count).await;
        }
        state.reset();
    }

    async fn write_batch(&self, state: &mut BufferState, count: usize) {
        let name = match self.format.file_name(state.write_counter) {
            Ok(name) => name,
            Err(e) => {
                error!("Discarding {count} buffered event(s): {e}");
                return;
            }
        };

        let text = match self.renderer.render(&state.events, &self.format) {
            Ok(text) => text,
            Err(e) => {
                error!("Discarding {count} buffered event(s): {e}");
                return;
            }
        };

        match self.sink.send(&name, text.as_bytes()).await {
            Ok(()) => {
                let suffix = if count > 1 { "s" } else { "" };
                info!("Wrote {count} scenario{suffix} to file {name}");
                state.write_counter += 1;
            }
            Err(e) => error!("Failed to write {name}: {e}"),
        }
    }
}

#[async_trait]
impl EventHandler for TemplateHandler {
    async fn handle_event(&self, mut event: HttpEvent) {
        self.notifier.notify(UsageEvent::Offline);

        let mut state = self.state.lock().await;

        let (headers, commands) = extract_control_headers(std::mem::take(&mut event.request_headers));
        event.request_headers = headers;
        for command in commands {
            self.apply(&mut state, command).await;
        }

        state.events.push(event);
        if state.is_full() {
            self.flush_locked(&mut state).await;
        }
    }

    async fn flush_buffer(&self) {
        let mut state = self.state.lock().await;
        self.flush_locked(&mut state).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Header;
    use crate::handler::control::is_control_header;
    use crate::render::FunctionSet;
    use crate::sink::MemorySink;
    use crate::telemetry::NoopNotifier;
    use crate::{ReplayError, Result};

    struct FailingSink;

    #[async_trait]
    impl Sink for FailingSink {
        async fn send(&self, name: &str, _blob: &[u8]) -> Result<()> {
            Err(ReplayError::Sink {
                target: name.to_string(),
                reason: "disk full".to_string(),
            })
        }
    }

    fn event(path: &str, headers: Vec<Header>) -> HttpEvent {
        HttpEvent {
            pair_id: format!("id-{path}"),
            method: "GET".to_string(),
            endpoint: path.to_string(),
            request_headers: headers,
            request_body: String::new(),
            response_headers: vec![],
            response_body: "ok".to_string(),
            response_code: "200".to_string(),
        }
    }

    fn handler(template: &str, batch_size: usize) -> (TemplateHandler, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        let handler = TemplateHandler::new(
            OutputFormat::new(template, "txt"),
            Renderer::new(&FunctionSet::with_clock(|| "now".to_string())),
            sink.clone(),
            Arc::new(NoopNotifier),
            batch_size,
        );
        (handler, sink)
    }

    fn text(sink: &MemorySink, index: usize) -> String {
        String::from_utf8(sink.records()[index].1.clone()).unwrap()
    }

    const ENDPOINTS: &str = "{% for e in events %}{{ e.endpoint }};{% endfor %}";

    #[tokio::test]
    async fn test_no_flush_below_batch_size() {
        let (handler, sink) = handler("{{ events|length }}", 2);

        handler.handle_event(event("/a", vec![])).await;

        let state = handler.snapshot().await;
        assert_eq!(state.events().len(), 1);
        assert_eq!(state.write_counter(), 0);
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn test_flush_when_batch_full() {
        let (handler, sink) = handler("{{ events|length }}", 2);

        handler.handle_event(event("/a", vec![])).await;
        handler.handle_event(event("/b", vec![])).await;

        let state = handler.snapshot().await;
        assert!(state.events().is_empty());
        assert_eq!(state.write_counter(), 1);
        assert_eq!(state.effective_batch_size(), 2);
        assert_eq!(sink.records()[0].0, "replay_scenarios_0.txt");
        assert_eq!(text(&sink, 0), "2");
    }

    #[tokio::test]
    async fn test_file_names_increase() {
        let (handler, sink) = handler(ENDPOINTS, 1);

        handler.handle_event(event("/a", vec![])).await;
        handler.handle_event(event("/b", vec![])).await;
        handler.handle_event(event("/c", vec![])).await;

        let names: Vec<_> = sink.records().into_iter().map(|(name, _)| name).collect();
        assert_eq!(
            names,
            vec![
                "replay_scenarios_0.txt",
                "replay_scenarios_1.txt",
                "replay_scenarios_2.txt"
            ]
        );
        assert_eq!(handler.snapshot().await.write_counter(), 3);
    }

    #[tokio::test]
    async fn test_zero_batch_size_treated_as_one() {
        let (handler, sink) = handler(ENDPOINTS, 0);

        handler.handle_event(event("/a", vec![])).await;

        assert_eq!(sink.len(), 1);
    }

    #[tokio::test]
    async fn test_dynamic_batch_flushes_before_adding() {
        let (handler, sink) = handler(ENDPOINTS, 5);

        handler.handle_event(event("/a", vec![])).await;
        handler
            .handle_event(event("/b", vec![Header::new("Replay_batch", "2")]))
            .await;

        // "/a" was flushed alone; "/b" starts the new batch of two
        assert_eq!(sink.len(), 1);
        assert_eq!(text(&sink, 0), "/a;");
        let state = handler.snapshot().await;
        assert_eq!(state.events().len(), 1);
        assert_eq!(state.effective_batch_size(), 2);

        handler.handle_event(event("/c", vec![])).await;

        assert_eq!(sink.len(), 2);
        assert_eq!(text(&sink, 1), "/b;/c;");
        let state = handler.snapshot().await;
        assert!(state.events().is_empty());
        assert_eq!(state.effective_batch_size(), 5);
    }

    #[tokio::test]
    async fn test_dynamic_batch_on_empty_buffer() {
        let (handler, sink) = handler(ENDPOINTS, 1);

        handler
            .handle_event(event("/a", vec![Header::new("Replay_batch", "2")]))
            .await;

        assert!(sink.is_empty());
        let state = handler.snapshot().await;
        assert_eq!(state.events().len(), 1);
        assert_eq!(state.effective_batch_size(), 2);
        assert!(state.events()[0].request_headers.is_empty());
    }

    #[tokio::test]
    async fn test_zero_directive_flushes_then_resets() {
        let (handler, sink) = handler(ENDPOINTS, 3);

        handler
            .handle_event(event("/a", vec![Header::new("Replay_batch", "10")]))
            .await;
        handler.handle_event(event("/b", vec![])).await;
        handler
            .handle_event(event("/c", vec![Header::new("Replay_batch", "0")]))
            .await;

        assert_eq!(sink.len(), 1);
        assert_eq!(text(&sink, 0), "/a;/b;");
        let state = handler.snapshot().await;
        assert_eq!(state.effective_batch_size(), 3);
        assert_eq!(state.events().len(), 1);
    }

    #[tokio::test]
    async fn test_non_numeric_directive_ignored_but_stripped() {
        let (handler, sink) = handler(ENDPOINTS, 3);

        handler
            .handle_event(event("/a", vec![Header::new("Replay_batch", "2")]))
            .await;
        handler
            .handle_event(event(
                "/b",
                vec![Header::new("Accept", "*/*"), Header::new("Replay_batch", "aaa")],
            ))
            .await;

        assert!(sink.is_empty());
        let state = handler.snapshot().await;
        assert_eq!(state.events().len(), 2);
        assert_eq!(state.effective_batch_size(), 2);
        assert_eq!(
            state.events()[1].request_headers,
            vec![Header::new("Accept", "*/*")]
        );
    }

    #[tokio::test]
    async fn test_multiple_directives_each_flush() {
        let (handler, sink) = handler(ENDPOINTS, 5);

        handler.handle_event(event("/a", vec![])).await;
        handler
            .handle_event(event(
                "/b",
                vec![Header::new("Replay_batch", "4"), Header::new("Replay_batch", "3")],
            ))
            .await;

        // first directive flushes "/a", second finds the buffer empty
        assert_eq!(sink.len(), 1);
        assert_eq!(handler.snapshot().await.effective_batch_size(), 3);
    }

    #[tokio::test]
    async fn test_control_headers_never_rendered() {
        let template = "{% for e in events %}{% for h in e.req_headers %}{{ h.name }}\n{% endfor %}{% endfor %}";
        let (handler, sink) = handler(template, 2);

        handler
            .handle_event(event(
                "/a",
                vec![Header::new("Replay_batch", "x"), Header::new("Accept", "*/*")],
            ))
            .await;
        handler
            .handle_event(event(
                "/b",
                vec![Header::new("REPLAY_unknown", "1"), Header::new("Host", "h")],
            ))
            .await;

        let out = text(&sink, 0);
        assert_eq!(out, "Accept\nHost\n");
        assert!(out.lines().all(|name| !is_control_header(name)));
    }

    #[tokio::test]
    async fn test_bad_template_discards_buffer() {
        let (handler, sink) = handler("{{{", 1);

        handler.handle_event(event("/a", vec![])).await;

        let state = handler.snapshot().await;
        assert!(state.events().is_empty());
        assert_eq!(state.write_counter(), 0);
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn test_sink_failure_discards_buffer() {
        let handler = TemplateHandler::new(
            OutputFormat::new(ENDPOINTS, "txt"),
            Renderer::default(),
            Arc::new(FailingSink),
            Arc::new(NoopNotifier),
            1,
        );

        handler.handle_event(event("/a", vec![])).await;

        let state = handler.snapshot().await;
        assert!(state.events().is_empty());
        assert_eq!(state.write_counter(), 0);
    }

    #[tokio::test]
    async fn test_empty_extension_discards_buffer() {
        let sink = Arc::new(MemorySink::new());
        let handler = TemplateHandler::new(
            OutputFormat::new(ENDPOINTS, ""),
            Renderer::default(),
            sink.clone(),
            Arc::new(NoopNotifier),
            1,
        );

        handler.handle_event(event("/a", vec![])).await;

        assert!(sink.is_empty());
        assert_eq!(handler.snapshot().await.write_counter(), 0);
    }

    #[tokio::test]
    async fn test_flush_buffer_resets_state() {
        let (handler, sink) = handler(ENDPOINTS, 5);

        handler
            .handle_event(event("/a", vec![Header::new("Replay_batch", "3")]))
            .await;
        handler.flush_buffer().await;

        assert_eq!(sink.len(), 1);
        let state = handler.snapshot().await;
        assert!(state.events().is_empty());
        assert_eq!(state.effective_batch_size(), 5);
        assert_eq!(state.write_counter(), 1);
    }

    #[tokio::test]
    async fn test_flush_empty_buffer_is_noop() {
        let (handler, sink) = handler(ENDPOINTS, 5);

        handler.flush_buffer().await;
        handler.flush_buffer().await;

        assert!(sink.is_empty());
        assert_eq!(handler.snapshot().await.write_counter(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_events_all_written() {
        let (handler, sink) = handler("{{ events|length }}", 4);
        let handler = Arc::new(handler);

        let tasks: Vec<_> = (0..16)
            .map(|i| {
                let handler = Arc::clone(&handler);
                tokio::spawn(async move { handler.handle_event(event(&format!("/{i}"), vec![])).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(sink.len(), 4);
        assert!(sink
            .records()
            .iter()
            .all(|(_, blob)| blob.as_slice() == b"4"));
    }
}
