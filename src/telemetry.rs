//! Fire-and-forget usage notification

use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;
use hyper::{HeaderMap, Uri};
use serde::Serialize;
use tracing::debug;

use crate::network::HttpClient;
use crate::{ReplayError, Result};

/// Environment variable consulted when no endpoint is configured
pub const TELEMETRY_ENDPOINT_ENV: &str = "REPLAY_ZERO_TELEMETRY_ENDPOINT";

/// Kind of usage being reported
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageEvent {
    /// Process started
    Open,
    /// Event sent to the record stream
    Online,
    /// Event buffered for a scenario file
    Offline,
}

impl UsageEvent {
    /// Mode label
    #[must_use]
    pub fn mode(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Online => "online",
            Self::Offline => "offline",
        }
    }

    /// Human-readable description
    #[must_use]
    pub fn message(self) -> &'static str {
        match self {
            Self::Open => "started the app",
            Self::Online => "recorded data in online mode",
            Self::Offline => "recorded data in offline mode",
        }
    }
}

/// Receives usage events; must never block or fail the caller
pub trait UsageNotifier: Send + Sync {
    /// Record that `event` happened
    fn notify(&self, event: UsageEvent);
}

/// Discards every notification
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

impl UsageNotifier for NoopNotifier {
    fn notify(&self, _event: UsageEvent) {}
}

#[derive(Debug, Serialize)]
struct UsageReport<'a> {
    username: String,
    mode: &'a str,
    message: &'a str,
    timestamp: i64,
}

/// Posts each notification as JSON from a detached task
pub struct HttpNotifier {
    endpoint: Uri,
    client: Arc<HttpClient>,
}

impl HttpNotifier {
    /// Create a notifier posting to `endpoint`
    ///
    /// # Errors
    ///
    /// Returns error if `endpoint` is not a valid URI
    pub fn new(endpoint: &str, client: Arc<HttpClient>) -> Result<Self> {
        let endpoint = endpoint.parse::<Uri>().map_err(|e| {
            ReplayError::ConfigError(format!("Invalid telemetry endpoint '{endpoint}': {e}"))
        })?;
        Ok(Self { endpoint, client })
    }
}

impl UsageNotifier for HttpNotifier {
    fn notify(&self, event: UsageEvent) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug!("No runtime available, dropping usage event {}", event.mode());
            return;
        };

        let report = UsageReport {
            username: current_user(),
            mode: event.mode(),
            message: event.message(),
            timestamp: Utc::now().timestamp(),
        };
        let body = match serde_json::to_vec(&report) {
            Ok(body) => Bytes::from(body),
            Err(e) => {
                debug!("Could not encode usage report: {e}");
                return;
            }
        };

        let endpoint = self.endpoint.clone();
        let client = Arc::clone(&self.client);
        runtime.spawn(async move {
            match client.post_json(endpoint, HeaderMap::new(), body).await {
                Ok(response) => debug!("Telemetry endpoint response code: {}", response.status()),
                Err(e) => debug!("Could not reach the telemetry endpoint: {e}"),
            }
        });
    }
}

/// Build the notifier for an optional endpoint, falling back to the environment
///
/// # Errors
///
/// Returns error if the endpoint is not a valid URI
pub fn notifier_for(
    endpoint: Option<&str>,
    client: Arc<HttpClient>,
) -> Result<Arc<dyn UsageNotifier>> {
    let from_env = std::env::var(TELEMETRY_ENDPOINT_ENV).ok();
    match endpoint.or(from_env.as_deref()).filter(|e| !e.is_empty()) {
        Some(endpoint) => Ok(Arc::new(HttpNotifier::new(endpoint, client)?)),
        None => Ok(Arc::new(NoopNotifier)),
    }
}

fn current_user() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "(unknown)".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_event_labels() {
        assert_eq!(UsageEvent::Open.mode(), "open");
        assert_eq!(UsageEvent::Online.mode(), "online");
        assert_eq!(UsageEvent::Offline.message(), "recorded data in offline mode");
    }

    #[test]
    fn test_invalid_endpoint() {
        let result = HttpNotifier::new("not a uri", Arc::new(HttpClient::new()));
        assert!(matches!(result, Err(ReplayError::ConfigError(_))));
    }

    #[test]
    fn test_notify_without_runtime_is_silent() {
        let notifier =
            HttpNotifier::new("http://127.0.0.1:1/usage", Arc::new(HttpClient::new())).unwrap();
        notifier.notify(UsageEvent::Open);
    }

    #[tokio::test]
    async fn test_notify_does_not_block_on_unreachable_endpoint() {
        let notifier =
            HttpNotifier::new("http://127.0.0.1:1/usage", Arc::new(HttpClient::new())).unwrap();

        let started = std::time::Instant::now();
        notifier.notify(UsageEvent::Offline);
        assert!(started.elapsed() < std::time::Duration::from_millis(100));
    }

    #[test]
    fn test_report_shape() {
        let report = UsageReport {
            username: "dev".to_string(),
            mode: "open",
            message: "started the app",
            timestamp: 1,
        };
        assert_eq!(
            serde_json::to_string(&report).unwrap(),
            r#"{"username":"dev","mode":"open","message":"started the app","timestamp":1}"#
        );
    }
}
