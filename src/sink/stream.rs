//! Remote record channel reached over HTTP

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use hyper::header::HeaderValue;
use hyper::{HeaderMap, Uri};
use tracing::debug;

use super::Sink;
use crate::framing::MAX_RECORD_BYTES;
use crate::network::HttpClient;
use crate::{ReplayError, Result};

/// Header carrying the record's partition key
pub const PARTITION_KEY_HEADER: &str = "x-partition-key";

/// Posts each blob as one record to `{endpoint}/{stream}`
///
/// Records above the channel's ceiling are refused locally. Authentication and
/// endpoint discovery belong to whatever sits behind `endpoint`.
pub struct HttpStreamSink {
    endpoint: String,
    client: Arc<HttpClient>,
    max_record_bytes: usize,
}

impl HttpStreamSink {
    /// Create a sink for the channel at `endpoint`
    pub fn new(endpoint: impl Into<String>, client: Arc<HttpClient>) -> Self {
        Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            client,
            max_record_bytes: MAX_RECORD_BYTES,
        }
    }

    /// Override the per-record ceiling
    #[must_use]
    pub fn with_max_record_bytes(mut self, max_record_bytes: usize) -> Self {
        self.max_record_bytes = max_record_bytes;
        self
    }

    fn record_uri(&self, stream: &str) -> Result<Uri> {
        let uri = format!("{}/{stream}", self.endpoint);
        uri.parse::<Uri>()
            .map_err(|e| ReplayError::ConfigError(format!("Invalid stream URI '{uri}': {e}")))
    }
}

#[async_trait]
impl Sink for HttpStreamSink {
    async fn send(&self, name: &str, blob: &[u8]) -> Result<()> {
        if blob.len() > self.max_record_bytes {
            return Err(ReplayError::DataTooLarge {
                size: blob.len(),
                limit: self.max_record_bytes,
            });
        }

        let uri = self.record_uri(name)?;
        let mut headers = HeaderMap::new();
        let partition = format!("replay-partition-key-{}", Utc::now().to_rfc3339());
        headers.insert(
            PARTITION_KEY_HEADER,
            HeaderValue::from_str(&partition).map_err(|e| ReplayError::Other(e.to_string()))?,
        );

        let response = self
            .client
            .post_json(uri, headers, Bytes::copy_from_slice(blob))
            .await
            .map_err(|e| ReplayError::Sink {
                target: name.to_string(),
                reason: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(ReplayError::Sink {
                target: name.to_string(),
                reason: format!(
                    "channel answered {}: {}",
                    response.status(),
                    String::from_utf8_lossy(response.body())
                ),
            });
        }

        debug!("Stored {} byte record on {name}", blob.len());
        Ok(())
    }
}
