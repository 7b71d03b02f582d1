//! HTTP client for upstream forwarding and outbound posts

use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::header::CONTENT_TYPE;
use hyper::{HeaderMap, Method, Request, Response, Uri};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use tracing::{debug, warn};

use crate::{ReplayError, Result};

/// Pooled HTTP/1 client
pub struct HttpClient {
    client: Client<HttpConnector, Full<Bytes>>,
}

impl HttpClient {
    /// Create a new HTTP client
    #[must_use]
    pub fn new() -> Self {
        let client = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(10)
            .build_http();

        Self { client }
    }

    /// Send a request and collect the whole response body
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the body cannot be read
    pub async fn send(&self, request: Request<Full<Bytes>>) -> Result<Response<Bytes>> {
        debug!("Sending {} {}", request.method(), request.uri());

        let response = self.client.request(request).await.map_err(|e| {
            warn!("Request failed: {e}");
            ReplayError::Other(format!("Request failed: {e}"))
        })?;

        let (parts, body) = response.into_parts();
        let body = body
            .collect()
            .await
            .map_err(|e| ReplayError::Other(format!("Failed to read response body: {e}")))?
            .to_bytes();

        Ok(Response::from_parts(parts, body))
    }

    /// POST a JSON body with extra headers
    ///
    /// # Errors
    ///
    /// Returns error if the request cannot be built or sent
    pub async fn post_json(
        &self,
        uri: Uri,
        headers: HeaderMap,
        body: Bytes,
    ) -> Result<Response<Bytes>> {
        let mut request = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(CONTENT_TYPE, "application/json")
            .body(Full::new(body))
            .map_err(|e| ReplayError::Other(format!("Failed to build request: {e}")))?;
        request.headers_mut().extend(headers);

        self.send(request).await
    }
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Upstream URI for a proxied request
///
/// Absolute-form requests keep their own authority; origin-form requests are
/// sent to the default target.
///
/// # Errors
///
/// Returns error if the resulting URI is invalid
pub fn target_uri(incoming: &Uri, default_host: &str, default_port: u16) -> Result<Uri> {
    let path = incoming
        .path_and_query()
        .map_or("/", hyper::http::uri::PathAndQuery::as_str);

    let uri = match incoming.authority() {
        Some(authority) => {
            let scheme = incoming.scheme_str().unwrap_or("http");
            format!("{scheme}://{authority}{path}")
        }
        None => format!("http://{default_host}:{default_port}{path}"),
    };

    uri.parse::<Uri>()
        .map_err(|e| ReplayError::Other(format!("Invalid URI '{uri}': {e}")))
}
