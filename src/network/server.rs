//! Proxy listener and per-request forwarding

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::header::{HOST, TRANSFER_ENCODING};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info};

use super::client::{target_uri, HttpClient};
use crate::config::Config;
use crate::event::HttpEvent;
use crate::pipeline::EventSender;
use crate::Result;

/// Everything a connection task needs
struct ProxyContext {
    client: Arc<HttpClient>,
    target_host: String,
    target_port: u16,
    events: EventSender,
}

/// Transparent HTTP proxy feeding the capture pipeline
pub struct ProxyServer {
    listener: TcpListener,
    context: Arc<ProxyContext>,
}

impl ProxyServer {
    /// Bind the listen port on loopback
    ///
    /// # Errors
    ///
    /// Returns error if the port cannot be bound
    pub async fn bind(config: &Config, client: Arc<HttpClient>, events: EventSender) -> Result<Self> {
        let addr = SocketAddr::from(([127, 0, 0, 1], config.listen_port));
        Self::bind_addr(addr, config, client, events).await
    }

    /// Bind an explicit address
    ///
    /// # Errors
    ///
    /// Returns error if the address cannot be bound
    pub async fn bind_addr(
        addr: SocketAddr,
        config: &Config,
        client: Arc<HttpClient>,
        events: EventSender,
    ) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;

        Ok(Self {
            listener,
            context: Arc::new(ProxyContext {
                client,
                target_host: config.target.host.clone(),
                target_port: config.target.port,
                events,
            }),
        })
    }

    /// Address actually bound
    ///
    /// # Errors
    ///
    /// Returns error if the socket address cannot be read
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until `shutdown` resolves
    ///
    /// # Errors
    ///
    /// Returns error if the listener address cannot be read
    pub async fn run(self, shutdown: impl Future<Output = ()>) -> Result<()> {
        info!(
            "Proxy listening on {} (forwarding to {}:{})",
            self.local_addr()?,
            self.context.target_host,
            self.context.target_port
        );

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                () = &mut shutdown => {
                    info!("Proxy shutting down");
                    break;
                }
                result = self.listener.accept() => match result {
                    Ok((stream, peer_addr)) => {
                        debug!("Accepted connection from {peer_addr}");
                        tokio::spawn(serve_connection(stream, Arc::clone(&self.context)));
                    }
                    Err(e) => error!("Accept error: {e}"),
                },
            }
        }

        Ok(())
    }
}

async fn serve_connection(stream: TcpStream, context: Arc<ProxyContext>) {
    let service = service_fn(move |request| {
        let context = Arc::clone(&context);
        async move { Ok::<_, Infallible>(context.proxy(request).await) }
    });

    if let Err(e) = http1::Builder::new()
        .serve_connection(TokioIo::new(stream), service)
        .await
    {
        debug!("Connection closed with error: {e}");
    }
}

impl ProxyContext {
    async fn proxy(&self, request: Request<Incoming>) -> Response<Full<Bytes>> {
        let (parts, body) = request.into_parts();

        let request_body = match body.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) => {
                error!("Could not read request body: {e}");
                return error_response(StatusCode::BAD_REQUEST, "could not read request body");
            }
        };

        let uri = match target_uri(&parts.uri, &self.target_host, self.target_port) {
            Ok(uri) => uri,
            Err(e) => {
                error!("Could not build the outgoing request: {e}");
                return error_response(StatusCode::BAD_REQUEST, "invalid request target");
            }
        };

        let mut upstream = Request::new(Full::new(request_body.clone()));
        *upstream.method_mut() = parts.method.clone();
        *upstream.uri_mut() = uri;
        *upstream.headers_mut() = parts.headers.clone();
        upstream.headers_mut().remove(HOST);

        let response = match self.client.send(upstream).await {
            Ok(response) => response,
            Err(e) => {
                error!("Could not process HTTP request to target: {e}");
                return error_response(StatusCode::BAD_GATEWAY, "upstream request failed");
            }
        };
        let (mut response_parts, response_body) = response.into_parts();

        match HttpEvent::from_exchange(&parts, &response_parts, &request_body, &response_body) {
            Ok(event) => {
                info!("Saw event: {} {} {}", event.pair_id, event.method, event.endpoint);
                self.events.submit(event);
            }
            Err(e) => error!("{e}"),
        }

        // body was collected, so it goes back with a fixed length
        response_parts.headers.remove(TRANSFER_ENCODING);
        Response::from_parts(response_parts, Full::new(response_body))
    }
}

fn error_response(status: StatusCode, message: &str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(message.to_string())));
    *response.status_mut() = status;
    response
}
