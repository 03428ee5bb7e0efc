//! Relay server: loopback accept loop and per-request CORS handling
//!
//! Each request moves through
//! `AWAIT_REQUEST -> VALIDATE_ORIGIN -> (REJECTED | PARSE_BODY -> DISPATCH -> RESPOND) -> CLOSED`.
//! A rejected request gets no response at all: [`Relay::respond`] returns
//! `None` and the connection is closed.

use std::future::Future;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
    CONTENT_TYPE, ORIGIN,
};
use axum::http::{HeaderMap, HeaderValue, Method, Request, Response, StatusCode};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use relay_core::{AllowedOrigins, OperationResult, OperationStatus, Settings};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use crate::dispatch::Dispatcher;
use crate::error::{Dropped, Result};
use crate::metrics;

/// Largest accepted operation body
pub const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

const ALLOW_METHODS: &str = "POST, OPTIONS";
const ALLOW_HEADERS: &str = "Content-Type";
const JSON: &str = "application/json";

/// Immutable runtime configuration, fixed before the server accepts
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub origins: AllowedOrigins,
    pub timeout: Duration,
    pub addr: SocketAddr,
}

impl RelayConfig {
    /// Configuration for a relay bound to `127.0.0.1:port`
    pub fn new(origins: AllowedOrigins, timeout: Duration, port: u16) -> Self {
        Self {
            origins,
            timeout,
            addr: (Ipv4Addr::LOCALHOST, port).into(),
        }
    }

    pub fn from_settings(settings: &Settings, port: u16) -> Result<Self> {
        Ok(Self::new(settings.origins(), settings.timeout()?, port))
    }
}

/// Request handler shared by every connection task
pub struct Relay {
    config: RelayConfig,
    dispatcher: Dispatcher,
}

impl Relay {
    pub fn new(config: RelayConfig) -> Result<Self> {
        let dispatcher = Dispatcher::new(config.timeout)?;
        Ok(Self { config, dispatcher })
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Handle one HTTP request
    ///
    /// `None` means the request is dropped and nothing is written back.
    pub async fn respond(&self, request: Request<Body>) -> Option<Response<Body>> {
        let method = request.method().clone();
        match method {
            Method::OPTIONS => Some(self.preflight(request.headers())),
            Method::POST => self.operation(request).await,
            method => {
                debug!(%method, "Ignoring request outside the relay protocol");
                metrics::record_rejected(metrics::REJECT_METHOD);
                None
            }
        }
    }

    /// Origin header value, if the origin is allowed
    fn allowed_origin(&self, headers: &HeaderMap) -> Option<HeaderValue> {
        let value = headers.get(ORIGIN)?;
        let origin = value.to_str().ok()?;
        if self.config.origins.is_allowed(origin) {
            Some(value.clone())
        } else {
            None
        }
    }

    fn preflight(&self, headers: &HeaderMap) -> Response<Body> {
        let mut response = Response::new(Body::empty());

        match self.allowed_origin(headers) {
            Some(origin) => {
                debug!(origin = ?origin, "Preflight accepted");
                let headers = response.headers_mut();
                headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, origin);
                headers.insert(
                    ACCESS_CONTROL_ALLOW_METHODS,
                    HeaderValue::from_static(ALLOW_METHODS),
                );
                headers.insert(
                    ACCESS_CONTROL_ALLOW_HEADERS,
                    HeaderValue::from_static(ALLOW_HEADERS),
                );
            }
            None => {
                warn!(origin = ?headers.get(ORIGIN), "Preflight from origin not in allow-list");
                metrics::record_rejected(metrics::REJECT_ORIGIN);
            }
        }

        response
    }

    async fn operation(&self, request: Request<Body>) -> Option<Response<Body>> {
        let Some(origin) = self.allowed_origin(request.headers()) else {
            warn!(origin = ?request.headers().get(ORIGIN), "Request from origin not in allow-list");
            metrics::record_rejected(metrics::REJECT_ORIGIN);
            return None;
        };

        let raw = match axum::body::to_bytes(request.into_body(), MAX_BODY_BYTES).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "Failed to read request body");
                metrics::record_rejected(metrics::REJECT_BODY);
                return None;
            }
        };

        let result = self.dispatcher.dispatch(&raw).await;
        if result.status == OperationStatus::BadRequest {
            return None;
        }

        Some(operation_response(result, origin))
    }
}

fn operation_response(result: OperationResult, origin: HeaderValue) -> Response<Body> {
    let mut response = Response::new(result.body.map(Body::from).unwrap_or_else(Body::empty));
    *response.status_mut() = status_code(result.status);

    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(JSON));
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, origin);
    response
}

fn status_code(status: OperationStatus) -> StatusCode {
    match status {
        OperationStatus::Ok => StatusCode::OK,
        OperationStatus::NotFound | OperationStatus::BadRequest => StatusCode::NOT_FOUND,
    }
}

/// Loopback relay server
pub struct RelayServer {
    listener: TcpListener,
    relay: Arc<Relay>,
}

impl RelayServer {
    /// Bind the configured loopback address
    pub async fn bind(config: RelayConfig) -> Result<Self> {
        let listener = TcpListener::bind(config.addr).await?;
        Self::from_listener(listener, config)
    }

    /// Serve on an already bound listener
    pub fn from_listener(listener: TcpListener, config: RelayConfig) -> Result<Self> {
        let relay = Arc::new(Relay::new(config)?);
        Ok(Self { listener, relay })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve until the process exits
    pub async fn run(self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Serve until `shutdown` resolves, then release the port
    ///
    /// In-flight connections are not drained.
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let Self { listener, relay } = self;
        let addr = listener.local_addr()?;

        info!(
            %addr,
            origins = relay.config().origins.len(),
            timeout_secs = relay.config().timeout.as_secs(),
            "Relay accepting connections"
        );

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested, closing listener");
                    break;
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        tokio::spawn(serve_connection(Arc::clone(&relay), stream, peer));
                    }
                    Err(e) => warn!(error = %e, "Failed to accept connection"),
                },
            }
        }

        drop(listener);
        Ok(())
    }
}

async fn serve_connection(relay: Arc<Relay>, stream: TcpStream, peer: SocketAddr) {
    metrics::record_connection_start();

    let service = service_fn(move |request: Request<Incoming>| {
        let relay = Arc::clone(&relay);
        async move { relay.respond(request.map(Body::new)).await.ok_or(Dropped) }
    });

    if let Err(e) = http1::Builder::new()
        .serve_connection(TokioIo::new(stream), service)
        .await
    {
        debug!(%peer, error = %e, "Connection closed");
    }

    metrics::record_connection_end();
}
