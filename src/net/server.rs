//! Serves a [`Router`] as a single HTTP/1 JSON-RPC endpoint.
//!
//! Every connection is handled on its own tokio task. The router is moved
//! behind an `Arc` when the server is built, so the registry is frozen before
//! the first request arrives and is shared read-only afterwards.

use crate::{error::ServerError, router::Router};
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::{
    body::{Bytes, Incoming},
    header::{HeaderValue, CONTENT_TYPE},
    server::conn::http1,
    service::service_fn,
    Method, Request, Response, StatusCode,
};
use hyper_util::rt::TokioIo;
use std::{
    convert::Infallible,
    env,
    net::{Ipv4Addr, SocketAddr},
    sync::Arc,
    time::Duration,
};
use tokio::{net::TcpListener, task, time};

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

pub const ADDR_ENV: &str = "PROCRPC_ADDR";
pub const MAX_BODY_BYTES_ENV: &str = "PROCRPC_MAX_BODY_BYTES";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub addr: SocketAddr,
    /// Bodies above this size are refused with `413 Payload Too Large`.
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from((Ipv4Addr::LOCALHOST, DEFAULT_PORT)),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

impl ServerConfig {
    /// Reads `PROCRPC_ADDR` and `PROCRPC_MAX_BODY_BYTES`, keeping the default
    /// for anything unset or unparsable.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(raw) = lookup(ADDR_ENV) {
            match raw.parse() {
                Ok(addr) => config.addr = addr,
                Err(err) => tracing::warn!(%raw, %err, "ignoring invalid {ADDR_ENV}"),
            }
        }
        if let Some(raw) = lookup(MAX_BODY_BYTES_ENV) {
            match raw.parse() {
                Ok(limit) => config.max_body_bytes = limit,
                Err(err) => tracing::warn!(%raw, %err, "ignoring invalid {MAX_BODY_BYTES_ENV}"),
            }
        }
        config
    }

    pub fn with_addr(mut self, addr: SocketAddr) -> Self {
        self.addr = addr;
        self
    }

    pub fn with_max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }
}

pub struct Server {
    router: Arc<Router>,
    config: ServerConfig,
}

impl Server {
    pub fn new(router: Router) -> Self {
        Self::with_config(router, ServerConfig::default())
    }

    pub fn with_config(router: Router, config: ServerConfig) -> Self {
        Self {
            router: Arc::new(router),
            config,
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Binds `config.addr` and serves forever. Only binding can fail.
    pub async fn run(self) -> Result<(), ServerError> {
        let listener = TcpListener::bind(self.config.addr)
            .await
            .map_err(ServerError::Bind)?;
        self.serve(listener).await;
        Ok(())
    }

    /// Serves on an already bound listener. A failed `accept` (for example
    /// `EMFILE`) is logged and retried after a short pause.
    pub async fn serve(self, listener: TcpListener) {
        match listener.local_addr() {
            Ok(addr) => tracing::info!(
                %addr,
                procedures = self.router.len(),
                "JSON-RPC server listening"
            ),
            Err(err) => tracing::warn!(%err, "JSON-RPC server listening on unknown address"),
        }

        loop {
            let (stream, peer) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(err) => {
                    tracing::error!(%err, "failed to accept connection");
                    time::sleep(ACCEPT_RETRY_DELAY).await;
                    continue;
                }
            };
            let io = TokioIo::new(stream);
            let router = self.router.clone();
            let max_body_bytes = self.config.max_body_bytes;

            task::spawn(async move {
                let service = service_fn(move |req| {
                    let router = router.clone();
                    async move {
                        Ok::<_, Infallible>(handle_request(&router, max_body_bytes, req).await)
                    }
                });

                if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                    tracing::error!(%peer, %err, "error serving connection");
                }
            });
        }
    }
}

impl Router {
    /// Seals the router and serves it on `addr`.
    pub async fn listen_and_serve(self, addr: SocketAddr) -> Result<(), ServerError> {
        Server::with_config(self, ServerConfig::default().with_addr(addr))
            .run()
            .await
    }
}

async fn handle_request(
    router: &Router,
    max_body_bytes: usize,
    req: Request<Incoming>,
) -> Response<Full<Bytes>> {
    if req.method() != Method::POST {
        return empty(StatusCode::METHOD_NOT_ALLOWED);
    }

    let body = match Limited::new(req.into_body(), max_body_bytes).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(err) if err.is::<LengthLimitError>() => {
            tracing::warn!(max_body_bytes, "request body too large");
            return empty(StatusCode::PAYLOAD_TOO_LARGE);
        }
        Err(err) => {
            tracing::warn!(%err, "failed to read request body");
            return empty(StatusCode::BAD_REQUEST);
        }
    };

    match router.handle(&body).await {
        Ok(Some(reply)) => json(reply),
        Ok(None) => empty(StatusCode::ACCEPTED),
        Err(err) => {
            tracing::error!(%err, "failed to answer request");
            empty(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

fn empty(status: StatusCode) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = status;
    response
}

fn json(body: Vec<u8>) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body)));
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}
