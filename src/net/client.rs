use crate::error::TransportError;
use futures::future::BoxFuture;
use http_body_util::{BodyExt, Full};
use hyper::{
    body::Bytes,
    header::{HeaderValue, CONTENT_TYPE},
    Method, Request, Uri,
};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};

/// Delivers one encoded request envelope and returns the raw reply body.
///
/// An empty body means the server accepted the message without answering,
/// which is what a notification gets.
pub trait Transport: Send + Sync {
    fn round_trip<'a>(
        &'a self,
        endpoint: &'a str,
        body: Vec<u8>,
    ) -> BoxFuture<'a, Result<Vec<u8>, TransportError>>;
}

/// POSTs envelopes to an HTTP endpoint such as `http://127.0.0.1:8080/`.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client<HttpConnector, Full<Bytes>>,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self {
            client: Client::builder(TokioExecutor::new()).build_http(),
        }
    }

    async fn post(&self, endpoint: &str, body: Vec<u8>) -> Result<Vec<u8>, TransportError> {
        let uri: Uri = endpoint
            .parse()
            .map_err(|source| TransportError::InvalidEndpoint {
                endpoint: endpoint.to_owned(),
                source,
            })?;

        let request = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
            .body(Full::new(Bytes::from(body)))?;

        let response = self.client.request(request).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status(status));
        }

        let body = response.into_body().collect().await?.to_bytes();
        Ok(body.to_vec())
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for HttpTransport {
    fn round_trip<'a>(
        &'a self,
        endpoint: &'a str,
        body: Vec<u8>,
    ) -> BoxFuture<'a, Result<Vec<u8>, TransportError>> {
        Box::pin(self.post(endpoint, body))
    }
}
