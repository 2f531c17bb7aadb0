use crate::envelope::ErrorCode;
use hyper::StatusCode;
use std::{error::Error as StdError, io};
use thiserror::Error;

/// The failure type handlers return.
pub type BoxError = Box<dyn StdError + Send + Sync>;

/// Failure of a procedure's server-side `serve`.
#[derive(Debug, Error)]
pub enum ServeError {
    #[error("decoding request: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("handler failed: {0}")]
    Handler(#[source] BoxError),

    #[error("encoding response: {0}")]
    Encode(#[source] serde_json::Error),
}

impl ServeError {
    /// The protocol error the router answers with for this failure.
    pub fn code(&self) -> ErrorCode {
        match self {
            ServeError::Decode(_) => ErrorCode::InvalidParams,
            ServeError::Handler(_) | ServeError::Encode(_) => ErrorCode::InternalError,
        }
    }
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("encoding error response: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Failure of a client-side call.
#[derive(Debug, Error)]
pub enum CallError {
    #[error("transport: {0}")]
    Transport(#[from] TransportError),

    #[error("remote error {code}: {message}")]
    Remote { code: i32, message: String },

    #[error("encoding request: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("decoding response: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl CallError {
    /// The well-known protocol code of a remote error, if it is one.
    pub fn remote_code(&self) -> Option<ErrorCode> {
        match self {
            CallError::Remote { code, .. } => ErrorCode::from_code(*code),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid endpoint {endpoint:?}: {source}")]
    InvalidEndpoint {
        endpoint: String,
        #[source]
        source: hyper::http::uri::InvalidUri,
    },

    #[error("building request: {0}")]
    Request(#[from] hyper::http::Error),

    #[error("sending request: {0}")]
    Send(#[from] hyper_util::client::legacy::Error),

    #[error("reading response body: {0}")]
    Body(#[from] hyper::Error),

    #[error("unexpected status {0}")]
    Status(StatusCode),

    #[error("{0}")]
    Custom(BoxError),
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("binding listener: {0}")]
    Bind(#[source] io::Error),
}
