//! Wire shapes of the JSON-RPC 2.0 request, response and error objects.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;

pub const JSONRPC_VERSION: &str = "2.0";

/// A request envelope. `id: None` makes it a notification.
///
/// The id type defaults to [`Value`]. The server side decodes it as
/// `Box<RawValue>` instead, which keeps the id's exact JSON text so it can be
/// echoed back unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(deserialize = "P: Deserialize<'de>, I: Deserialize<'de>"))]
pub struct Request<P, I = Value> {
    pub jsonrpc: String,
    pub method: String,
    pub params: P,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_present"
    )]
    pub id: Option<I>,
}

impl<P, I> Request<P, I> {
    pub fn new(method: impl Into<String>, params: P, id: Option<I>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_owned(),
            method: method.into(),
            params,
            id,
        }
    }

    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

/// A response envelope. The result and the error live in one enum, so a
/// response can never carry both.
///
/// Decoding goes through `#[serde(flatten)]`, which `RawValue` does not
/// support, so raw ids are only used when encoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response<R, I = Value> {
    pub jsonrpc: String,
    #[serde(flatten)]
    pub outcome: Outcome<R>,
    pub id: I,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome<R> {
    Result(R),
    Error(ErrorObject),
}

impl<R, I> Response<R, I> {
    pub fn success(id: I, result: R) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_owned(),
            outcome: Outcome::Result(result),
            id,
        }
    }

    pub fn error(id: I, error: ErrorObject) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_owned(),
            outcome: Outcome::Error(error),
            id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorObject {
    pub code: i32,
    pub message: String,
}

impl From<ErrorCode> for ErrorObject {
    fn from(code: ErrorCode) -> Self {
        Self {
            code: code.code(),
            message: code.message().to_owned(),
        }
    }
}

impl fmt::Display for ErrorObject {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.code)
    }
}

/// The protocol-level error codes this crate emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    ParseError,
    InvalidRequest,
    MethodNotFound,
    InvalidParams,
    InternalError,
}

impl ErrorCode {
    pub fn code(self) -> i32 {
        use ErrorCode::*;
        match self {
            ParseError => -32700,
            InvalidRequest => -32600,
            MethodNotFound => -32601,
            InvalidParams => -32602,
            InternalError => -32603,
        }
    }

    pub fn message(self) -> &'static str {
        use ErrorCode::*;
        match self {
            ParseError => "Parse error",
            InvalidRequest => "Invalid Request",
            MethodNotFound => "Method not found",
            InvalidParams => "Invalid params",
            InternalError => "Internal error",
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        use ErrorCode::*;
        [ParseError, InvalidRequest, MethodNotFound, InvalidParams, InternalError]
            .into_iter()
            .find(|known| known.code() == code)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.message())
    }
}

// Tells an explicit `"id": null` apart from a missing id; the missing case is
// handled by `#[serde(default)]`.
fn deserialize_present<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}
