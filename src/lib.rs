//! Typed JSON-RPC 2.0 procedures over HTTP.
//!
//! A [`Procedure`] binds a function `Fn(P) -> Result<O, E>` to a method name.
//! Procedures are collected in a [`Router`], which a [`Server`] exposes on a
//! single HTTP endpoint, and the same `Procedure` value calls the method on a
//! remote endpoint with the same types.
//!
//! ```no_run
//! use procrpc::{Procedure, Router, Server};
//! use std::convert::Infallible;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let subtract = Procedure::bind("subtract", |(a, b): (i64, i64)| Ok::<_, Infallible>(a - b));
//!
//! let router = Router::new().add_procedure(subtract.clone());
//! tokio::spawn(Server::new(router).run());
//!
//! let difference = subtract.call("http://127.0.0.1:8080/", (42, 23)).await?;
//! assert_eq!(difference, 19);
//! # Ok(())
//! # }
//! ```

pub mod envelope;
pub mod error;
pub mod net;
pub mod procedure;
pub mod router;

pub use envelope::{ErrorCode, ErrorObject, Outcome, Request, Response, JSONRPC_VERSION};
pub use error::{BoxError, CallError, DispatchError, ServeError, ServerError, TransportError};
pub use net::{
    client::{HttpTransport, Transport},
    server::{Server, ServerConfig},
};
pub use procedure::{DynProcedure, Procedure};
pub use router::Router;
