//! HTTP plumbing: the server side exposes a [`Router`](crate::Router) on one
//! endpoint, the client side carries envelopes for [`Procedure`](crate::Procedure) calls.

pub mod client;
pub mod server;
