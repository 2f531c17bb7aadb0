//! Procedures shared by the demo server and client.

#![allow(dead_code)]

use procrpc::{Procedure, Router};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;

#[derive(Debug, Serialize, Deserialize)]
pub struct Greet {
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Greeting {
    pub greeting: String,
}

pub fn hello() -> Procedure<Greet, Greeting> {
    Procedure::bind("hello", |req: Greet| {
        Ok::<_, Infallible>(Greeting {
            greeting: format!("Hello, {}!", req.name),
        })
    })
}

pub fn subtract() -> Procedure<(i64, i64), i64> {
    Procedure::bind("subtract", |(a, b): (i64, i64)| Ok::<_, Infallible>(a - b))
}

pub fn router() -> Router {
    Router::new().add_procedure(hello()).add_procedure(subtract())
}
