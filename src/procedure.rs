use crate::{
    envelope::{Outcome, Request, Response},
    error::{BoxError, CallError, ServeError},
    net::client::{HttpTransport, Transport},
};
use futures::{
    future::{ready, BoxFuture},
    FutureExt, TryFutureExt,
};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{value::RawValue, Value};
use std::{
    fmt,
    future::Future,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

type Handler<P, O> = dyn Fn(P) -> BoxFuture<'static, Result<O, BoxError>> + Send + Sync;

/// A typed function bound to a method name.
///
/// The same value serves the method inside a [`Router`](crate::Router) and
/// calls it on a remote endpoint, so server and client share one definition.
pub struct Procedure<P, O> {
    name: String,
    handler: Arc<Handler<P, O>>,
}

impl<P, O> Procedure<P, O>
where
    P: 'static,
    O: Send + 'static,
{
    pub fn bind<F, E>(name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(P) -> Result<O, E> + Send + Sync + 'static,
        E: Into<BoxError>,
    {
        Self {
            name: name.into(),
            handler: Arc::new(move |params| {
                ready(handler(params).map_err(Into::<BoxError>::into)).boxed()
            }),
        }
    }

    pub fn bind_async<F, Fut, E>(name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O, E>> + Send + 'static,
        E: Into<BoxError> + 'static,
    {
        Self {
            name: name.into(),
            handler: Arc::new(move |params| {
                handler(params).map_err(Into::<BoxError>::into).boxed()
            }),
        }
    }
}

impl<P, O> Procedure<P, O> {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<P, O> Clone for Procedure<P, O> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            handler: self.handler.clone(),
        }
    }
}

impl<P, O> fmt::Debug for Procedure<P, O> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Procedure")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// The type-erased face of a [`Procedure`], which lets procedures with
/// different parameter and result types share one registry.
pub trait DynProcedure: Send + Sync {
    fn name(&self) -> &str;

    /// Decodes a complete request envelope, runs the handler and encodes the
    /// response envelope.
    fn serve<'a>(&'a self, raw: &'a [u8]) -> BoxFuture<'a, Result<Vec<u8>, ServeError>>;
}

impl<P, O> Procedure<P, O>
where
    P: DeserializeOwned,
    O: Serialize,
{
    async fn serve_typed(&self, raw: &[u8]) -> Result<Vec<u8>, ServeError> {
        // A missing `params` decodes as null so unit and optional params work.
        let request: Request<Option<P>, Box<RawValue>> =
            serde_json::from_slice(raw).map_err(ServeError::Decode)?;
        let params = match request.params {
            Some(params) => params,
            None => serde_json::from_value(Value::Null).map_err(ServeError::Decode)?,
        };

        let id = request.id;

        let result = (self.handler)(params).await.map_err(ServeError::Handler)?;
        let response = Response::success(id, result);
        serde_json::to_vec(&response).map_err(ServeError::Encode)
    }
}

impl<P, O> DynProcedure for Procedure<P, O>
where
    P: DeserializeOwned + Send,
    O: Serialize + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn serve<'a>(&'a self, raw: &'a [u8]) -> BoxFuture<'a, Result<Vec<u8>, ServeError>> {
        Box::pin(self.serve_typed(raw))
    }
}

static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

fn next_request_id() -> u64 {
    NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed)
}

impl<P, O> Procedure<P, O>
where
    P: Serialize,
    O: DeserializeOwned,
{
    /// Calls this procedure on the JSON-RPC endpoint at `endpoint` over HTTP.
    pub async fn call(&self, endpoint: &str, params: P) -> Result<O, CallError> {
        self.call_with(&HttpTransport::new(), endpoint, params).await
    }

    pub async fn call_with<T>(
        &self,
        transport: &T,
        endpoint: &str,
        params: P,
    ) -> Result<O, CallError>
    where
        T: Transport + ?Sized,
    {
        let id = Value::from(next_request_id());
        let request = Request::new(self.name.as_str(), params, Some(id.clone()));
        let body = serde_json::to_vec(&request).map_err(CallError::Encode)?;

        tracing::debug!(method = %self.name, %id, endpoint, "calling procedure");
        let raw = transport.round_trip(endpoint, body).await?;
        let response: Response<O> = serde_json::from_slice(&raw).map_err(CallError::Decode)?;

        match response.outcome {
            Outcome::Error(error) => Err(CallError::Remote {
                code: error.code,
                message: error.message,
            }),
            Outcome::Result(_) if response.id != id => Err(CallError::InvalidResponse(format!(
                "response id {} does not match request id {id}",
                response.id
            ))),
            Outcome::Result(result) => Ok(result),
        }
    }

    /// Sends this procedure as a notification. The server accepts it without
    /// reporting whether the handler succeeded.
    pub async fn notify(&self, endpoint: &str, params: P) -> Result<(), CallError> {
        self.notify_with(&HttpTransport::new(), endpoint, params).await
    }

    pub async fn notify_with<T>(
        &self,
        transport: &T,
        endpoint: &str,
        params: P,
    ) -> Result<(), CallError>
    where
        T: Transport + ?Sized,
    {
        let request: Request<P> = Request::new(self.name.as_str(), params, None);
        let body = serde_json::to_vec(&request).map_err(CallError::Encode)?;

        tracing::debug!(method = %self.name, endpoint, "sending notification");
        let raw = transport.round_trip(endpoint, body).await?;
        if raw.is_empty() {
            return Ok(());
        }

        // Envelope errors (parse, invalid request) are answered even for
        // notifications.
        let response: Response<Value> = serde_json::from_slice(&raw).map_err(CallError::Decode)?;
        match response.outcome {
            Outcome::Error(error) => Err(CallError::Remote {
                code: error.code,
                message: error.message,
            }),
            Outcome::Result(_) => Err(CallError::InvalidResponse(
                "result returned for a notification".to_owned(),
            )),
        }
    }
}

impl<P, O> Procedure<P, O>
where
    P: Serialize + Send + 'static,
    O: DeserializeOwned + Send + 'static,
{
    /// Fixes the endpoint, turning the procedure into a plain async function.
    pub fn bind_endpoint(
        &self,
        endpoint: impl Into<String>,
    ) -> impl Fn(P) -> BoxFuture<'static, Result<O, CallError>> + Clone + Send + Sync {
        let procedure = self.clone();
        let endpoint: Arc<str> = endpoint.into().into();
        move |params| {
            let procedure = procedure.clone();
            let endpoint = endpoint.clone();
            async move { procedure.call(&endpoint, params).await }.boxed()
        }
    }
}
