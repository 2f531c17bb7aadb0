use crate::{
    envelope::{ErrorCode, Response, JSONRPC_VERSION},
    error::DispatchError,
    procedure::DynProcedure,
};
use serde::{
    de::{self, IgnoredAny, MapAccess, Visitor},
    Deserialize, Deserializer,
};
use serde_json::value::RawValue;
use std::{
    collections::{BTreeMap, HashSet},
    fmt, str,
    sync::Arc,
};

/// Maps method names to procedures and answers raw JSON-RPC requests.
///
/// Procedures are registered with [`add_procedure`](Self::add_procedure)
/// while the router is still owned. Once it is handed to a
/// [`Server`](crate::Server) it sits behind an `Arc` and is read-only.
#[derive(Default)]
pub struct Router {
    procedures: BTreeMap<String, Arc<dyn DynProcedure>>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `procedure` under its own name. A later registration with
    /// the same name replaces the earlier one.
    pub fn add_procedure<T>(mut self, procedure: T) -> Self
    where
        T: DynProcedure + 'static,
    {
        let name = procedure.name().to_owned();
        if self.procedures.contains_key(&name) {
            tracing::warn!(method = %name, "replacing previously registered procedure");
        }
        self.procedures.insert(name, Arc::new(procedure));
        self
    }

    pub fn contains(&self, method: &str) -> bool {
        self.procedures.contains_key(method)
    }

    pub fn method_names(&self) -> impl Iterator<Item = &str> {
        self.procedures.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.procedures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.procedures.is_empty()
    }

    /// Answers one raw request. `Ok(None)` means the request was a
    /// notification and nothing must be written back.
    ///
    /// Besides a string `method`, the envelope must carry `"jsonrpc": "2.0"`.
    /// A request without it, or with another version, is answered with
    /// `Invalid Request`. So is an object that repeats a top-level member,
    /// and since no single id can be trusted then, that reply has a null id.
    /// The id is echoed back exactly as written, digits and escapes included.
    pub async fn handle(&self, raw: &[u8]) -> Result<Option<Vec<u8>>, DispatchError> {
        let text = match str::from_utf8(raw) {
            Ok(text) => text,
            Err(err) => {
                tracing::debug!(%err, "request is not UTF-8");
                return reply_error(None, ErrorCode::ParseError);
            }
        };
        if let Err(err) = serde_json::from_str::<IgnoredAny>(text) {
            tracing::debug!(%err, "unparsable request");
            return reply_error(None, ErrorCode::ParseError);
        }

        // Only the top-level members are looked at here; the procedure decodes
        // the full envelope itself.
        let envelope: Envelope = match serde_json::from_str(text) {
            Ok(envelope) => envelope,
            Err(err) => {
                tracing::debug!(%err, "malformed request envelope");
                return reply_error(None, ErrorCode::InvalidRequest);
            }
        };
        let id = envelope.id;

        let version = envelope.jsonrpc.and_then(decode_str);
        let method = envelope.method.and_then(decode_str);
        let (Some(JSONRPC_VERSION), Some(method)) = (version.as_deref(), method.as_deref())
        else {
            return reply_error(id, ErrorCode::InvalidRequest);
        };

        let Some(procedure) = self.procedures.get(method) else {
            tracing::debug!(method, "method not found");
            return match id {
                Some(id) => reply_error(Some(id), ErrorCode::MethodNotFound),
                None => Ok(None),
            };
        };

        tracing::debug!(method, notification = id.is_none(), "dispatching");
        let served = procedure.serve(raw).await;

        match (id, served) {
            (Some(_), Ok(reply)) => Ok(Some(reply)),
            (None, Ok(_)) => Ok(None),
            (Some(id), Err(err)) => {
                tracing::error!(method, %err, "procedure failed");
                reply_error(Some(id), err.code())
            }
            (None, Err(err)) => {
                tracing::warn!(method, %err, "notification failed");
                Ok(None)
            }
        }
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Router")
            .field("procedures", &self.procedures.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// The top-level members the router routes on, each kept as raw JSON text.
#[derive(Default)]
struct Envelope<'a> {
    jsonrpc: Option<&'a RawValue>,
    method: Option<&'a RawValue>,
    id: Option<&'a RawValue>,
}

impl<'de> Deserialize<'de> for Envelope<'de> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(EnvelopeVisitor)
    }
}

struct EnvelopeVisitor;

impl<'de> Visitor<'de> for EnvelopeVisitor {
    type Value = Envelope<'de>;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a JSON-RPC request object")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        let mut envelope = Envelope::default();
        let mut seen = HashSet::new();
        while let Some(key) = map.next_key::<String>()? {
            let value: &'de RawValue = map.next_value()?;
            match key.as_str() {
                "jsonrpc" => envelope.jsonrpc = Some(value),
                "method" => envelope.method = Some(value),
                "id" => envelope.id = Some(value),
                _ => {}
            }
            if !seen.insert(key) {
                return Err(de::Error::custom("duplicate member in request object"));
            }
        }
        Ok(envelope)
    }
}

fn decode_str(raw: &RawValue) -> Option<String> {
    serde_json::from_str(raw.get()).ok()
}

fn reply_error(
    id: Option<&RawValue>,
    code: ErrorCode,
) -> Result<Option<Vec<u8>>, DispatchError> {
    let response = Response::<(), _>::error(id, code.into());
    Ok(Some(serde_json::to_vec(&response)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Procedure;
    use serde::Deserialize;
    use std::{
        convert::Infallible,
        sync::atomic::{AtomicUsize, Ordering},
    };

    #[derive(Deserialize)]
    struct NamedSubtract {
        minuend: i64,
        subtrahend: i64,
    }

    fn router() -> Router {
        Router::new()
            .add_procedure(Procedure::bind("subtract", |(a, b): (i64, i64)| {
                Ok::<_, Infallible>(a - b)
            }))
            .add_procedure(Procedure::bind("named_subtract", |p: NamedSubtract| {
                Ok::<_, Infallible>(p.minuend - p.subtrahend)
            }))
            .add_procedure(Procedure::bind("fail", |_: Vec<i64>| {
                Err::<i64, _>("always fails")
            }))
    }

    async fn dispatch(router: &Router, raw: &str) -> Option<String> {
        router
            .handle(raw.as_bytes())
            .await
            .unwrap()
            .map(|body| String::from_utf8(body).unwrap())
    }

    #[tokio::test]
    async fn positional_params() {
        let router = router();
        assert_eq!(
            dispatch(&router, r#"{"jsonrpc": "2.0", "method": "subtract", "params": [42, 23], "id": 1}"#)
                .await
                .unwrap(),
            r#"{"jsonrpc":"2.0","result":19,"id":1}"#
        );
        assert_eq!(
            dispatch(&router, r#"{"jsonrpc": "2.0", "method": "subtract", "params": [23, 42], "id": 2}"#)
                .await
                .unwrap(),
            r#"{"jsonrpc":"2.0","result":-19,"id":2}"#
        );
    }

    #[tokio::test]
    async fn named_params() {
        let router = router();
        for raw in [
            r#"{"jsonrpc": "2.0", "method": "named_subtract", "params": {"subtrahend": 23, "minuend": 42}, "id": 3}"#,
            r#"{"jsonrpc": "2.0", "method": "named_subtract", "params": {"minuend": 42, "subtrahend": 23}, "id": 3}"#,
        ] {
            assert_eq!(
                dispatch(&router, raw).await.unwrap(),
                r#"{"jsonrpc":"2.0","result":19,"id":3}"#
            );
        }
    }

    #[tokio::test]
    async fn id_is_echoed_verbatim() {
        let router = router();
        let reply = dispatch(
            &router,
            r#"{"jsonrpc":"2.0","method":"subtract","params":[2,1],"id":"abc-7"}"#,
        )
        .await
        .unwrap();
        assert_eq!(reply, r#"{"jsonrpc":"2.0","result":1,"id":"abc-7"}"#);

        let reply = dispatch(
            &router,
            r#"{"jsonrpc":"2.0","method":"subtract","params":[2,1],"id":null}"#,
        )
        .await
        .unwrap();
        assert_eq!(reply, r#"{"jsonrpc":"2.0","result":1,"id":null}"#);
    }

    #[tokio::test]
    async fn id_text_survives_beyond_float_precision() {
        let router = router();
        for id in [
            "123456789012345678901234567890",
            "0.10000000000000000000000001",
            r#""caf\u00e9""#,
        ] {
            let ok = format!(r#"{{"jsonrpc":"2.0","method":"subtract","params":[1,1],"id":{id}}}"#);
            assert_eq!(
                dispatch(&router, &ok).await.unwrap(),
                format!(r#"{{"jsonrpc":"2.0","result":0,"id":{id}}}"#)
            );

            let missing = format!(r#"{{"jsonrpc":"2.0","method":"foobar","id":{id}}}"#);
            assert_eq!(
                dispatch(&router, &missing).await.unwrap(),
                format!(
                    r#"{{"jsonrpc":"2.0","error":{{"code":-32601,"message":"Method not found"}},"id":{id}}}"#
                )
            );
        }
    }

    #[tokio::test]
    async fn method_not_found() {
        let router = router();
        assert_eq!(
            dispatch(&router, r#"{"jsonrpc": "2.0", "method": "foobar", "id": "1"}"#)
                .await
                .unwrap(),
            r#"{"jsonrpc":"2.0","error":{"code":-32601,"message":"Method not found"},"id":"1"}"#
        );
    }

    #[tokio::test]
    async fn parse_error() {
        let router = router();
        assert_eq!(
            dispatch(&router, r#"{"jsonrpc": "2.0", "method": "foobar, "params": "bar", "baz]"#)
                .await
                .unwrap(),
            r#"{"jsonrpc":"2.0","error":{"code":-32700,"message":"Parse error"},"id":null}"#
        );
    }

    #[tokio::test]
    async fn invalid_request() {
        let router = router();
        assert_eq!(
            dispatch(&router, r#"{"jsonrpc": "2.0", "method": 1, "params": "bar", "id": 5}"#)
                .await
                .unwrap(),
            r#"{"jsonrpc":"2.0","error":{"code":-32600,"message":"Invalid Request"},"id":5}"#
        );
        // Answered even without an id, since it cannot be told apart from a
        // broken request.
        assert_eq!(
            dispatch(&router, r#"{"jsonrpc": "2.0", "params": [1]}"#)
                .await
                .unwrap(),
            r#"{"jsonrpc":"2.0","error":{"code":-32600,"message":"Invalid Request"},"id":null}"#
        );
        assert_eq!(
            dispatch(&router, r#"{"jsonrpc": "1.0", "method": "subtract", "params": [1, 2], "id": 6}"#)
                .await
                .unwrap(),
            r#"{"jsonrpc":"2.0","error":{"code":-32600,"message":"Invalid Request"},"id":6}"#
        );
        assert_eq!(
            dispatch(&router, r#"{"method": "subtract", "params": [42, 23], "id": 7}"#)
                .await
                .unwrap(),
            r#"{"jsonrpc":"2.0","error":{"code":-32600,"message":"Invalid Request"},"id":7}"#
        );
        assert_eq!(
            dispatch(&router, r#"[1, 2, 3]"#).await.unwrap(),
            r#"{"jsonrpc":"2.0","error":{"code":-32600,"message":"Invalid Request"},"id":null}"#
        );
    }

    #[tokio::test]
    async fn repeated_members_are_invalid() {
        let router = router();
        for raw in [
            r#"{"jsonrpc":"2.0","method":"nope","method":"subtract","params":[42,23],"id":1}"#,
            r#"{"jsonrpc":"2.0","method":"subtract","params":[1,2],"params":[42,23],"id":1}"#,
            r#"{"jsonrpc":"2.0","method":"subtract","params":[42,23],"id":1,"id":2}"#,
        ] {
            assert_eq!(
                dispatch(&router, raw).await.unwrap(),
                r#"{"jsonrpc":"2.0","error":{"code":-32600,"message":"Invalid Request"},"id":null}"#,
                "{raw}"
            );
        }
    }

    #[tokio::test]
    async fn invalid_utf8_is_a_parse_error() {
        let reply = router()
            .handle(b"{\"jsonrpc\":\"2.0\",\"method\":\"\xff\",\"id\":1}")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            reply,
            br#"{"jsonrpc":"2.0","error":{"code":-32700,"message":"Parse error"},"id":null}"#
        );
    }

    #[tokio::test]
    async fn invalid_params() {
        let router = router();
        assert_eq!(
            dispatch(&router, r#"{"jsonrpc":"2.0","method":"subtract","params":"nope","id":9}"#)
                .await
                .unwrap(),
            r#"{"jsonrpc":"2.0","error":{"code":-32602,"message":"Invalid params"},"id":9}"#
        );
    }

    #[tokio::test]
    async fn handler_failure_is_internal_error() {
        let router = router();
        assert_eq!(
            dispatch(&router, r#"{"jsonrpc":"2.0","method":"fail","params":[],"id":4}"#)
                .await
                .unwrap(),
            r#"{"jsonrpc":"2.0","error":{"code":-32603,"message":"Internal error"},"id":4}"#
        );
    }

    #[tokio::test]
    async fn notifications_never_reply() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let router = router().add_procedure(Procedure::bind("update", move |_: Vec<i64>| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<_, Infallible>(0)
        }));

        for raw in [
            r#"{"jsonrpc": "2.0", "method": "update", "params": [1,2,3,4,5]}"#,
            r#"{"jsonrpc": "2.0", "method": "fail", "params": [1]}"#,
            r#"{"jsonrpc": "2.0", "method": "subtract", "params": "bad"}"#,
            r#"{"jsonrpc": "2.0", "method": "foobar"}"#,
        ] {
            assert_eq!(dispatch(&router, raw).await, None, "{raw}");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn later_registration_wins() {
        let router = router().add_procedure(Procedure::bind("subtract", |(a, b): (i64, i64)| {
            Ok::<_, Infallible>(b - a)
        }));
        assert_eq!(router.len(), 3);
        assert_eq!(
            dispatch(&router, r#"{"jsonrpc":"2.0","method":"subtract","params":[42,23],"id":1}"#)
                .await
                .unwrap(),
            r#"{"jsonrpc":"2.0","result":-19,"id":1}"#
        );
    }

    #[test]
    fn keys_match_procedure_names() {
        let router = router();
        for name in router.method_names() {
            assert_eq!(router.procedures[name].name(), name);
        }
        assert!(router.contains("subtract"));
        assert!(!router.contains("foobar"));
        assert_eq!(
            router.method_names().collect::<Vec<_>>(),
            ["fail", "named_subtract", "subtract"]
        );
    }
}
