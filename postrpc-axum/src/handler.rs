//! The handler entry: one RPC method bound to an implementation and a
//! configuration record.
//!
//! An [`RpcHandler`] is constructed once at service wiring time and shared
//! read-only across requests. It exposes a single operation — serve one
//! HTTP request — plus adapters for mounting into an axum router.

use std::collections::BTreeSet;
use std::convert::Infallible;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context as TaskContext, Poll};

use axum::extract::Request;
use axum::response::Response;
use axum::routing::MethodRouter;
use futures::future::BoxFuture;
use prost::Message;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tower::Service;
use postrpc_core::StatusError;

use crate::context::{Compression, HandlerConfig, RpcContext};

/// The boxed unary invocation boundary: `(ctx, msg) -> (msg, err)`.
pub(crate) type UnaryFn<Req, Resp> =
    Arc<dyn Fn(RpcContext, Req) -> BoxFuture<'static, Result<Resp, StatusError>> + Send + Sync>;

/// Raw binary-mode escape hatch.
///
/// Receives the request (with an [`RpcContext`] installed in its
/// extensions) plus the negotiated request and response compressions, and
/// produces the complete response itself, bypassing unary framing.
pub type RawBinaryFn =
    Arc<dyn Fn(Request, Compression, Compression) -> BoxFuture<'static, Response> + Send + Sync>;

/// Collects registered method names for introspection.
///
/// Opaque to the dispatch engine; handlers push their fully-qualified
/// method name here at construction when configured with one.
#[derive(Debug, Default)]
pub struct Registrar {
    methods: Mutex<BTreeSet<String>>,
}

impl Registrar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a fully-qualified method name.
    pub fn register(&self, method: &str) {
        self.methods
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(method.to_string());
    }

    /// The registered method names, sorted.
    pub fn methods(&self) -> Vec<String> {
        self.methods
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }
}

/// The server-side entry for a single RPC method.
///
/// Binds a fully-qualified method name to a typed implementation and a
/// [`HandlerConfig`]. Cloning is cheap and clones share the same
/// implementation; the entry is safe to use concurrently since dispatch
/// never mutates it.
pub struct RpcHandler<Req, Resp> {
    pub(crate) method: Arc<str>,
    pub(crate) config: HandlerConfig,
    pub(crate) implementation: UnaryFn<Req, Resp>,
    pub(crate) raw_binary: Option<RawBinaryFn>,
}

impl<Req, Resp> Clone for RpcHandler<Req, Resp> {
    fn clone(&self) -> Self {
        Self {
            method: self.method.clone(),
            config: self.config.clone(),
            implementation: self.implementation.clone(),
            raw_binary: self.raw_binary.clone(),
        }
    }
}

impl<Req, Resp> RpcHandler<Req, Resp>
where
    Req: Message + DeserializeOwned + Default + Send + Sync + 'static,
    Resp: Message + Serialize + Send + Sync + 'static,
{
    /// Construct a handler for a fully-qualified method name.
    ///
    /// If the config carries a registrar, the method name is registered
    /// synchronously here.
    pub fn new<F, Fut>(method: impl Into<Arc<str>>, config: HandlerConfig, implementation: F) -> Self
    where
        F: Fn(RpcContext, Req) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Resp, StatusError>> + Send + 'static,
    {
        let method = method.into();
        if let Some(registrar) = config.registrar_value() {
            registrar.register(&method);
        }
        Self {
            method,
            config,
            implementation: Arc::new(move |ctx, req| Box::pin(implementation(ctx, req))),
            raw_binary: None,
        }
    }

    /// Install the raw binary-mode escape hatch.
    pub fn with_raw_binary(mut self, raw: RawBinaryFn) -> Self {
        self.raw_binary = Some(raw);
        self
    }

    /// The fully-qualified method name this handler serves.
    pub fn method(&self) -> &str {
        &self.method
    }

    /// The handler's configuration.
    pub fn config(&self) -> &HandlerConfig {
        &self.config
    }

    /// Mount this handler as an axum method router.
    ///
    /// Routes every HTTP method so the handler's own method gate can
    /// answer non-POST requests with 405.
    pub fn into_method_router(self) -> MethodRouter {
        axum::routing::any_service(self)
    }
}

impl<Req, Resp> Service<Request> for RpcHandler<Req, Resp>
where
    Req: Message + DeserializeOwned + Default + Send + Sync + 'static,
    Resp: Message + Serialize + Send + Sync + 'static,
{
    type Response = Response;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Response, Infallible>>;

    fn poll_ready(&mut self, _cx: &mut TaskContext<'_>) -> Poll<Result<(), Infallible>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request) -> Self::Future {
        let handler = self.clone();
        Box::pin(async move { Ok(handler.serve(req).await) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, PartialEq, ::prost::Message, serde::Serialize, serde::Deserialize)]
    struct Empty {}

    fn noop_handler(config: HandlerConfig) -> RpcHandler<Empty, Empty> {
        RpcHandler::new("test.v1.Test/Noop", config, |_ctx, _req: Empty| async move {
            Ok(Empty {})
        })
    }

    #[test]
    fn test_registrar_collects_methods() {
        let registrar = Arc::new(Registrar::new());
        registrar.register("test.v1.Test/B");
        registrar.register("test.v1.Test/A");
        registrar.register("test.v1.Test/B");
        assert_eq!(
            registrar.methods(),
            vec!["test.v1.Test/A".to_string(), "test.v1.Test/B".to_string()]
        );
    }

    #[test]
    fn test_handler_registers_at_construction() {
        let registrar = Arc::new(Registrar::new());
        let _handler = noop_handler(HandlerConfig::default().registrar(registrar.clone()));
        assert_eq!(registrar.methods(), vec!["test.v1.Test/Noop".to_string()]);
    }

    #[test]
    fn test_clone_shares_method_name() {
        let handler = noop_handler(HandlerConfig::default());
        let clone = handler.clone();
        assert_eq!(handler.method(), clone.method());
    }
}
