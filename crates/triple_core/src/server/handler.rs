use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use futures::future::{self, BoxFuture, FutureExt};
use tonic::Status;

use crate::header::CallContext;
use crate::serializer::ProtoMessage;
use crate::user_stream::ServerUserStream;

/// A type-erased single request / single response handler.
///
/// The unary processor owns decoding and encoding; the handler only sees
/// messages.
pub trait UnaryHandler: Send + Sync + 'static {
    /// An empty request message to decode into.
    fn new_request(&self) -> Box<dyn ProtoMessage>;

    fn invoke(
        &self,
        ctx: CallContext,
        request: Box<dyn ProtoMessage>,
    ) -> BoxFuture<'static, Result<Box<dyn ProtoMessage>, Status>>;
}

/// A type-erased handler driving a bidirectional stream for the whole call.
pub trait StreamingHandler: Send + Sync + 'static {
    fn call(&self, stream: ServerUserStream) -> BoxFuture<'static, Result<(), Status>>;
}

/// What a registered method does, which also selects its processor.
#[derive(Clone)]
pub enum MethodHandler {
    Unary(Arc<dyn UnaryHandler>),
    Streaming(Arc<dyn StreamingHandler>),
}

impl MethodHandler {
    pub fn kind(&self) -> MethodKind {
        match self {
            MethodHandler::Unary(_) => MethodKind::Unary,
            MethodHandler::Streaming(_) => MethodKind::Streaming,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodKind {
    Unary,
    Streaming,
}

/// A typed unary handler wrapping an async function.
pub(crate) struct TypedUnary<Req, Resp, F> {
    f: F,
    _marker: PhantomData<fn(Req) -> Resp>,
}

impl<Req, Resp, F> TypedUnary<Req, Resp, F> {
    pub fn new(f: F) -> Self {
        Self {
            f,
            _marker: PhantomData,
        }
    }
}

impl<Req, Resp, F, Fut> UnaryHandler for TypedUnary<Req, Resp, F>
where
    Req: prost::Message + Default + 'static,
    Resp: prost::Message + Default + 'static,
    F: Fn(CallContext, Req) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Resp, Status>> + Send + 'static,
{
    fn new_request(&self) -> Box<dyn ProtoMessage> {
        Box::new(Req::default())
    }

    fn invoke(
        &self,
        ctx: CallContext,
        request: Box<dyn ProtoMessage>,
    ) -> BoxFuture<'static, Result<Box<dyn ProtoMessage>, Status>> {
        let request = match request.into_any().downcast::<Req>() {
            Ok(request) => *request,
            Err(_) => return future::ready(Err(Status::internal("request type mismatch"))).boxed(),
        };
        let reply = (self.f)(ctx, request);
        async move { reply.await.map(|r| Box::new(r) as Box<dyn ProtoMessage>) }.boxed()
    }
}

/// A streaming handler wrapping an async function.
pub(crate) struct FnStreaming<F> {
    f: F,
}

impl<F> FnStreaming<F> {
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F, Fut> StreamingHandler for FnStreaming<F>
where
    F: Fn(ServerUserStream) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), Status>> + Send + 'static,
{
    fn call(&self, stream: ServerUserStream) -> BoxFuture<'static, Result<(), Status>> {
        (self.f)(stream).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, PartialEq, prost::Message)]
    struct Ping {
        #[prost(uint32, tag = "1")]
        seq: u32,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    struct Other {
        #[prost(string, tag = "1")]
        name: String,
    }

    fn echo_handler()
    -> TypedUnary<Ping, Ping, impl Fn(CallContext, Ping) -> future::Ready<Result<Ping, Status>>>
    {
        TypedUnary::new(|_ctx: CallContext, req: Ping| future::ready(Ok(Ping { seq: req.seq + 1 })))
    }

    #[tokio::test]
    async fn test_typed_unary_invoke() {
        let handler = echo_handler();
        let reply = handler
            .invoke(CallContext::default(), Box::new(Ping { seq: 41 }))
            .await
            .unwrap();
        let reply = reply.into_any().downcast::<Ping>().unwrap();
        assert_eq!(reply.seq, 42);
    }

    #[tokio::test]
    async fn test_typed_unary_rejects_wrong_type() {
        let handler = echo_handler();
        let err = handler
            .invoke(CallContext::default(), Box::new(Other::default()))
            .await
            .err()
            .unwrap();
        assert_eq!(err.code(), tonic::Code::Internal);
    }

    #[test]
    fn test_method_kind() {
        let handler = MethodHandler::Unary(Arc::new(echo_handler()));
        assert_eq!(handler.kind(), MethodKind::Unary);
    }
}
