use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use http::HeaderMap;
use tonic::Status;
use tracing::{debug, info, warn};

use crate::config::TripleOptions;
use crate::error::{PathError, TripleServerError};
use crate::header::CallContext;
use crate::path::GrpcPath;
use crate::registry::Registry;
use crate::server::handler::{FnStreaming, MethodHandler, TypedUnary};
use crate::server::stream_map::{ServerStreamHandle, StreamMap};
use crate::stream::{ServerStream, StreamId};
use crate::user_stream::ServerUserStream;

/// Dispatches incoming calls to registered handlers.
pub struct TripleServer {
    registry: Arc<Registry>,
    options: TripleOptions,
    methods: HashMap<String, MethodHandler>,
    streams: Arc<StreamMap>,
}

impl TripleServer {
    pub fn new(registry: Arc<Registry>, options: TripleOptions) -> Self {
        Self {
            registry,
            options: options.with_defaults(),
            methods: HashMap::new(),
            streams: Arc::new(StreamMap::new()),
        }
    }

    /// Register a single request / single response method.
    ///
    /// # Example
    /// ```ignore
    /// server.register_unary::<HelloRequest, HelloReply, _, _>(
    ///     "greet.Greeter/SayHello",
    ///     |ctx, req| async move {
    ///         Ok(HelloReply { message: format!("hello {}", req.name) })
    ///     },
    /// )?;
    /// ```
    pub fn register_unary<Req, Resp, F, Fut>(
        &mut self,
        path: &str,
        handler: F,
    ) -> Result<(), PathError>
    where
        Req: prost::Message + Default + 'static,
        Resp: prost::Message + Default + 'static,
        F: Fn(CallContext, Req) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Resp, Status>> + Send + 'static,
    {
        let handler = TypedUnary::<Req, Resp, F>::new(handler);
        self.register(path, MethodHandler::Unary(Arc::new(handler)))
    }

    /// Register a bidirectional streaming method.
    pub fn register_streaming<F, Fut>(&mut self, path: &str, handler: F) -> Result<(), PathError>
    where
        F: Fn(ServerUserStream) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), Status>> + Send + 'static,
    {
        self.register(path, MethodHandler::Streaming(Arc::new(FnStreaming::new(handler))))
    }

    /// Register an already type-erased handler.
    pub fn register(&mut self, path: &str, handler: MethodHandler) -> Result<(), PathError> {
        let path = GrpcPath::parse(path)?.full_path();
        info!(path = %path, kind = ?handler.kind(), "Registered RPC method");
        self.methods.insert(path, handler);
        Ok(())
    }

    /// Start serving a call whose request headers just arrived.
    ///
    /// The returned handle keeps the stream registered; dropping it tears the
    /// stream down. On error the transport should answer with
    /// [`TripleServerError::to_status`].
    pub fn accept(
        &self,
        stream_id: StreamId,
        path: &str,
        headers: &HeaderMap,
    ) -> Result<ServerStreamHandle, TripleServerError> {
        let protocol = &self.options.protocol;
        let bridge = self.registry.header_bridge(protocol)?;
        let codec = self.registry.codec(protocol)?;
        let serializer = self.registry.serializer(&self.options.serializer)?;

        let handler = self.lookup(path).inspect_err(|e| {
            warn!(stream_id = %stream_id, path = %path, error = %e, "Rejecting call");
        })?;
        let header = bridge.read_request_header(stream_id, path, headers);

        let handle = self.streams.try_create(stream_id, || {
            ServerStream::start(header, handler, codec, serializer, bridge, &self.options)
        })?;
        debug!(stream_id = %stream_id, path = %path, "Accepted call");
        Ok(handle)
    }

    /// Find the handler for `path`: the exact method name first, then with
    /// its first letter upper-cased.
    fn lookup(&self, path: &str) -> Result<&MethodHandler, TripleServerError> {
        let parsed = GrpcPath::parse(path)?;
        self.methods
            .get(&parsed.full_path())
            .or_else(|| self.methods.get(&parsed.capitalized().full_path()))
            .ok_or_else(|| TripleServerError::NoHandler(parsed.full_path()))
    }

    /// The active stream with `id`, for transports that route frames by id.
    pub fn stream(&self, id: StreamId) -> Option<Arc<ServerStream>> {
        self.streams.get(id)
    }

    /// The number of calls being served.
    pub fn active_streams(&self) -> usize {
        self.streams.len()
    }

    /// Check whether a call to `path` would find a handler.
    pub fn has_method(&self, path: &str) -> bool {
        self.lookup(path).is_ok()
    }

    pub fn options(&self) -> &TripleOptions {
        &self.options
    }
}
