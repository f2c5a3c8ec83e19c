//! The calling side.

mod stream;

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use tracing::debug;
use url::Url;

use crate::codec::FrameCodec;
use crate::config::TripleOptions;
use crate::error::{PathError, RegistryError};
use crate::header::{CallContext, ConnectionParams, HeaderBridge};
use crate::path::GrpcPath;
use crate::registry::Registry;
use crate::serializer::Serializer;
use crate::stream::StreamId;
use crate::user_stream::{Channel, ClientUserStream};

pub use stream::ClientStream;

/// A started call: the user-facing stream and the transport-facing one.
pub struct ClientCall {
    pub stream: ClientUserStream,
    pub transport: Arc<ClientStream>,
}

/// Starts calls against one service.
///
/// The frame codec and header bridge are picked by the connection's
/// protocol, the serializer by [`TripleOptions::serializer`].
pub struct TripleClient {
    params: ConnectionParams,
    options: TripleOptions,
    codec: Arc<dyn FrameCodec>,
    bridge: Arc<dyn HeaderBridge>,
    serializer: Arc<dyn Serializer>,
    // client-initiated streams use odd ids
    next_stream_id: AtomicU32,
}

impl TripleClient {
    pub fn new(
        registry: &Registry,
        params: ConnectionParams,
        options: TripleOptions,
    ) -> Result<Self, RegistryError> {
        let options = options.with_defaults();
        Ok(Self {
            codec: registry.codec(&params.protocol)?,
            bridge: registry.header_bridge(&params.protocol)?,
            serializer: registry.serializer(&options.serializer)?,
            params,
            options,
            next_stream_id: AtomicU32::new(1),
        })
    }

    /// Connect to the service named by a URL such as
    /// `tri://127.0.0.1:20000/greet.Greeter?version=1.0.0`.
    pub fn from_url(
        registry: &Registry,
        url: &Url,
        options: TripleOptions,
    ) -> Result<Self, RegistryError> {
        Self::new(registry, ConnectionParams::from_url(url), options)
    }

    pub fn params(&self) -> &ConnectionParams {
        &self.params
    }

    /// Start a call to `path` (`/pkg.Service/Method`), with request headers
    /// built from the connection parameters and `ctx`.
    pub fn start_call(&self, path: &str, ctx: &CallContext) -> Result<ClientCall, PathError> {
        let path = GrpcPath::parse(path)?;
        let stream_id = StreamId::from(self.next_stream_id.fetch_add(2, Ordering::Relaxed));
        let headers = self.bridge.write_request_headers(&self.params, ctx);

        let transport = Arc::new(ClientStream::new(
            stream_id,
            format!("/{}", path.full_path()),
            headers,
            Arc::clone(&self.codec),
            Arc::clone(&self.bridge),
            self.options.buffer_size,
        ));
        let channel = Channel {
            core: transport.core(),
            codec: Arc::clone(&self.codec),
            serializer: Arc::clone(&self.serializer),
        };
        let stream = ClientUserStream::new(channel, Arc::clone(&transport), self.options.timeout);

        debug!(stream_id = %stream_id, path = %transport.path(), "Call started");
        Ok(ClientCall { stream, transport })
    }
}
