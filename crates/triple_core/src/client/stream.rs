use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use http::HeaderMap;
use tonic::Status;
use tracing::debug;

use crate::codec::FrameCodec;
use crate::error::StreamError;
use crate::header::{HeaderBridge, ProtocolHeader};
use crate::stream::{Message, StreamCore, StreamId, StreamState};

/// The client side of one call, as seen by the transport.
///
/// The transport sends [`request_headers`](Self::request_headers), drains
/// requests from [`next_outbound`](Self::next_outbound) (`None` means
/// END_STREAM), and feeds back response headers, data chunks and trailers.
pub struct ClientStream {
    core: Arc<StreamCore>,
    path: String,
    request_headers: HeaderMap,
    bridge: Arc<dyn HeaderBridge>,
    /// Observed grpc-status and grpc-message.
    header: Mutex<ProtocolHeader>,
    closed: AtomicBool,
}

impl ClientStream {
    pub(crate) fn new(
        stream_id: StreamId,
        path: String,
        request_headers: HeaderMap,
        codec: Arc<dyn FrameCodec>,
        bridge: Arc<dyn HeaderBridge>,
        buffer_size: usize,
    ) -> Self {
        Self {
            core: Arc::new(StreamCore::new(stream_id, codec, buffer_size)),
            header: Mutex::new(ProtocolHeader {
                stream_id,
                path: path.clone(),
                ..Default::default()
            }),
            path,
            request_headers,
            bridge,
            closed: AtomicBool::new(false),
        }
    }

    pub(crate) fn core(&self) -> Arc<StreamCore> {
        Arc::clone(&self.core)
    }

    pub fn id(&self) -> StreamId {
        self.core.id()
    }

    /// The `:path` of the call, e.g. `/greet.Greeter/SayHello`.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn request_headers(&self) -> &HeaderMap {
        &self.request_headers
    }

    pub fn state(&self) -> StreamState {
        self.core.state()
    }

    /// Feed one chunk of response data.
    pub async fn put_chunk(&self, chunk: &[u8]) -> Result<(), StreamError> {
        match self.core.put_chunk(chunk).await {
            Err(e @ StreamError::Protocol(_)) => {
                self.close();
                Err(e)
            }
            other => other,
        }
    }

    pub fn on_response_headers(&self, headers: HeaderMap) {
        self.core.metadata().header.extend(headers);
    }

    /// Record the trailers ending the call. No more replies will arrive.
    pub fn on_trailers(&self, trailers: HeaderMap) {
        let status = self.bridge.read_trailers(&trailers);
        {
            let mut header = self.observed();
            header.grpc_status = (status.code() as i32).to_string();
            header.grpc_message = status.message().to_string();
        }
        self.core.metadata().trailer = trailers;

        debug!(stream_id = %self.id(), code = ?status.code(), "Call finished");
        self.core.close_recv();
        self.core.on_end_stream();
    }

    pub fn on_end_stream(&self) -> StreamState {
        self.core.on_end_stream()
    }

    /// The next request message to write. `None` once the caller closed the
    /// send side.
    pub async fn next_outbound(&self) -> Option<Message> {
        self.core.get_send().await
    }

    /// The call's status, once the trailers arrived.
    pub fn status(&self) -> Option<Status> {
        self.observed().status()
    }

    /// Close both queues. Only the first call has an effect.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.core.close_queues();
        debug!(stream_id = %self.id(), "Client stream closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn observed(&self) -> MutexGuard<'_, ProtocolHeader> {
        self.header
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for ClientStream {
    fn drop(&mut self) {
        self.close();
    }
}
