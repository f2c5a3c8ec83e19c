use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use http::HeaderMap;
use http::header::HeaderValue;
use tonic::Status;
use tracing::debug;

use super::{Message, StreamCore, StreamId, StreamState};
use crate::codec::FrameCodec;
use crate::config::TripleOptions;
use crate::error::StreamError;
use crate::header::{CONTENT_TYPE, GRPC_CONTENT_TYPE, HeaderBridge, ProtocolHeader};
use crate::processor::{Call, CloseSignal, Processor};
use crate::serializer::Serializer;
use crate::server::handler::MethodHandler;
use crate::user_stream::Channel;

/// The server side of one call, as seen by the transport.
///
/// The transport feeds request chunks through [`put_chunk`](Self::put_chunk)
/// and drains responses from [`next_outbound`](Self::next_outbound) until the
/// terminal [`Message::Close`], which it renders with
/// [`trailers`](Self::trailers).
pub struct ServerStream {
    core: Arc<StreamCore>,
    header: ProtocolHeader,
    bridge: Arc<dyn HeaderBridge>,
    processor: Mutex<Option<Processor>>,
    closed: AtomicBool,
}

impl ServerStream {
    /// Create the stream, bind the processor matching `handler` and start it.
    pub(crate) fn start(
        header: ProtocolHeader,
        handler: &MethodHandler,
        codec: Arc<dyn FrameCodec>,
        serializer: Arc<dyn Serializer>,
        bridge: Arc<dyn HeaderBridge>,
        options: &TripleOptions,
    ) -> Self {
        let core = Arc::new(StreamCore::new(
            header.stream_id,
            Arc::clone(&codec),
            options.buffer_size,
        ));
        let call = Call {
            channel: Channel {
                core: Arc::clone(&core),
                codec,
                serializer,
            },
            ctx: header.call_context(),
            close: CloseSignal::new(),
        };
        let processor = Processor::new(handler, call, options.timeout);
        processor.run_rpc();

        debug!(
            stream_id = %header.stream_id,
            path = %header.path,
            kind = ?processor.kind(),
            "Server stream started"
        );

        Self {
            core,
            header,
            bridge,
            processor: Mutex::new(Some(processor)),
            closed: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> StreamId {
        self.core.id()
    }

    pub fn header(&self) -> &ProtocolHeader {
        &self.header
    }

    pub fn state(&self) -> StreamState {
        self.core.state()
    }

    /// Feed one chunk of request data. A protocol violation closes the
    /// stream: the processor is cancelled before its queues close, so it
    /// never mistakes the violation for the end of the requests.
    pub async fn put_chunk(&self, chunk: &[u8]) -> Result<(), StreamError> {
        match self.core.put_chunk(chunk).await {
            Err(e @ StreamError::Protocol(_)) => {
                self.close();
                Err(e)
            }
            other => other,
        }
    }

    /// Record an end-of-stream event from either side.
    pub fn on_end_stream(&self) -> StreamState {
        self.core.on_end_stream()
    }

    /// The client finished sending requests.
    pub fn close_recv(&self) {
        self.core.close_recv();
    }

    /// The next message to write to the network. `None` once the terminal
    /// status has been taken or the stream is closed.
    pub async fn next_outbound(&self) -> Option<Message> {
        self.core.get_send().await
    }

    /// Response headers to send ahead of the first message. Commits them:
    /// handlers can no longer change them.
    pub fn response_headers(&self) -> HeaderMap {
        let mut metadata = self.core.metadata();
        metadata.header_sent = true;

        let mut headers = metadata.header.clone();
        headers
            .entry(CONTENT_TYPE)
            .or_insert(HeaderValue::from_static(GRPC_CONTENT_TYPE));
        headers
    }

    /// Trailers ending the call with `status`, followed by any the handler
    /// set.
    pub fn trailers(&self, status: &Status) -> HeaderMap {
        let mut trailers = self.bridge.write_trailers(status);
        let metadata = self.core.metadata();
        for (name, value) in metadata.trailer.iter() {
            if !trailers.contains_key(name) {
                trailers.append(name.clone(), value.clone());
            }
        }
        trailers
    }

    /// Tear the stream down: fire the processor's close signal, release the
    /// processor and close both queues. Only the first call has an effect.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        let processor = self
            .processor
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(processor) = processor {
            processor.close();
        }
        self.core.close_queues();

        debug!(stream_id = %self.id(), "Server stream closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl Drop for ServerStream {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{GrpcFrameCodec, PREFIX_LEN};
    use crate::header::{CallContext, TRAILER_GRPC_STATUS, TripleHeaderBridge};
    use crate::serializer::ProtobufSerializer;
    use crate::server::handler::{FnStreaming, TypedUnary};
    use crate::user_stream::ServerUserStream;
    use std::sync::atomic::AtomicUsize;
    use tonic::Code;

    #[derive(Clone, PartialEq, prost::Message)]
    struct Text {
        #[prost(string, tag = "1")]
        value: String,
    }

    fn start(handler: MethodHandler) -> ServerStream {
        let header = ProtocolHeader {
            stream_id: StreamId::from(3),
            path: "/test.Echo/Say".into(),
            ..Default::default()
        };
        ServerStream::start(
            header,
            &handler,
            Arc::new(GrpcFrameCodec),
            Arc::new(ProtobufSerializer),
            Arc::new(TripleHeaderBridge),
            &TripleOptions::default(),
        )
    }

    fn upper() -> MethodHandler {
        MethodHandler::Unary(Arc::new(TypedUnary::<Text, Text, _>::new(
            |_ctx: CallContext, req: Text| async move {
                Ok::<_, Status>(Text {
                    value: req.value.to_uppercase(),
                })
            },
        )))
    }

    #[tokio::test]
    async fn test_unary_call_in_chunks() {
        let stream = start(upper());
        let request = Text {
            value: "hello".into(),
        };
        let framed = GrpcFrameCodec.encode(&ProtobufSerializer.marshal(&request).unwrap());

        let (head, rest) = framed.split_at(PREFIX_LEN);
        stream.put_chunk(head).await.unwrap();
        for chunk in rest.chunks(3) {
            stream.put_chunk(chunk).await.unwrap();
        }
        stream.close_recv();
        assert_eq!(stream.on_end_stream(), StreamState::HalfClosed);

        let Some(Message::Data(reply)) = stream.next_outbound().await else {
            panic!("expected a reply");
        };
        let (payload, _) = GrpcFrameCodec.decode_header(&reply).unwrap();
        let mut text = Text::default();
        ProtobufSerializer.unmarshal(&payload, &mut text).unwrap();
        assert_eq!(text.value, "HELLO");

        let Some(Message::Close(status)) = stream.next_outbound().await else {
            panic!("expected the status");
        };
        assert_eq!(status.code(), Code::Ok);
        assert!(stream.next_outbound().await.is_none());

        let trailers = stream.trailers(&status);
        assert_eq!(trailers[TRAILER_GRPC_STATUS], "0");
        assert_eq!(stream.on_end_stream(), StreamState::Closed);
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_cancels() {
        let stream = start(upper());
        stream.close();
        stream.close();
        assert!(stream.is_closed());

        // queues are closed, so the cancelled status cannot be observed
        assert!(stream.next_outbound().await.is_none());
        assert!(stream.put_chunk(&GrpcFrameCodec.encode(b"x")).await.is_err());
    }

    #[tokio::test]
    async fn test_protocol_violation_closes_stream() {
        let stream = start(upper());
        let err = stream.put_chunk(&[0, 0, 0, 0, 1, 1, 2]).await.unwrap_err();
        assert!(matches!(err, StreamError::Protocol(_)));
        assert!(stream.is_closed());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_protocol_violation_never_dispatches() {
        let invoked = Arc::new(AtomicUsize::new(0));
        let handler = {
            let invoked = Arc::clone(&invoked);
            MethodHandler::Unary(Arc::new(TypedUnary::<Text, Text, _>::new(
                move |_ctx: CallContext, req: Text| {
                    invoked.fetch_add(1, Ordering::SeqCst);
                    async move { Ok::<_, Status>(req) }
                },
            )))
        };

        let mut streams = Vec::new();
        for _ in 0..300 {
            let stream = start(handler.clone());
            // declares one byte, carries three
            let err = stream.put_chunk(&[0, 0, 0, 0, 1, 9, 9, 9]).await.unwrap_err();
            assert!(matches!(err, StreamError::Protocol(_)));
            streams.push(stream);
        }

        // let every processor run to completion
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        assert_eq!(invoked.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_handler_metadata() {
        let handler = MethodHandler::Streaming(Arc::new(FnStreaming::new(
            |stream: ServerUserStream| async move {
                let mut headers = HeaderMap::new();
                headers.insert("x-served-by", HeaderValue::from_static("unit"));
                stream.set_header(headers).map_err(Status::from)?;

                stream
                    .send_msg(&Text {
                        value: "first".into(),
                    })
                    .await
                    .map_err(Status::from)?;
                assert!(matches!(
                    stream.set_header(HeaderMap::new()),
                    Err(StreamError::HeadersSent)
                ));

                let mut trailers = HeaderMap::new();
                trailers.insert("x-checksum", HeaderValue::from_static("abc"));
                stream.set_trailer(trailers);
                Ok::<_, Status>(())
            },
        )));
        let stream = start(handler);

        assert!(matches!(stream.next_outbound().await, Some(Message::Data(_))));
        let headers = stream.response_headers();
        assert_eq!(headers["x-served-by"], "unit");
        assert_eq!(headers[CONTENT_TYPE], GRPC_CONTENT_TYPE);

        let Some(Message::Close(status)) = stream.next_outbound().await else {
            panic!("expected the status");
        };
        let trailers = stream.trailers(&status);
        assert_eq!(trailers[TRAILER_GRPC_STATUS], "0");
        assert_eq!(trailers["x-checksum"], "abc");
    }
}
