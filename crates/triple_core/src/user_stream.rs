//! The send/receive contract application code sees.
//!
//! [`ServerUserStream`] is handed to streaming handlers; [`ClientUserStream`]
//! is the caller's end of a call started by
//! [`TripleClient`](crate::client::TripleClient).

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use async_stream::stream;
use bytes::Bytes;
use futures::Stream;
use http::HeaderMap;
use tonic::{Code, Status};

use crate::client::ClientStream;
use crate::codec::FrameCodec;
use crate::error::{ReassemblyError, StreamError};
use crate::header::CallContext;
use crate::serializer::{ProtoMessage, Serializer};
use crate::stream::{Message, StreamCore};

/// Message encoding shared by both roles.
#[derive(Clone)]
pub(crate) struct Channel {
    pub core: Arc<StreamCore>,
    pub codec: Arc<dyn FrameCodec>,
    pub serializer: Arc<dyn Serializer>,
}

impl Channel {
    /// Marshal, frame and hand one message to the send queue.
    pub async fn send(&self, msg: &dyn ProtoMessage) -> Result<(), StreamError> {
        let payload = self.serializer.marshal(msg)?;
        let framed = self.codec.encode(&payload);
        self.core.put_send(Message::Data(framed)).await?;
        Ok(())
    }

    pub fn decode(&self, framed: &[u8], msg: &mut dyn ProtoMessage) -> Result<(), StreamError> {
        let (payload, _) = self
            .codec
            .decode_header(framed)
            .map_err(ReassemblyError::from)?;
        self.serializer.unmarshal(&payload, msg)?;
        Ok(())
    }
}

/// Decoded messages received on a user stream.
///
/// Ends when the peer finishes sending; a failure is yielded once and ends
/// the stream.
pub struct Inbound<M> {
    inner: Pin<Box<dyn Stream<Item = Result<M, StreamError>> + Send>>,
}

impl<M> Stream for Inbound<M> {
    type Item = Result<M, StreamError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

/// The server end of a streaming call.
#[derive(Clone)]
pub struct ServerUserStream {
    channel: Channel,
    ctx: Arc<CallContext>,
}

impl ServerUserStream {
    pub(crate) fn new(channel: Channel, ctx: CallContext) -> Self {
        Self {
            channel,
            ctx: Arc::new(ctx),
        }
    }

    /// The caller's context, read from the request headers.
    pub fn context(&self) -> &CallContext {
        &self.ctx
    }

    /// Send one message to the client. The first message commits the
    /// response headers.
    pub async fn send_msg<M: ProtoMessage>(&self, msg: &M) -> Result<(), StreamError> {
        self.channel.core.metadata().header_sent = true;
        self.channel.send(msg).await
    }

    /// Receive the next message into `msg`.
    ///
    /// Fails with [`StreamError::Closed`] once the client has finished
    /// sending.
    pub async fn recv_msg<M: ProtoMessage>(&self, msg: &mut M) -> Result<(), StreamError> {
        match self.channel.core.get_recv().await {
            Some(Message::Data(framed)) => self.channel.decode(&framed, msg),
            Some(Message::Close(_)) | None => Err(StreamError::Closed),
        }
    }

    /// Adapt [`recv_msg`](Self::recv_msg) into a stream of messages.
    pub fn inbound<M: ProtoMessage + Default>(&self) -> Inbound<M> {
        let this = self.clone();
        let inner = stream! {
            loop {
                let mut msg = M::default();
                match this.recv_msg(&mut msg).await {
                    Ok(()) => yield Ok(msg),
                    Err(StreamError::Closed) => break,
                    Err(e) => {
                        yield Err(e);
                        break;
                    }
                }
            }
        };
        Inbound {
            inner: Box::pin(inner),
        }
    }

    /// Add response headers. Fails once the headers were sent.
    pub fn set_header(&self, headers: HeaderMap) -> Result<(), StreamError> {
        let mut metadata = self.channel.core.metadata();
        if metadata.header_sent {
            return Err(StreamError::HeadersSent);
        }
        metadata.header.extend(headers);
        Ok(())
    }

    /// Add response headers and commit them.
    pub fn send_header(&self, headers: HeaderMap) -> Result<(), StreamError> {
        let mut metadata = self.channel.core.metadata();
        if metadata.header_sent {
            return Err(StreamError::HeadersSent);
        }
        metadata.header.extend(headers);
        metadata.header_sent = true;
        Ok(())
    }

    /// Add trailers, sent after the handler returns.
    pub fn set_trailer(&self, trailers: HeaderMap) {
        self.channel.core.metadata().trailer.extend(trailers);
    }
}

/// The client end of a call.
#[derive(Clone)]
pub struct ClientUserStream {
    channel: Channel,
    transport: Arc<ClientStream>,
    timeout: Duration,
}

impl ClientUserStream {
    pub(crate) fn new(channel: Channel, transport: Arc<ClientStream>, timeout: Duration) -> Self {
        Self {
            channel,
            transport,
            timeout,
        }
    }

    /// Send one request. Fails with the call's status if the server already
    /// finished it.
    pub async fn send_msg<M: ProtoMessage>(&self, msg: &M) -> Result<(), StreamError> {
        match self.channel.send(msg).await {
            Err(StreamError::Closed) => Err(self.finished()),
            other => other,
        }
    }

    /// Receive the next reply into `msg`.
    ///
    /// Once the server has finished, fails with the call's status if it is
    /// not OK and with [`StreamError::Closed`] otherwise.
    pub async fn recv_msg<M: ProtoMessage>(&self, msg: &mut M) -> Result<(), StreamError> {
        match self.next().await? {
            Some(framed) => self.channel.decode(&framed, msg),
            None => Err(self.finished()),
        }
    }

    /// Adapt [`recv_msg`](Self::recv_msg) into a stream of replies.
    pub fn inbound<M: ProtoMessage + Default>(&self) -> Inbound<M> {
        let this = self.clone();
        let inner = stream! {
            loop {
                let mut msg = M::default();
                match this.recv_msg(&mut msg).await {
                    Ok(()) => yield Ok(msg),
                    Err(StreamError::Closed) => break,
                    Err(e) => {
                        yield Err(e);
                        break;
                    }
                }
            }
        };
        Inbound {
            inner: Box::pin(inner),
        }
    }

    /// Signal that no more requests will be sent.
    pub fn close_send(&self) {
        self.channel.core.close_send();
    }

    /// Response headers received from the server.
    pub fn header(&self) -> HeaderMap {
        self.channel.core.metadata().header.clone()
    }

    /// Trailers received from the server, empty until the call finished.
    pub fn trailer(&self) -> HeaderMap {
        self.channel.core.metadata().trailer.clone()
    }

    /// The call's final status, once the trailers arrived.
    pub fn status(&self) -> Option<Status> {
        self.transport.status()
    }

    /// Send a single request and wait for the single reply and the status.
    pub async fn unary<Req, Resp>(&self, request: &Req) -> Result<Resp, Status>
    where
        Req: ProtoMessage,
        Resp: ProtoMessage + Default,
    {
        self.send_msg(request).await?;
        self.close_send();

        let mut reply = Resp::default();
        let replied = match self.recv_msg(&mut reply).await {
            Ok(()) => {
                // drain to the trailers
                while self.next().await?.is_some() {}
                true
            }
            // an empty reply never arrives as a message
            Err(StreamError::Closed) => self.channel.core.saw_empty_message(),
            Err(e) => return Err(e.into()),
        };
        match self.transport.status() {
            Some(status) if status.code() != Code::Ok => Err(status),
            Some(_) if replied => Ok(reply),
            Some(_) => Err(Status::internal("call finished without a reply")),
            None => Err(Status::cancelled("stream closed before the call finished")),
        }
    }

    async fn next(&self) -> Result<Option<Bytes>, StreamError> {
        let next = tokio::time::timeout(self.timeout, self.channel.core.get_recv())
            .await
            .map_err(|_| StreamError::Timeout)?;
        match next {
            Some(Message::Data(framed)) => Ok(Some(framed)),
            Some(Message::Close(_)) | None => Ok(None),
        }
    }

    fn finished(&self) -> StreamError {
        match self.transport.status() {
            Some(status) if status.code() != Code::Ok => StreamError::Status(status),
            _ => StreamError::Closed,
        }
    }
}
