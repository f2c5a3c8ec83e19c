use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::FutureExt;
use tonic::Status;
use tracing::error;

use super::{Call, Wake, finish, ok, panic_message};
use crate::server::handler::UnaryHandler;
use crate::stream::Message;

/// Decodes one request, invokes the handler and encodes its reply.
#[derive(Clone)]
pub struct UnaryProcessor {
    pub(super) call: Call,
    handler: Arc<dyn UnaryHandler>,
    timeout: Duration,
}

impl UnaryProcessor {
    pub(crate) fn new(call: Call, handler: Arc<dyn UnaryHandler>, timeout: Duration) -> Self {
        Self {
            call,
            handler,
            timeout,
        }
    }

    pub(super) async fn serve(self) {
        let core = &self.call.channel.core;

        let status = match AssertUnwindSafe(self.process()).catch_unwind().await {
            Ok(Ok(reply)) => match core.put_send(Message::Data(reply)).await {
                Ok(()) => ok(),
                Err(_) => Status::cancelled("stream closed before the reply was sent"),
            },
            Ok(Err(status)) => status,
            Err(panic) => {
                let message = panic_message(&*panic);
                error!(stream_id = %core.id(), panic = %message, "Unary handler panicked");
                Status::unknown(message)
            }
        };

        finish(&self.call, status).await;
    }

    /// Wait for the request and run it through the handler, returning the
    /// framed reply.
    async fn process(&self) -> Result<Bytes, Status> {
        let channel = &self.call.channel;

        let received = tokio::select! {
            biased;
            wake = self.call.close.wait_timeout(self.timeout) => {
                return Err(match wake {
                    Wake::Fired => Status::cancelled("stream closed before a request arrived"),
                    Wake::Elapsed => {
                        Status::deadline_exceeded("no request arrived before the deadline")
                    }
                });
            }
            received = channel.core.get_recv() => received,
        };
        let payload = match received {
            Some(Message::Data(framed)) => {
                channel
                    .codec
                    .decode_header(&framed)
                    .map_err(|e| Status::internal(format!("invalid request frame: {e}")))?
                    .0
            }
            // zero-length messages never leave reassembly: the request is empty
            None if channel.core.saw_empty_message() => Bytes::new(),
            Some(Message::Close(_)) | None => {
                return Err(Status::cancelled("request stream ended without a request"));
            }
        };

        let mut request = self.handler.new_request();
        channel
            .serializer
            .unmarshal(&payload, request.as_mut())
            .map_err(|e| Status::internal(format!("failed to unmarshal request: {e}")))?;

        let reply = self
            .handler
            .invoke(self.call.ctx.clone(), request)
            .await
            .map_err(|status| Status::internal(format!("unary handler error: {}", status.message())))?;

        let payload = channel
            .serializer
            .marshal(reply.as_ref())
            .map_err(|e| Status::internal(format!("failed to marshal reply: {e}")))?;

        Ok(channel.codec.encode(&payload))
    }
}
