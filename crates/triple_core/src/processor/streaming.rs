use std::sync::Arc;

use tonic::Status;
use tracing::{debug, error};

use super::{Call, finish, ok, panic_message};
use crate::server::handler::StreamingHandler;
use crate::user_stream::ServerUserStream;

/// Runs a streaming handler against the stream for the whole call.
#[derive(Clone)]
pub struct StreamingProcessor {
    pub(super) call: Call,
    handler: Arc<dyn StreamingHandler>,
}

impl StreamingProcessor {
    pub(crate) fn new(call: Call, handler: Arc<dyn StreamingHandler>) -> Self {
        Self { call, handler }
    }

    pub(super) async fn serve(self) {
        let stream_id = self.call.channel.core.id();
        let stream = ServerUserStream::new(self.call.channel.clone(), self.call.ctx.clone());
        let handler = Arc::clone(&self.handler);
        let mut task = tokio::spawn(async move { handler.call(stream).await });

        let status = tokio::select! {
            biased;
            _ = self.call.close.fired() => {
                task.abort();
                debug!(stream_id = %stream_id, "Stream closed while the handler was running");
                Status::cancelled("stream closed before the handler finished")
            }
            joined = &mut task => match joined {
                Ok(Ok(())) => ok(),
                Ok(Err(status)) => status,
                Err(e) if e.is_panic() => {
                    let message = panic_message(&*e.into_panic());
                    error!(stream_id = %stream_id, panic = %message, "Streaming handler panicked");
                    Status::unknown(message)
                }
                Err(_) => Status::cancelled("handler task cancelled"),
            },
        };

        finish(&self.call, status).await;
    }
}
