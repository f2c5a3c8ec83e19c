//! Per-call execution strategies.
//!
//! A processor is bound to one server stream. The unary processor waits for
//! a single request and answers it; the streaming processor hands the stream
//! to a long-running handler. Either way exactly one terminal status is
//! written to the send queue, after which the send side is closed.

mod signal;
mod streaming;
mod unary;

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tonic::Status;
use tracing::{debug, warn};

use crate::header::CallContext;
use crate::server::handler::{MethodHandler, MethodKind};
use crate::stream::Message;
use crate::user_stream::Channel;

pub use signal::{CloseSignal, Wake};
pub use streaming::StreamingProcessor;
pub use unary::UnaryProcessor;

/// Everything a processor needs from its stream.
#[derive(Clone)]
pub(crate) struct Call {
    pub channel: Channel,
    pub ctx: CallContext,
    pub close: CloseSignal,
}

pub enum Processor {
    Unary(UnaryProcessor),
    Streaming(StreamingProcessor),
}

impl Processor {
    /// Pick the processor matching the handler's kind.
    pub(crate) fn new(handler: &MethodHandler, call: Call, timeout: Duration) -> Self {
        match handler {
            MethodHandler::Unary(handler) => {
                Processor::Unary(UnaryProcessor::new(call, Arc::clone(handler), timeout))
            }
            MethodHandler::Streaming(handler) => {
                Processor::Streaming(StreamingProcessor::new(call, Arc::clone(handler)))
            }
        }
    }

    pub fn kind(&self) -> MethodKind {
        match self {
            Processor::Unary(_) => MethodKind::Unary,
            Processor::Streaming(_) => MethodKind::Streaming,
        }
    }

    /// Start serving the call on a new task.
    pub fn run_rpc(&self) -> JoinHandle<()> {
        match self {
            Processor::Unary(p) => tokio::spawn(p.clone().serve()),
            Processor::Streaming(p) => tokio::spawn(p.clone().serve()),
        }
    }

    /// Fire the close signal. Returns `true` the first time.
    pub fn close(&self) -> bool {
        self.close_signal().fire()
    }

    pub fn close_signal(&self) -> &CloseSignal {
        match self {
            Processor::Unary(p) => &p.call.close,
            Processor::Streaming(p) => &p.call.close,
        }
    }
}

/// Write the terminal status and close the send side.
async fn finish(call: &Call, status: Status) {
    let core = &call.channel.core;
    if status.code() == tonic::Code::Ok {
        debug!(stream_id = %core.id(), "Call completed");
    } else {
        warn!(
            stream_id = %core.id(),
            code = ?status.code(),
            message = status.message(),
            "Call failed"
        );
    }

    if core.put_send(Message::Close(status)).await.is_err() {
        debug!(stream_id = %core.id(), "Stream closed before the status was sent");
    }
    core.close_send();
}

fn ok() -> Status {
    Status::new(tonic::Code::Ok, "")
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("handler panicked: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("handler panicked: {s}")
    } else {
        "handler panicked".to_string()
    }
}
