use thiserror::Error;
use tonic::Status;

use crate::stream::StreamId;

/// Errors that can occur while parsing gRPC request paths.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PathError {
    #[error("invalid gRPC path: {0}")]
    Invalid(String),
}

/// Errors produced by a frame codec while reading a size prefix.
#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum CodecError {
    /// The chunk is shorter than the codec's size prefix.
    #[error("frame header truncated: got {got} bytes, need {need}")]
    Truncated { got: usize, need: usize },

    /// The message is flagged as compressed, which is not supported.
    #[error("compressed messages are not supported (flag {0:#04x})")]
    Compressed(u8),
}

/// Errors that can occur while marshalling or unmarshalling a message.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SerializeError {
    /// Failed to decode a protobuf message.
    #[error("protobuf decode error: {0}")]
    Decode(#[from] prost::DecodeError),

    /// A serializer-specific failure.
    #[error("{0}")]
    Other(String),
}

/// Fatal framing violations detected while reassembling a message.
///
/// None of these map to an RPC status: the stream is aborted.
#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum ReassemblyError {
    /// More bytes arrived than the frame header declared.
    #[error("received {received} bytes for a message declared as {declared} bytes")]
    Oversize { declared: usize, received: usize },

    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Returned by a rendezvous queue once it has been closed.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("queue closed")]
pub struct QueueClosed;

/// Errors surfaced by stream operations, on both the transport side and
/// the user-facing stream wrappers.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StreamError {
    /// The stream (or the queue in the requested direction) is closed.
    #[error("stream closed")]
    Closed,

    /// A framing violation aborted the stream.
    #[error("protocol violation: {0}")]
    Protocol(#[from] ReassemblyError),

    #[error(transparent)]
    Serialize(#[from] SerializeError),

    /// Response headers were already sent.
    #[error("headers already sent")]
    HeadersSent,

    /// No message arrived before the configured deadline.
    #[error("timed out waiting for a message")]
    Timeout,

    /// The peer finished the call with a non-OK status.
    #[error("call failed: {0}")]
    Status(Status),
}

impl From<QueueClosed> for StreamError {
    fn from(_: QueueClosed) -> Self {
        StreamError::Closed
    }
}

impl From<StreamError> for Status {
    fn from(err: StreamError) -> Self {
        match err {
            StreamError::Closed => Status::cancelled("stream closed"),
            StreamError::Protocol(e) => Status::internal(format!("protocol violation: {e}")),
            StreamError::Serialize(e) => Status::internal(e.to_string()),
            StreamError::HeadersSent => Status::internal("headers already sent"),
            StreamError::Timeout => Status::deadline_exceeded("timed out waiting for a message"),
            StreamError::Status(status) => status,
        }
    }
}

/// Errors that can occur when looking up pluggable components.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RegistryError {
    #[error("no {kind} registered under '{name}'")]
    NotFound { kind: &'static str, name: String },
}

/// Errors that can occur while accepting a call on the server.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TripleServerError {
    #[error(transparent)]
    Path(#[from] PathError),

    /// No handler registered for the given gRPC path.
    #[error("no handler registered for '{0}'")]
    NoHandler(String),

    /// A stream with this id is already being served.
    #[error("stream {0} already active")]
    StreamAlreadyActive(StreamId),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl TripleServerError {
    /// The status the transport should answer with when a call cannot be
    /// accepted.
    pub fn to_status(&self) -> Status {
        match self {
            TripleServerError::Path(e) => Status::unimplemented(e.to_string()),
            TripleServerError::NoHandler(path) => {
                Status::unimplemented(format!("no handler registered for '{path}'"))
            }
            TripleServerError::StreamAlreadyActive(id) => {
                Status::internal(format!("stream {id} already active"))
            }
            TripleServerError::Registry(e) => Status::internal(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tonic::Code;

    #[test]
    fn test_stream_error_to_status() {
        assert_eq!(Status::from(StreamError::Closed).code(), Code::Cancelled);
        assert_eq!(Status::from(StreamError::Timeout).code(), Code::DeadlineExceeded);
        let err = StreamError::Serialize(SerializeError::Other("bad".into()));
        assert_eq!(Status::from(err).code(), Code::Internal);
    }

    #[test]
    fn test_server_error_to_status() {
        let err = TripleServerError::NoHandler("pkg.Svc/Missing".into());
        let status = err.to_status();
        assert_eq!(status.code(), Code::Unimplemented);
        assert!(status.message().contains("pkg.Svc/Missing"));
    }

    #[test]
    fn test_oversize_display() {
        let err = ReassemblyError::Oversize {
            declared: 4,
            received: 6,
        };
        assert_eq!(
            err.to_string(),
            "received 6 bytes for a message declared as 4 bytes"
        );
    }
}
