use bytes::Bytes;
use tonic::Status;

/// The unit carried by a stream's queues.
#[derive(Debug)]
pub enum Message {
    /// One complete, size-prefixed message.
    Data(Bytes),
    /// Terminal status of the call. Only ever written to a server stream's
    /// send queue, and only once.
    Close(Status),
}

impl Message {
    pub fn is_data(&self) -> bool {
        matches!(self, Message::Data(_))
    }
}
