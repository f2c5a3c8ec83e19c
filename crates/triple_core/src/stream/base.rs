use std::sync::{Arc, Mutex, MutexGuard};

use http::HeaderMap;
use tracing::{debug, error};

use super::queue::Rendezvous;
use super::reassembly::Reassembler;
use super::{Message, StreamId, StreamState};
use crate::codec::FrameCodec;
use crate::error::{QueueClosed, StreamError};

/// Header and trailer metadata of the response side of a call.
#[derive(Debug, Default)]
pub(crate) struct Metadata {
    pub header: HeaderMap,
    pub header_sent: bool,
    pub trailer: HeaderMap,
}

/// The parts of a stream shared by the server and client roles.
///
/// The receive queue is written by the transport (through [`put_chunk`]) and
/// read by the processor or user stream; the send queue the other way round.
///
/// [`put_chunk`]: StreamCore::put_chunk
pub struct StreamCore {
    id: StreamId,
    recv: Rendezvous<Message>,
    send: Rendezvous<Message>,
    reassembler: Mutex<Reassembler>,
    state: Mutex<StreamState>,
    metadata: Mutex<Metadata>,
}

impl StreamCore {
    pub fn new(id: StreamId, codec: Arc<dyn FrameCodec>, buffer_size: usize) -> Self {
        Self {
            id,
            recv: Rendezvous::new(),
            send: Rendezvous::new(),
            reassembler: Mutex::new(Reassembler::new(codec, buffer_size)),
            state: Mutex::new(StreamState::Open),
            metadata: Mutex::new(Metadata::default()),
        }
    }

    pub fn id(&self) -> StreamId {
        self.id
    }

    /// Feed one chunk of network data. A completed message is handed to the
    /// receive queue, waiting until it is taken.
    ///
    /// A protocol violation leaves the queues open: the owning stream tears
    /// itself down, signalling its reader before the queues close.
    pub async fn put_chunk(&self, chunk: &[u8]) -> Result<(), StreamError> {
        if self.recv.is_writer_closed() {
            return Err(StreamError::Closed);
        }
        let complete = lock(&self.reassembler).push(chunk);

        match complete {
            Ok(Some(framed)) => Ok(self.recv.put(Message::Data(framed)).await?),
            Ok(None) => Ok(()),
            Err(e) => {
                error!(stream_id = %self.id, error = %e, "Protocol violation, aborting stream");
                Err(e.into())
            }
        }
    }

    /// Whether a zero-length message was received. Such messages never
    /// reach the receive queue.
    pub(crate) fn saw_empty_message(&self) -> bool {
        lock(&self.reassembler).saw_empty_message()
    }

    /// Record one end-of-stream event and return the new state.
    pub fn on_end_stream(&self) -> StreamState {
        let mut state = lock(&self.state);
        let next = state.on_end_stream();
        if next != *state {
            debug!(stream_id = %self.id, from = ?*state, to = ?next, "Stream state changed");
        }
        *state = next;
        next
    }

    pub fn state(&self) -> StreamState {
        *lock(&self.state)
    }

    pub(crate) async fn put_recv(&self, msg: Message) -> Result<(), QueueClosed> {
        self.recv.put(msg).await
    }

    pub(crate) async fn get_recv(&self) -> Option<Message> {
        self.recv.get().await
    }

    pub(crate) async fn put_send(&self, msg: Message) -> Result<(), QueueClosed> {
        self.send.put(msg).await
    }

    pub(crate) async fn get_send(&self) -> Option<Message> {
        self.send.get().await
    }

    /// No more messages will arrive from the network.
    pub fn close_recv(&self) {
        self.recv.close_writer();
    }

    /// No more messages will be written towards the network.
    pub fn close_send(&self) {
        self.send.close_writer();
    }

    pub(crate) fn close_queues(&self) {
        self.recv.close();
        self.send.close();
    }

    pub(crate) fn metadata(&self) -> MutexGuard<'_, Metadata> {
        lock(&self.metadata)
    }
}

/// Lock a mutex, recovering the data if a holder panicked.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{GrpcFrameCodec, PREFIX_LEN};
    use crate::error::ReassemblyError;

    fn core() -> Arc<StreamCore> {
        Arc::new(StreamCore::new(StreamId::from(1), Arc::new(GrpcFrameCodec), 64))
    }

    #[test]
    fn test_state_monotonic() {
        let core = core();
        assert_eq!(core.state(), StreamState::Open);
        assert_eq!(core.on_end_stream(), StreamState::HalfClosed);
        assert_eq!(core.on_end_stream(), StreamState::Closed);
        assert_eq!(core.on_end_stream(), StreamState::Closed);
    }

    #[tokio::test]
    async fn test_chunks_become_one_message() {
        let core = core();
        let framed = GrpcFrameCodec.encode(b"split payload");

        let reader = {
            let core = Arc::clone(&core);
            tokio::spawn(async move { core.get_recv().await })
        };

        // the size prefix must arrive whole in the first chunk
        let (head, rest) = framed.split_at(PREFIX_LEN + 1);
        core.put_chunk(head).await.unwrap();
        for chunk in rest.chunks(4) {
            core.put_chunk(chunk).await.unwrap();
        }

        match reader.await.unwrap() {
            Some(Message::Data(data)) => assert_eq!(data, framed),
            other => panic!("expected data, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_oversize_aborts_stream() {
        let core = core();
        let mut framed = GrpcFrameCodec.encode(b"abc").to_vec();
        framed.push(b'!');

        let err = core.put_chunk(&framed).await.unwrap_err();
        assert!(matches!(
            err,
            StreamError::Protocol(ReassemblyError::Oversize { .. })
        ));
        assert!(!core.saw_empty_message());

        // tearing down is the owner's job
        core.close_queues();
        assert!(core.get_recv().await.is_none());
    }

    #[tokio::test]
    async fn test_empty_message_is_remembered() {
        let core = core();
        core.put_chunk(&GrpcFrameCodec.encode(b"")).await.unwrap();
        core.close_recv();
        assert!(core.get_recv().await.is_none());
        assert!(core.saw_empty_message());
    }

    #[tokio::test]
    async fn test_close_recv_ends_reader() {
        let core = core();
        core.close_recv();
        assert!(core.get_recv().await.is_none());
        assert!(core.put_chunk(&GrpcFrameCodec.encode(b"late")).await.is_err());
    }
}
