use std::sync::Arc;

use bytes::{Bytes, BytesMut};

use crate::codec::FrameCodec;
use crate::error::ReassemblyError;

/// Rebuilds complete messages from the chunks a transport hands over.
///
/// The first chunk of every message starts with the codec's size prefix. Once
/// the accumulated payload reaches exactly the declared size the message is
/// complete; overshooting it is a protocol violation.
pub struct Reassembler {
    codec: Arc<dyn FrameCodec>,
    buffer: BytesMut,
    /// Declared payload size of the message in progress; zero while waiting
    /// for the next message's prefix.
    expected: usize,
    /// A zero-length message arrived. It is never delivered, so this is the
    /// only trace it leaves.
    saw_empty: bool,
}

impl Reassembler {
    pub fn new(codec: Arc<dyn FrameCodec>, capacity: usize) -> Self {
        Self {
            codec,
            buffer: BytesMut::with_capacity(capacity),
            expected: 0,
            saw_empty: false,
        }
    }

    /// Feed one chunk.
    ///
    /// Returns the re-framed message once it is complete, `None` while more
    /// chunks are needed.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Option<Bytes>, ReassemblyError> {
        let head;
        let payload: &[u8] = if self.expected == 0 {
            let (data, declared) = self.codec.decode_header(chunk)?;
            if declared == 0 {
                // nothing to deliver for an empty message
                self.saw_empty = true;
                return Ok(None);
            }
            self.expected = declared as usize;
            self.buffer.clear();
            self.buffer.reserve(self.expected);
            head = data;
            &head
        } else {
            chunk
        };

        if self.buffer.len() + payload.len() > self.expected {
            let err = ReassemblyError::Oversize {
                declared: self.expected,
                received: self.buffer.len() + payload.len(),
            };
            self.reset();
            return Err(err);
        }
        self.buffer.extend_from_slice(payload);

        if self.buffer.len() < self.expected {
            return Ok(None);
        }

        let framed = self.codec.encode(&self.buffer);
        self.reset();
        Ok(Some(framed))
    }

    /// Whether a zero-length message has been received.
    pub fn saw_empty_message(&self) -> bool {
        self.saw_empty
    }

    /// Whether a message is partially accumulated.
    pub fn in_progress(&self) -> bool {
        self.expected != 0
    }

    fn reset(&mut self) {
        self.buffer.clear();
        self.expected = 0;
    }
}
