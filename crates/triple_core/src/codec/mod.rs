//! Frame codecs.
//!
//! A frame codec owns the byte layout of the size prefix that precedes every
//! message on the wire. The stream layer only needs two things from it: the
//! declared payload size of a message (read from its first chunk) and a way to
//! put a prefix back in front of a payload.

mod grpc;

use bytes::Bytes;

use crate::error::CodecError;

pub use grpc::{GrpcFrameCodec, PREFIX_LEN};

/// Converts wire frame bytes to and from logical payload bytes.
pub trait FrameCodec: Send + Sync + 'static {
    /// Parse the size prefix at the start of `frame`.
    ///
    /// Returns the payload bytes that follow the prefix within this chunk and
    /// the total payload size the prefix declares.
    fn decode_header(&self, frame: &[u8]) -> Result<(Bytes, u32), CodecError>;

    /// Prefix `payload` with its size header.
    fn encode(&self, payload: &[u8]) -> Bytes;
}
