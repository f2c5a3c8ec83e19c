use bytes::{BufMut, Bytes, BytesMut};

use super::FrameCodec;
use crate::error::CodecError;

/// Length of the gRPC message prefix: 1 byte compression flag + 4 byte
/// big-endian length.
pub const PREFIX_LEN: usize = 5;

/// The gRPC length-prefixed message codec used by the triple protocol.
#[derive(Debug, Clone, Copy, Default)]
pub struct GrpcFrameCodec;

impl FrameCodec for GrpcFrameCodec {
    fn decode_header(&self, frame: &[u8]) -> Result<(Bytes, u32), CodecError> {
        if frame.len() < PREFIX_LEN {
            return Err(CodecError::Truncated {
                got: frame.len(),
                need: PREFIX_LEN,
            });
        }

        if frame[0] != 0 {
            return Err(CodecError::Compressed(frame[0]));
        }
        let length = u32::from_be_bytes([frame[1], frame[2], frame[3], frame[4]]);
        Ok((Bytes::copy_from_slice(&frame[PREFIX_LEN..]), length))
    }

    fn encode(&self, payload: &[u8]) -> Bytes {
        let mut out = BytesMut::with_capacity(PREFIX_LEN + payload.len());
        out.put_u8(0);
        out.put_u32(payload.len() as u32);
        out.put_slice(payload);
        out.freeze()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_layout() {
        let framed = GrpcFrameCodec.encode(b"hello");
        assert_eq!(framed.len(), PREFIX_LEN + 5);
        assert_eq!(framed[0], 0);
        assert_eq!(&framed[1..5], &5u32.to_be_bytes());
        assert_eq!(&framed[5..], b"hello");
    }

    #[test]
    fn test_decode_header_partial_payload() {
        let framed = GrpcFrameCodec.encode(b"hello world");
        let (payload, total) = GrpcFrameCodec.decode_header(&framed[..8]).unwrap();
        assert_eq!(total, 11);
        assert_eq!(&payload[..], b"hel");
    }

    #[test]
    fn test_decode_header_empty_message() {
        let framed = GrpcFrameCodec.encode(b"");
        assert_eq!(&framed[..], &[0, 0, 0, 0, 0]);
        let (payload, total) = GrpcFrameCodec.decode_header(&framed).unwrap();
        assert_eq!(total, 0);
        assert!(payload.is_empty());
    }

    #[test]
    fn test_decode_header_rejects_compressed() {
        let mut framed = GrpcFrameCodec.encode(b"zipped").to_vec();
        framed[0] = 1;
        let err = GrpcFrameCodec.decode_header(&framed).unwrap_err();
        assert_eq!(err, CodecError::Compressed(1));
    }

    #[test]
    fn test_decode_header_truncated() {
        let err = GrpcFrameCodec.decode_header(&[0, 0, 1]).unwrap_err();
        assert_eq!(err, CodecError::Truncated { got: 3, need: 5 });
    }
}
