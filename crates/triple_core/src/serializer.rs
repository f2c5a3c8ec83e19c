//! Message serializers.
//!
//! Serializers are stored by name in the [`Registry`](crate::Registry) and used
//! through trait objects, so they work on [`ProtoMessage`], an object-safe view
//! of a `prost` message.

use std::any::Any;

use bytes::Bytes;

use crate::error::SerializeError;

/// Name of the built-in protobuf serializer.
pub const PROTOBUF: &str = "protobuf";

/// Object-safe view of a protobuf message.
///
/// Implemented for every `prost::Message + Default`.
pub trait ProtoMessage: Send + Sync + 'static {
    /// Encode the message into a fresh buffer.
    fn encode_proto(&self) -> Vec<u8>;

    /// Merge the encoded message in `buf` into `self`.
    fn merge_proto(&mut self, buf: &[u8]) -> Result<(), prost::DecodeError>;

    /// Reset every field to its default.
    fn clear_proto(&mut self);

    /// Recover the concrete message type.
    fn into_any(self: Box<Self>) -> Box<dyn Any + Send>;
}

impl<M> ProtoMessage for M
where
    M: prost::Message + Default + 'static,
{
    fn encode_proto(&self) -> Vec<u8> {
        prost::Message::encode_to_vec(self)
    }

    fn merge_proto(&mut self, buf: &[u8]) -> Result<(), prost::DecodeError> {
        prost::Message::merge(self, buf)
    }

    fn clear_proto(&mut self) {
        prost::Message::clear(self)
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send> {
        self
    }
}

/// Turns messages into payload bytes and back.
pub trait Serializer: Send + Sync + 'static {
    fn marshal(&self, msg: &dyn ProtoMessage) -> Result<Bytes, SerializeError>;

    /// Decode `data` into `msg`, replacing whatever it held.
    fn unmarshal(&self, data: &[u8], msg: &mut dyn ProtoMessage) -> Result<(), SerializeError>;
}

/// Plain protobuf encoding.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProtobufSerializer;

impl Serializer for ProtobufSerializer {
    fn marshal(&self, msg: &dyn ProtoMessage) -> Result<Bytes, SerializeError> {
        Ok(Bytes::from(msg.encode_proto()))
    }

    fn unmarshal(&self, data: &[u8], msg: &mut dyn ProtoMessage) -> Result<(), SerializeError> {
        msg.clear_proto();
        msg.merge_proto(data)?;
        Ok(())
    }
}
