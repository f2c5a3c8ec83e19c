use std::collections::HashMap;
use std::sync::Arc;

use crate::codec::{FrameCodec, GrpcFrameCodec};
use crate::config::TRIPLE;
use crate::error::RegistryError;
use crate::header::{HeaderBridge, TripleHeaderBridge};
use crate::serializer::{PROTOBUF, ProtobufSerializer, Serializer};

/// Pluggable components looked up by name.
///
/// Frame codecs and header bridges are keyed by protocol name, serializers by
/// serializer name. Built once with [`RegistryBuilder`] before any call
/// starts, then shared read-only.
pub struct Registry {
    codecs: HashMap<String, Arc<dyn FrameCodec>>,
    bridges: HashMap<String, Arc<dyn HeaderBridge>>,
    serializers: HashMap<String, Arc<dyn Serializer>>,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// The triple codec and header bridge under `"tri"` and the protobuf
    /// serializer under `"protobuf"`.
    pub fn with_defaults() -> Self {
        RegistryBuilder::with_defaults().build()
    }

    pub fn codec(&self, protocol: &str) -> Result<Arc<dyn FrameCodec>, RegistryError> {
        lookup(&self.codecs, "frame codec", protocol)
    }

    pub fn header_bridge(&self, protocol: &str) -> Result<Arc<dyn HeaderBridge>, RegistryError> {
        lookup(&self.bridges, "header bridge", protocol)
    }

    pub fn serializer(&self, name: &str) -> Result<Arc<dyn Serializer>, RegistryError> {
        lookup(&self.serializers, "serializer", name)
    }
}

fn lookup<T: ?Sized>(
    table: &HashMap<String, Arc<T>>,
    kind: &'static str,
    name: &str,
) -> Result<Arc<T>, RegistryError> {
    table
        .get(name)
        .cloned()
        .ok_or_else(|| RegistryError::NotFound {
            kind,
            name: name.to_string(),
        })
}

#[derive(Default)]
pub struct RegistryBuilder {
    codecs: HashMap<String, Arc<dyn FrameCodec>>,
    bridges: HashMap<String, Arc<dyn HeaderBridge>>,
    serializers: HashMap<String, Arc<dyn Serializer>>,
}

impl RegistryBuilder {
    /// A builder pre-populated with the built-in components.
    pub fn with_defaults() -> Self {
        Self::default()
            .with_codec(TRIPLE, GrpcFrameCodec)
            .with_header_bridge(TRIPLE, TripleHeaderBridge)
            .with_serializer(PROTOBUF, ProtobufSerializer)
    }

    pub fn with_codec(mut self, protocol: impl Into<String>, codec: impl FrameCodec) -> Self {
        self.codecs.insert(protocol.into(), Arc::new(codec));
        self
    }

    pub fn with_header_bridge(
        mut self,
        protocol: impl Into<String>,
        bridge: impl HeaderBridge,
    ) -> Self {
        self.bridges.insert(protocol.into(), Arc::new(bridge));
        self
    }

    pub fn with_serializer(mut self, name: impl Into<String>, serializer: impl Serializer) -> Self {
        self.serializers.insert(name.into(), Arc::new(serializer));
        self
    }

    pub fn build(self) -> Registry {
        Registry {
            codecs: self.codecs,
            bridges: self.bridges,
            serializers: self.serializers,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SerializeError;
    use crate::serializer::ProtoMessage;
    use bytes::Bytes;

    struct Rejecting;

    impl Serializer for Rejecting {
        fn marshal(&self, _msg: &dyn ProtoMessage) -> Result<Bytes, SerializeError> {
            Err(SerializeError::Other("rejected".into()))
        }

        fn unmarshal(&self, _data: &[u8], _msg: &mut dyn ProtoMessage) -> Result<(), SerializeError> {
            Err(SerializeError::Other("rejected".into()))
        }
    }

    #[test]
    fn test_defaults_registered() {
        let registry = Registry::with_defaults();
        assert!(registry.codec("tri").is_ok());
        assert!(registry.header_bridge("tri").is_ok());
        assert!(registry.serializer("protobuf").is_ok());
    }

    #[test]
    fn test_unknown_name() {
        let registry = Registry::with_defaults();
        let err = registry.serializer("hessian2").err().unwrap();
        assert!(matches!(
            err,
            RegistryError::NotFound {
                kind: "serializer",
                ..
            }
        ));
        assert_eq!(err.to_string(), "no serializer registered under 'hessian2'");
        assert!(registry.codec("grpc").is_err());
    }

    #[test]
    fn test_custom_serializer() {
        let registry = RegistryBuilder::with_defaults()
            .with_serializer("rejecting", Rejecting)
            .build();
        let serializer = registry.serializer("rejecting").unwrap();
        assert!(serializer.marshal(&()).is_err());
        assert!(Registry::builder().build().serializer(PROTOBUF).is_err());
    }
}
