use std::time::Duration;

use bon::Builder;

use crate::codec::PREFIX_LEN;
use crate::serializer::PROTOBUF;

/// Name of the triple protocol, used to select its frame codec and header
/// bridge.
pub const TRIPLE: &str = "tri";

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);

pub const DEFAULT_BUFFER_SIZE: usize = 4096;

/// Per-call options shared by the server and client sides.
#[derive(Debug, Clone, Builder)]
pub struct TripleOptions {
    /// How long a unary processor waits for its request, and how long a
    /// client stream waits for a reply message.
    #[builder(default = DEFAULT_TIMEOUT)]
    pub timeout: Duration,

    /// Initial capacity of the reassembly buffer.
    #[builder(default = DEFAULT_BUFFER_SIZE)]
    pub buffer_size: usize,

    /// Serializer name, looked up in the registry.
    #[builder(into, default = String::from(PROTOBUF))]
    pub serializer: String,

    /// Protocol name selecting the frame codec and header bridge.
    #[builder(into, default = String::from(TRIPLE))]
    pub protocol: String,
}

impl Default for TripleOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl TripleOptions {
    /// Replace zero or empty fields with their defaults.
    pub fn with_defaults(mut self) -> Self {
        if self.timeout.is_zero() {
            self.timeout = DEFAULT_TIMEOUT;
        }
        if self.buffer_size < PREFIX_LEN {
            self.buffer_size = DEFAULT_BUFFER_SIZE;
        }
        if self.serializer.is_empty() {
            self.serializer = PROTOBUF.to_string();
        }
        if self.protocol.is_empty() {
            self.protocol = TRIPLE.to_string();
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let opts = TripleOptions::default();
        assert_eq!(opts.timeout, DEFAULT_TIMEOUT);
        assert_eq!(opts.buffer_size, DEFAULT_BUFFER_SIZE);
        assert_eq!(opts.serializer, PROTOBUF);
        assert_eq!(opts.protocol, TRIPLE);
    }

    #[test]
    fn test_builder_overrides() {
        let opts = TripleOptions::builder()
            .timeout(Duration::from_secs(120))
            .buffer_size(100_000)
            .serializer("custom")
            .build();
        assert_eq!(opts.timeout, Duration::from_secs(120));
        assert_eq!(opts.buffer_size, 100_000);
        assert_eq!(opts.serializer, "custom");
        assert_eq!(opts.protocol, TRIPLE);
    }

    #[test]
    fn test_with_defaults_fills_empty_fields() {
        let opts = TripleOptions::builder()
            .timeout(Duration::ZERO)
            .buffer_size(0)
            .serializer("")
            .build()
            .with_defaults();
        assert_eq!(opts.timeout, DEFAULT_TIMEOUT);
        assert_eq!(opts.buffer_size, DEFAULT_BUFFER_SIZE);
        assert_eq!(opts.serializer, PROTOBUF);
    }

    #[test]
    fn test_with_defaults_keeps_set_fields() {
        let opts = TripleOptions::builder()
            .buffer_size(100_000)
            .build()
            .with_defaults();
        assert_eq!(opts.buffer_size, 100_000);
    }
}
