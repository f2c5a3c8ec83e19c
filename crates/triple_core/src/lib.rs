//! Transport-independent core of the triple RPC protocol.
//!
//! The transport (an HTTP/2 server or client) owns the connection. For each
//! call it hands header events and raw data chunks to a stream from this
//! crate and writes back whatever the stream produces:
//!
//! - [`TripleServer::accept`] reads the request headers, picks the handler
//!   registered for the path and starts a [`ServerStream`] bound to a unary or
//!   streaming processor.
//! - [`TripleClient::start_call`] creates a [`ClientStream`] and the
//!   [`ClientUserStream`] the caller sends and receives on.
//!
//! Frame codecs, header bridges and serializers are pluggable and looked up
//! by name in a [`Registry`].

pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod header;
pub mod path;
pub mod processor;
pub mod registry;
pub mod serializer;
pub mod server;
pub mod stream;
pub mod user_stream;

pub use client::{ClientCall, ClientStream, TripleClient};
pub use config::TripleOptions;
pub use error::{StreamError, TripleServerError};
pub use header::{CallContext, ConnectionParams, Credentials, HeaderBridge, ProtocolHeader, TraceContext};
pub use registry::{Registry, RegistryBuilder};
pub use serializer::{ProtoMessage, Serializer};
pub use server::{ServerStreamHandle, TripleServer};
pub use stream::{Message, ServerStream, StreamId, StreamState};
pub use user_stream::{ClientUserStream, Inbound, ServerUserStream};
