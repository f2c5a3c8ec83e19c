//! Translation between transport headers and typed protocol headers.

mod context;
mod triple;

use http::HeaderMap;
use tonic::{Code, Status};

use crate::stream::StreamId;

pub use context::{CallContext, ConnectionParams, Credentials, GROUP_KEY, TraceContext, VERSION_KEY};
pub use triple::{
    AUTHORIZATION, CONTENT_TYPE, GRPC_CONTENT_TYPE, SERVICE_GROUP, SERVICE_VERSION, REQUEST_ID,
    TRACE_ID, TRACE_PROTO_BIN, TRACE_RPC_ID, TRAILER_GRPC_MESSAGE, TRAILER_GRPC_STATUS,
    TRAILER_TRACE_PROTO_BIN, TripleHeaderBridge, UNIT_INFO, USER_AGENT, TRIPLE_USER_AGENT,
};

/// Typed view of the protocol fields carried by one call's headers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProtocolHeader {
    pub stream_id: StreamId,
    pub path: String,
    pub content_type: String,
    /// `{package}.{service}` taken from the path.
    pub service_name: String,
    pub service_version: String,
    pub service_group: String,
    pub request_id: String,
    pub tracing_id: String,
    /// Never populated from request headers, see [`TripleHeaderBridge`].
    pub tracing_rpc_id: String,
    pub tracing_proto_bin: String,
    pub unit_info: String,
    pub credentials: Option<Credentials>,
    /// grpc-status observed in the peer's trailers (client side).
    pub grpc_status: String,
    /// grpc-message observed in the peer's trailers (client side).
    pub grpc_message: String,
}

impl ProtocolHeader {
    /// Build the context handed to application handlers.
    pub fn call_context(&self) -> CallContext {
        CallContext {
            service_version: non_empty(&self.service_version),
            service_group: non_empty(&self.service_group),
            request_id: non_empty(&self.request_id),
            trace: TraceContext {
                trace_id: non_empty(&self.tracing_id),
                rpc_id: non_empty(&self.tracing_rpc_id),
                proto_bin: non_empty(&self.tracing_proto_bin),
            },
            unit_info: non_empty(&self.unit_info),
            credentials: self.credentials.clone(),
        }
    }

    /// The terminal status observed from the peer, if trailers arrived.
    pub fn status(&self) -> Option<Status> {
        if self.grpc_status.is_empty() {
            return None;
        }
        let code = match self.grpc_status.parse::<i32>() {
            Ok(code) => Code::from_i32(code),
            Err(_) => Code::Unknown,
        };
        Some(Status::new(code, self.grpc_message.clone()))
    }
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

/// Converts between transport headers and [`ProtocolHeader`]s for one
/// protocol.
pub trait HeaderBridge: Send + Sync + 'static {
    /// Headers a client sends when it starts a call.
    fn write_request_headers(&self, params: &ConnectionParams, ctx: &CallContext) -> HeaderMap;

    /// Parse the headers of an incoming call.
    fn read_request_header(&self, stream_id: StreamId, path: &str, headers: &HeaderMap)
    -> ProtocolHeader;

    /// Terminal trailers carrying `status`.
    fn write_trailers(&self, status: &Status) -> HeaderMap;

    /// Parse the status out of terminal trailers.
    fn read_trailers(&self, trailers: &HeaderMap) -> Status;
}
