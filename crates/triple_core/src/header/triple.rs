use http::header::{HeaderMap, HeaderName, HeaderValue};
use tonic::{Code, Status};
use tracing::{debug, warn};

use super::{CallContext, ConnectionParams, Credentials, HeaderBridge, ProtocolHeader};
use crate::path::GrpcPath;
use crate::stream::StreamId;

pub const SERVICE_VERSION: &str = "tri-service-version";
pub const SERVICE_GROUP: &str = "tri-service-group";
pub const REQUEST_ID: &str = "tri-req-id";
pub const TRACE_ID: &str = "tri-trace-traceid";
pub const TRACE_RPC_ID: &str = "tri-trace-rpcid";
pub const TRACE_PROTO_BIN: &str = "tri-trace-proto-bin";
pub const UNIT_INFO: &str = "tri-unit-info";
pub const CONTENT_TYPE: &str = "content-type";
pub const AUTHORIZATION: &str = "authorization";
pub const USER_AGENT: &str = "user-agent";

/// Numeric status code of the call, as a decimal string.
pub const TRAILER_GRPC_STATUS: &str = "grpc-status";

/// Human-readable status message, percent-encoded.
pub const TRAILER_GRPC_MESSAGE: &str = "grpc-message";

/// Defined by the protocol but never written: other implementations reject
/// it.
pub const TRAILER_TRACE_PROTO_BIN: &str = "trace-proto-bin";

pub const GRPC_CONTENT_TYPE: &str = "application/grpc+proto";

pub const TRIPLE_USER_AGENT: &str = concat!("triple-rust/", env!("CARGO_PKG_VERSION"));

/// Header bridge for the triple protocol.
///
/// `tri-trace-rpcid` is written on outgoing calls but not mapped back when
/// reading request headers: deployed peers disagree on which key it is read
/// from, so [`ProtocolHeader::tracing_rpc_id`] is always left empty on the
/// server side.
#[derive(Debug, Clone, Copy, Default)]
pub struct TripleHeaderBridge;

impl HeaderBridge for TripleHeaderBridge {
    fn write_request_headers(&self, params: &ConnectionParams, ctx: &CallContext) -> HeaderMap {
        let mut headers = HeaderMap::new();
        insert(&mut headers, USER_AGENT, TRIPLE_USER_AGENT);
        insert(&mut headers, CONTENT_TYPE, GRPC_CONTENT_TYPE);

        insert(&mut headers, SERVICE_VERSION, &params.service_version);
        insert(&mut headers, SERVICE_GROUP, &params.service_group);

        insert(&mut headers, REQUEST_ID, opt(&ctx.request_id));
        insert(&mut headers, TRACE_ID, opt(&ctx.trace.trace_id));
        insert(&mut headers, TRACE_RPC_ID, opt(&ctx.trace.rpc_id));
        insert(&mut headers, TRACE_PROTO_BIN, opt(&ctx.trace.proto_bin));
        insert(&mut headers, UNIT_INFO, opt(&ctx.unit_info));

        if let Some(credentials) = &ctx.credentials {
            let principal = HeaderValue::from_str(&credentials.principal);
            let secret = HeaderValue::from_str(&credentials.secret);
            match (principal, secret) {
                (Ok(principal), Ok(secret)) => {
                    headers.append(AUTHORIZATION, principal);
                    headers.append(AUTHORIZATION, secret);
                }
                _ => warn!("Credentials are not valid header values, not sending them"),
            }
        }

        headers
    }

    fn read_request_header(
        &self,
        stream_id: StreamId,
        path: &str,
        headers: &HeaderMap,
    ) -> ProtocolHeader {
        let mut header = ProtocolHeader {
            stream_id,
            path: path.to_string(),
            service_name: GrpcPath::parse(path)
                .map(|p| p.full_service())
                .unwrap_or_default(),
            ..Default::default()
        };

        for name in headers.keys() {
            // header names are stored lower-cased, which is their canonical form
            let field = match name.as_str() {
                SERVICE_VERSION => &mut header.service_version,
                SERVICE_GROUP => &mut header.service_group,
                REQUEST_ID => &mut header.request_id,
                TRACE_ID => &mut header.tracing_id,
                TRACE_PROTO_BIN => &mut header.tracing_proto_bin,
                UNIT_INFO => &mut header.unit_info,
                CONTENT_TYPE => &mut header.content_type,
                AUTHORIZATION => {
                    header.credentials = read_credentials(headers);
                    continue;
                }
                _ => continue,
            };
            if let Some(value) = headers.get(name).and_then(|v| v.to_str().ok()) {
                *field = value.to_string();
            } else {
                debug!(header = %name, "Ignoring non-ASCII header value");
            }
        }

        header
    }

    fn write_trailers(&self, status: &Status) -> HeaderMap {
        let mut trailers = HeaderMap::new();
        let code = status.code() as i32;
        trailers.insert(TRAILER_GRPC_STATUS, HeaderValue::from(code));
        let message = encode_grpc_message(status.message());
        // percent-encoding leaves only visible ASCII
        if let Ok(value) = HeaderValue::from_str(&message) {
            trailers.insert(TRAILER_GRPC_MESSAGE, value);
        }
        trailers
    }

    fn read_trailers(&self, trailers: &HeaderMap) -> Status {
        let code = trailers
            .get(TRAILER_GRPC_STATUS)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<i32>().ok());
        let message = trailers
            .get(TRAILER_GRPC_MESSAGE)
            .map(|v| decode_grpc_message(v.as_bytes()))
            .unwrap_or_default();

        match code {
            Some(code) => Status::new(Code::from_i32(code), message),
            None => Status::unknown(format!("missing or invalid {TRAILER_GRPC_STATUS} trailer")),
        }
    }
}

fn opt(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or("")
}

fn insert(headers: &mut HeaderMap, name: &'static str, value: &str) {
    let value = HeaderValue::from_str(value).unwrap_or_else(|_| {
        warn!(header = name, "Header value is not valid ASCII, sending it empty");
        HeaderValue::from_static("")
    });
    headers.insert(HeaderName::from_static(name), value);
}

fn read_credentials(headers: &HeaderMap) -> Option<Credentials> {
    let values: Vec<&str> = headers
        .get_all(AUTHORIZATION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .collect();
    match values.as_slice() {
        [principal, secret] => Some(Credentials::new(*principal, *secret)),
        _ => None,
    }
}

/// Percent-encode bytes outside printable ASCII, and `%` itself.
fn encode_grpc_message(message: &str) -> String {
    let mut out = String::with_capacity(message.len());
    for byte in message.bytes() {
        if (0x20..=0x7e).contains(&byte) && byte != b'%' {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    out
}

fn decode_grpc_message(raw: &[u8]) -> String {
    let mut out = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        if raw[i] == b'%' && i + 2 < raw.len() {
            let hex = std::str::from_utf8(&raw[i + 1..i + 3])
                .ok()
                .and_then(|h| u8::from_str_radix(h, 16).ok());
            if let Some(byte) = hex {
                out.push(byte);
                i += 3;
                continue;
            }
        }
        out.push(raw[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}
