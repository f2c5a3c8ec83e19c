use url::Url;

use crate::config::TRIPLE;

/// URL query key carrying the service version.
pub const VERSION_KEY: &str = "version";

/// URL query key carrying the service group.
pub const GROUP_KEY: &str = "group";

/// A credential pair carried in the `authorization` header as two values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub principal: String,
    pub secret: String,
}

impl Credentials {
    pub fn new(principal: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            principal: principal.into(),
            secret: secret.into(),
        }
    }
}

/// Distributed tracing fields propagated with a call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TraceContext {
    pub trace_id: Option<String>,
    pub rpc_id: Option<String>,
    pub proto_bin: Option<String>,
}

/// Call-scoped values handed to application handlers, and read by the client
/// when it writes request headers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallContext {
    pub service_version: Option<String>,
    pub service_group: Option<String>,
    pub request_id: Option<String>,
    pub trace: TraceContext,
    pub unit_info: Option<String>,
    pub credentials: Option<Credentials>,
}

impl CallContext {
    pub fn with_request_id(mut self, id: impl Into<String>) -> Self {
        self.request_id = Some(id.into());
        self
    }

    pub fn with_trace(mut self, trace: TraceContext) -> Self {
        self.trace = trace;
        self
    }

    pub fn with_unit_info(mut self, unit_info: impl Into<String>) -> Self {
        self.unit_info = Some(unit_info.into());
        self
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }
}

/// Connection-level parameters of the service being called.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionParams {
    /// Protocol name, selecting the frame codec and header bridge.
    pub protocol: String,
    pub service_version: String,
    pub service_group: String,
}

impl Default for ConnectionParams {
    fn default() -> Self {
        Self {
            protocol: TRIPLE.to_string(),
            service_version: String::new(),
            service_group: String::new(),
        }
    }
}

impl ConnectionParams {
    /// Read the protocol from the URL scheme and the version and group from
    /// its query, e.g. `tri://127.0.0.1:20000/greet.Greeter?version=1.0.0&group=blue`.
    pub fn from_url(url: &Url) -> Self {
        let mut params = ConnectionParams {
            protocol: url.scheme().to_string(),
            ..Default::default()
        };
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                VERSION_KEY => params.service_version = value.into_owned(),
                GROUP_KEY => params.service_group = value.into_owned(),
                _ => {}
            }
        }
        params
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_from_url() {
        let url = Url::parse("tri://127.0.0.1:20000/greet.Greeter?version=1.0.0&group=blue&x=1")
            .unwrap();
        let params = ConnectionParams::from_url(&url);
        assert_eq!(params.protocol, "tri");
        assert_eq!(params.service_version, "1.0.0");
        assert_eq!(params.service_group, "blue");
    }

    #[test]
    fn test_params_from_url_without_query() {
        let url = Url::parse("tri://127.0.0.1:20000/greet.Greeter").unwrap();
        let params = ConnectionParams::from_url(&url);
        assert!(params.service_version.is_empty());
        assert!(params.service_group.is_empty());
    }
}
