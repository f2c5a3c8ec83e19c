//! The serving side: method registration, call acceptance and stream
//! tracking.

pub mod handler;
mod router;
mod stream_map;

pub use handler::{MethodHandler, MethodKind, StreamingHandler, UnaryHandler};
pub use router::TripleServer;
pub use stream_map::{ServerStreamHandle, StreamMap};

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use http::HeaderMap;
    use http::header::HeaderValue;
    use tonic::{Code, Status};

    use super::*;
    use crate::config::TripleOptions;
    use crate::error::TripleServerError;
    use crate::header::{CallContext, SERVICE_VERSION};
    use crate::registry::Registry;
    use crate::stream::StreamId;
    use crate::user_stream::ServerUserStream;

    #[derive(Clone, PartialEq, prost::Message)]
    struct Name {
        #[prost(string, tag = "1")]
        name: String,
    }

    fn server() -> TripleServer {
        let registry = Arc::new(Registry::with_defaults());
        let mut server = TripleServer::new(registry, TripleOptions::default());
        server
            .register_unary::<Name, Name, _, _>(
                "greet.Greeter/SayHello",
                |_ctx: CallContext, req: Name| async move {
                    Ok::<_, Status>(Name {
                        name: format!("hello {}", req.name),
                    })
                },
            )
            .unwrap();
        server
            .register_streaming("/greet.Greeter/Chat", |_stream: ServerUserStream| async move {
                Ok::<_, Status>(())
            })
            .unwrap();
        server
    }

    #[test]
    fn test_register_rejects_bad_path() {
        let mut server = server();
        let result = server.register_streaming("Chat", |_stream: ServerUserStream| async move {
            Ok::<_, Status>(())
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_method_lookup() {
        let server = server();
        assert!(server.has_method("/greet.Greeter/SayHello"));
        assert!(server.has_method("greet.Greeter/Chat"));
        // lower-camel names resolve to the registered method
        assert!(server.has_method("/greet.Greeter/sayHello"));
        assert!(!server.has_method("/greet.Greeter/SayGoodbye"));
        assert!(!server.has_method("garbage"));
    }

    #[tokio::test]
    async fn test_accept_tracks_stream() {
        let server = server();
        let mut headers = HeaderMap::new();
        headers.insert(SERVICE_VERSION, HeaderValue::from_static("2.0.0"));

        let handle = server
            .accept(StreamId::from(1), "/greet.Greeter/SayHello", &headers)
            .unwrap();
        assert_eq!(handle.header().service_version, "2.0.0");
        assert_eq!(handle.header().service_name, "greet.Greeter");
        assert_eq!(server.active_streams(), 1);
        assert!(server.stream(StreamId::from(1)).is_some());
        assert!(server.stream(StreamId::from(3)).is_none());

        let duplicate = server.accept(StreamId::from(1), "/greet.Greeter/SayHello", &headers);
        assert!(matches!(
            duplicate,
            Err(TripleServerError::StreamAlreadyActive(_))
        ));

        let stream = Arc::clone(handle.stream());
        drop(handle);
        assert_eq!(server.active_streams(), 0);
        assert!(server.stream(StreamId::from(1)).is_none());
        assert!(stream.is_closed());

        // the id is free again
        let again = server.accept(StreamId::from(1), "/greet.Greeter/Chat", &headers);
        assert!(again.is_ok());
    }

    #[tokio::test]
    async fn test_accept_unknown_method() {
        let server = server();
        let err = server
            .accept(StreamId::from(1), "/greet.Greeter/Missing", &HeaderMap::new())
            .err()
            .unwrap();
        assert!(matches!(err, TripleServerError::NoHandler(_)));
        assert_eq!(err.to_status().code(), Code::Unimplemented);
        assert_eq!(server.active_streams(), 0);
    }

    #[tokio::test]
    async fn test_accept_unknown_serializer() {
        let options = TripleOptions::builder().serializer("hessian2").build();
        let server = TripleServer::new(Arc::new(Registry::with_defaults()), options);
        let err = server
            .accept(StreamId::from(1), "/greet.Greeter/SayHello", &HeaderMap::new())
            .err()
            .unwrap();
        assert!(matches!(err, TripleServerError::Registry(_)));
    }
}
