use std::sync::Arc;

use anyhow::Result;
use futures::StreamExt;
use tonic::Status;
use tracing::{info, warn};
use triple::Loopback;
use triple::logging;
use triple_core::{
    CallContext, Registry, ServerUserStream, TraceContext, TripleClient, TripleOptions,
    TripleServer,
};
use url::Url;
use uuid::Uuid;

#[derive(Clone, PartialEq, prost::Message)]
struct HelloRequest {
    #[prost(string, tag = "1")]
    name: String,
}

#[derive(Clone, PartialEq, prost::Message)]
struct HelloReply {
    #[prost(string, tag = "1")]
    message: String,
}

const SERVICE_URL: &str = "tri://127.0.0.1:20000/greet.Greeter?version=1.0.0";

#[tokio::main]
async fn main() -> Result<()> {
    let level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| logging::DEFAULT_LEVEL.to_string());
    logging::init(&level);

    let registry = Arc::new(Registry::with_defaults());
    let options = TripleOptions::default();

    let mut server = TripleServer::new(Arc::clone(&registry), options.clone());
    server.register_unary::<HelloRequest, HelloReply, _, _>(
        "greet.Greeter/SayHello",
        |ctx: CallContext, req: HelloRequest| async move {
            info!(request_id = ?ctx.request_id, name = %req.name, "SayHello");
            Ok::<_, Status>(HelloReply {
                message: format!("hello {}", req.name),
            })
        },
    )?;
    server.register_streaming("greet.Greeter/Chat", |stream: ServerUserStream| async move {
        let mut inbound = stream.inbound::<HelloRequest>();
        while let Some(req) = inbound.next().await {
            let req = req?;
            stream
                .send_msg(&HelloReply {
                    message: format!("hi {}, how are you?", req.name),
                })
                .await?;
        }
        Ok::<_, Status>(())
    })?;

    let loopback = Loopback::new(Arc::new(server), &registry)?.with_chunk_size(7);
    let client = TripleClient::from_url(&registry, &Url::parse(SERVICE_URL)?, options)?;

    // unary
    let ctx = CallContext::default()
        .with_request_id(Uuid::new_v4().to_string())
        .with_trace(TraceContext {
            trace_id: Some(Uuid::new_v4().to_string()),
            ..Default::default()
        });
    let call = client.start_call("/greet.Greeter/sayHello", &ctx)?;
    let done = loopback.connect(&call.transport);
    let reply: HelloReply = call
        .stream
        .unary(&HelloRequest {
            name: "triple".into(),
        })
        .await?;
    done.await?;
    info!(message = %reply.message, "Unary reply");

    // bidirectional streaming
    let call = client.start_call("/greet.Greeter/Chat", &CallContext::default())?;
    let done = loopback.connect(&call.transport);
    for name in ["alice", "bob", "carol"] {
        call.stream
            .send_msg(&HelloRequest { name: name.into() })
            .await?;
        let mut reply = HelloReply::default();
        call.stream.recv_msg(&mut reply).await?;
        info!(message = %reply.message, "Stream reply");
    }
    call.stream.close_send();
    let mut rest = call.stream.inbound::<HelloReply>();
    while let Some(reply) = rest.next().await {
        reply?;
    }
    done.await?;
    info!(status = ?call.stream.status().map(|s| s.code()), "Stream finished");

    // unknown method
    let call = client.start_call("/greet.Greeter/Missing", &CallContext::default())?;
    loopback.connect(&call.transport).await?;
    match call
        .stream
        .unary::<HelloRequest, HelloReply>(&HelloRequest::default())
        .await
    {
        Ok(reply) => warn!(message = %reply.message, "Unknown method answered"),
        Err(status) => info!(code = ?status.code(), message = status.message(), "Unknown method rejected"),
    }

    Ok(())
}
