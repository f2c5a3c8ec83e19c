//! A transport that connects client streams to a server inside one process.
//!
//! Every framed message is cut into fixed-size chunks on its way across, so
//! both sides exercise reassembly the way they would behind HTTP/2 DATA
//! frames. Headers and trailers cross as header maps rendered and parsed by
//! the header bridge.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tonic::Status;
use tracing::{debug, warn};
use triple_core::codec::PREFIX_LEN;
use triple_core::error::RegistryError;
use triple_core::{ClientStream, HeaderBridge, Message, Registry, ServerStream, TripleServer};

/// Default chunk size, the default HTTP/2 maximum frame size.
pub const DEFAULT_CHUNK_SIZE: usize = 16 * 1024;

pub struct Loopback {
    server: Arc<TripleServer>,
    bridge: Arc<dyn HeaderBridge>,
    chunk_size: usize,
}

impl Loopback {
    /// Serve calls with `server`. Rejections are rendered with the header
    /// bridge of the server's protocol.
    pub fn new(server: Arc<TripleServer>, registry: &Registry) -> Result<Self, RegistryError> {
        let bridge = registry.header_bridge(&server.options().protocol)?;
        Ok(Self {
            server,
            bridge,
            chunk_size: DEFAULT_CHUNK_SIZE,
        })
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn server(&self) -> &Arc<TripleServer> {
        &self.server
    }

    /// Deliver a started call to the server and move its data both ways.
    ///
    /// The returned task finishes once the server has sent its trailers and
    /// the server stream has been released.
    pub fn connect(&self, client: &Arc<ClientStream>) -> JoinHandle<()> {
        let handle = match self
            .server
            .accept(client.id(), client.path(), client.request_headers())
        {
            Ok(handle) => handle,
            Err(e) => {
                warn!(stream_id = %client.id(), path = client.path(), error = %e, "Call rejected");
                // trailers-only response
                client.on_trailers(self.bridge.write_trailers(&e.to_status()));
                client.close();
                return tokio::spawn(async {});
            }
        };

        let server = Arc::clone(handle.stream());
        let client = Arc::clone(client);
        let chunk_size = self.chunk_size;
        let requests = tokio::spawn(pump_requests(
            Arc::clone(&client),
            Arc::clone(&server),
            chunk_size,
        ));

        tokio::spawn(async move {
            pump_responses(&server, &client, chunk_size).await;

            // the call is over
            drop(handle);
            requests.abort();
            client.close();
            debug!(stream_id = %client.id(), "Loopback call finished");
        })
    }
}

/// Client to server: request data, then END_STREAM.
async fn pump_requests(client: Arc<ClientStream>, server: Arc<ServerStream>, chunk_size: usize) {
    while let Some(msg) = client.next_outbound().await {
        let Message::Data(framed) = msg else {
            continue;
        };
        for chunk in chunks(&framed, chunk_size) {
            if let Err(e) = server.put_chunk(chunk).await {
                debug!(stream_id = %server.id(), error = %e, "Server stopped reading requests");
                return;
            }
        }
    }
    server.close_recv();
    server.on_end_stream();
}

/// Server to client: response headers, data and the trailers.
async fn pump_responses(server: &ServerStream, client: &ClientStream, chunk_size: usize) {
    let mut headers_sent = false;

    while let Some(msg) = server.next_outbound().await {
        match msg {
            Message::Data(framed) => {
                if !headers_sent {
                    client.on_response_headers(server.response_headers());
                    headers_sent = true;
                }
                for chunk in chunks(&framed, chunk_size) {
                    if let Err(e) = client.put_chunk(chunk).await {
                        debug!(stream_id = %client.id(), error = %e, "Client stopped reading replies");
                        return;
                    }
                }
            }
            Message::Close(status) => {
                client.on_trailers(server.trailers(&status));
                server.on_end_stream();
                return;
            }
        }
    }

    // the server stream was torn down before it produced a status
    let status = Status::internal("server stream closed without a status");
    client.on_trailers(server.trailers(&status));
}

/// Cut a framed message into chunks of `chunk_size` payload bytes. The size
/// prefix always travels whole in the first chunk.
fn chunks(framed: &[u8], chunk_size: usize) -> impl Iterator<Item = &[u8]> {
    let first = framed.len().min(PREFIX_LEN + chunk_size);
    let (head, rest) = framed.split_at(first);
    std::iter::once(head).chain(rest.chunks(chunk_size))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_stays_whole() {
        let framed: Vec<u8> = (0..12).collect();
        let cut: Vec<&[u8]> = chunks(&framed, 3).collect();
        assert_eq!(cut, vec![&framed[..8], &framed[8..11], &framed[11..]]);

        let cut: Vec<&[u8]> = chunks(&framed[..5], 3).collect();
        assert_eq!(cut, vec![&framed[..5]]);
    }
}
