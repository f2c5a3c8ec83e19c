//! Per-call streams.
//!
//! A stream pairs two rendezvous queues (network to processor, and back) with
//! a reassembler for incoming chunks and a forward-only lifecycle state.
//! [`ServerStream`] and [`ClientStream`](crate::client::ClientStream) are the
//! transport-facing views of the two roles.

mod base;
mod message;
mod queue;
mod reassembly;
mod server;
mod state;

use std::fmt;

pub use base::StreamCore;
pub use message::Message;
pub use queue::Rendezvous;
pub use reassembly::Reassembler;
pub use server::ServerStream;
pub use state::StreamState;

/// Identifies one call within a connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StreamId(u32);

impl StreamId {
    pub fn get(self) -> u32 {
        self.0
    }
}

impl From<u32> for StreamId {
    fn from(id: u32) -> Self {
        StreamId(id)
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
